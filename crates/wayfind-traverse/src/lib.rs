//! # wayfind-traverse
//!
//! Drives a live application through every scene of its navigation graph,
//! confirming each arrival by recognition before recording it.
//!
//! This crate provides:
//! - `TraversalEngine`, the breadth-first exploration loop
//! - `TraversalState`, the per-run visited/frontier/failure bookkeeping
//! - `CoverageReport`, the serialized outcome of a run

mod engine;
pub mod report;
pub mod state;

pub use engine::{TraversalEngine, STRATEGY};
pub use report::{
    CoverageReport, FailedEdge, FallbackRecord, LaunchMetrics, SkippedEdge, StopReason,
    UnexpectedTransition, REPORT_FILE,
};
pub use state::{ConfirmedStep, EdgeKey, TraversalState};
