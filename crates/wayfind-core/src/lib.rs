//! # wayfind-core
//!
//! Shared foundations for Wayfind, the black-box navigation explorer used to
//! collect per-screen captures of a compiled application for accessibility
//! auditing.
//!
//! - [`graph`]: the immutable navigation graph (scenes, transition edges)
//! - [`config`]: per-project configuration in `.wayfind/config.toml`
//! - [`fail_open`]: helpers for best-effort infrastructure operations
//! - [`WayfindError`]: the unified error type

pub mod config;
mod error;
pub mod fail_open;
pub mod graph;

pub use config::{
    CaptureConfig, FallbackKind, ProcessConfig, RecognitionConfig, TraversalConfig, WayfindConfig,
};
pub use error::{LaunchFailure, Result, WayfindError};
pub use graph::{
    ControlDescriptor, EdgeOrigin, EdgeTarget, GraphSummary, NavigationGraph, SceneId, SceneNode,
    TransitionEdge,
};
