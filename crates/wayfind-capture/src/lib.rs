//! # wayfind-capture
//!
//! The single entry point the auditing pipeline calls to get a directory of
//! labelled screenshots.
//!
//! [`CaptureStrategySelector`] runs the graph traversal when a navigation
//! graph and an executable are available, and switches to a configured
//! [`FallbackCapture`] when traversal cannot produce anything.

mod fallback;
mod selector;

pub use fallback::{fallback_for, DesktopSnapshotCapture, DirectoryImport, FallbackCapture};
pub use selector::{
    CaptureOutcome, CaptureRequest, CaptureStrategySelector, DesktopTraversalRunner,
    FailureReason, TraversalRunner,
};
