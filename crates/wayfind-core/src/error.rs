//! Unified error types for Wayfind

use std::path::PathBuf;
use thiserror::Error;

/// Why a launch attempt did not produce a running application
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchFailure {
    #[error("executable not found: {0}")]
    NotFound(PathBuf),

    #[error("not executable: {0}")]
    NotExecutable(PathBuf),

    #[error("failed to spawn process: {0}")]
    Spawn(String),

    /// The process exited inside the grace period. Usually a launcher that
    /// hands off to the real application, so one retry is worthwhile.
    #[error("process exited within the grace period (code {code:?})")]
    ExitedEarly { code: Option<i32> },
}

impl LaunchFailure {
    /// Whether the caller may retry once with an extended grace period
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ExitedEarly { .. })
    }
}

/// Unified error type for all Wayfind operations
#[derive(Error, Debug)]
pub enum WayfindError {
    // Graph errors
    #[error("Graph build failed: {0}")]
    GraphBuild(String),

    // Process controller errors
    #[error("Launch failed: {0}")]
    Launch(LaunchFailure),

    #[error("No window found for pid {pid} after {waited_ms}ms")]
    WindowNotFound { pid: u32, waited_ms: u64 },

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Process exited unexpectedly (code {code:?})")]
    ProcessCrashed { code: Option<i32> },

    #[error("Invalid controller state: {0}")]
    InvalidState(String),

    #[error("Input injection failed: {0}")]
    Input(String),

    #[error("Desktop tool failed: {0}")]
    Tool(String),

    // Capture strategy errors
    #[error("Fallback capture failed: {0}")]
    Fallback(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl WayfindError {
    /// Machine-readable reason recorded in coverage reports and fallback decisions
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::GraphBuild(_) => "graph build failed",
            Self::Launch(_) => "launch failed",
            Self::WindowNotFound { .. } => "window not found",
            Self::Capture(_) => "capture failed",
            Self::ProcessCrashed { .. } => "process crashed",
            Self::InvalidState(_) => "invalid controller state",
            Self::Input(_) => "input failed",
            Self::Tool(_) => "desktop tool failed",
            Self::Fallback(_) => "fallback failed",
            Self::Config(_) => "invalid configuration",
            Self::Io(_) => "io error",
            Self::Serialization(_) => "serialization error",
            Self::Other(_) => "error",
        }
    }

    /// Errors after which the capture selector may switch to the fallback path
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            Self::GraphBuild(_)
                | Self::Launch(_)
                | Self::WindowNotFound { .. }
                | Self::ProcessCrashed { .. }
        )
    }
}

impl From<LaunchFailure> for WayfindError {
    fn from(failure: LaunchFailure) -> Self {
        Self::Launch(failure)
    }
}

/// Result type alias using WayfindError
pub type Result<T> = std::result::Result<T, WayfindError>;
