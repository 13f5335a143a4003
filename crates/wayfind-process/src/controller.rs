//! Process controller trait and the values it exchanges

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use wayfind_core::Result;

use crate::state::ControllerState;

/// Platform window reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowRef {
    X11 { window_id: u64 },
    /// Window of a simulated application
    Virtual { id: u64 },
}

impl std::fmt::Display for WindowRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X11 { window_id } => write!(f, "x11:{}", window_id),
            Self::Virtual { id } => write!(f, "virtual:{}", id),
        }
    }
}

/// A launched application, owned by the caller for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessHandle {
    pub pid: u32,
    pub window: Option<WindowRef>,
    pub launched_at: DateTime<Utc>,
}

impl ProcessHandle {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            window: None,
            launched_at: Utc::now(),
        }
    }
}

/// One synthetic input event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputAction {
    /// Left click at window-relative coordinates
    PointerClick { x: i32, y: i32 },
    /// Key or key combination, e.g. `enter`, `esc`, `ctrl+s`
    KeyPress { key: String },
}

impl InputAction {
    pub fn click(x: i32, y: i32) -> Self {
        Self::PointerClick { x, y }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self::KeyPress { key: key.into() }
    }
}

impl std::fmt::Display for InputAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PointerClick { x, y } => write!(f, "click ({}, {})", x, y),
            Self::KeyPress { key } => write!(f, "key {}", key),
        }
    }
}

/// Still image of a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    /// File extension matching the encoding, without the dot
    pub extension: String,
}

impl CapturedImage {
    pub fn new(bytes: Vec<u8>, extension: impl Into<String>) -> Self {
        Self {
            bytes,
            extension: extension.into(),
        }
    }

    /// Write to `<dir>/<stem>.<extension>`, returning the path
    pub fn save(&self, dir: &Path, stem: &str) -> Result<std::path::PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.{}", stem, self.extension));
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// Lifecycle control of one external application
///
/// Every operation except `terminate` first checks whether the process has
/// exited and reports `ProcessCrashed` if so. Operations after the process
/// crashed or was terminated fail with `InvalidState`; launching again after
/// a termination starts a fresh lifecycle.
#[async_trait]
pub trait ProcessController: Send {
    /// Start the executable and confirm it survives `grace`
    ///
    /// An exit within `grace` is reported as `LaunchFailure::ExitedEarly`.
    async fn launch(&mut self, executable: &Path, grace: Duration) -> Result<ProcessHandle>;

    /// Wait up to `timeout` for the application's top-level window
    async fn locate_window(
        &mut self,
        handle: &ProcessHandle,
        timeout: Duration,
    ) -> Result<WindowRef>;

    /// Deliver one input event to the window
    async fn send_input(&mut self, window: &WindowRef, action: &InputAction) -> Result<()>;

    /// Capture the window's current contents
    async fn capture_image(&mut self, window: &WindowRef) -> Result<CapturedImage>;

    /// Close the application, escalating to a forced kill; idempotent
    async fn terminate(&mut self, handle: &ProcessHandle) -> Result<()>;

    fn state(&self) -> ControllerState;
}
