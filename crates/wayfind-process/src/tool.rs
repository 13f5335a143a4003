//! Desktop tool execution abstraction
//!
//! Window search, input injection and capture shell out to desktop utilities
//! (`xdotool`, ImageMagick `import`). Going through [`DesktopTool`] lets tests
//! substitute canned output.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::process::Output;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use wayfind_core::{Result, WayfindError};

/// Output from a desktop tool invocation
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Raw stdout; captured images arrive here
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub success: bool,
}

impl ToolOutput {
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into(),
            success: false,
        }
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

impl From<Output> for ToolOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            success: output.status.success(),
        }
    }
}

/// Trait for running desktop utilities (allows mocking in tests)
#[async_trait]
pub trait DesktopTool: Send + Sync {
    /// Run `program` with `args`; a non-zero exit is reported in the output, not as an error
    async fn exec(&self, program: &str, args: &[&str]) -> Result<ToolOutput>;
}

/// Runs tools as child processes
#[derive(Debug, Clone, Default)]
pub struct CommandTool;

#[async_trait]
impl DesktopTool for CommandTool {
    #[instrument(skip(self))]
    async fn exec(&self, program: &str, args: &[&str]) -> Result<ToolOutput> {
        debug!("Executing {} {:?}", program, args);

        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| WayfindError::Tool(format!("Failed to execute {}: {}", program, e)))?;

        let tool_output = ToolOutput::from(output);
        if !tool_output.success {
            debug!("{} failed: {}", program, tool_output.stderr);
        }

        Ok(tool_output)
    }
}

/// Mock desktop tool for testing
///
/// Responses are keyed by the full command line (`program arg1 arg2`).
/// Unknown commands fail with a `Tool` error. Every invocation is recorded.
#[derive(Clone, Default)]
pub struct MockDesktopTool {
    responses: HashMap<String, ToolOutput>,
    hanging: HashSet<String>,
    invocations: Arc<Mutex<Vec<String>>>,
}

impl MockDesktopTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, command: &str, output: ToolOutput) -> Self {
        self.responses.insert(command.to_string(), output);
        self
    }

    /// Never finish `command`, like a tool stuck on an unresponsive display
    pub fn with_hang(mut self, command: &str) -> Self {
        self.hanging.insert(command.to_string());
        self
    }

    /// Command lines executed so far, in order
    pub async fn invocations(&self) -> Vec<String> {
        self.invocations.lock().await.clone()
    }
}

#[async_trait]
impl DesktopTool for MockDesktopTool {
    async fn exec(&self, program: &str, args: &[&str]) -> Result<ToolOutput> {
        let mut key = program.to_string();
        for arg in args {
            key.push(' ');
            key.push_str(arg);
        }
        self.invocations.lock().await.push(key.clone());

        if self.hanging.contains(&key) {
            std::future::pending::<()>().await;
        }

        self.responses
            .get(&key)
            .cloned()
            .ok_or_else(|| WayfindError::Tool(format!("No mock response for: {}", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_tool() {
        let tool = MockDesktopTool::new()
            .with_response("xdotool getwindowname 42", ToolOutput::ok("Career Explorer\n"));

        let output = tool.exec("xdotool", &["getwindowname", "42"]).await.unwrap();
        assert!(output.success);
        assert_eq!(output.stdout_text().trim(), "Career Explorer");

        assert!(tool.exec("xdotool", &["search"]).await.is_err());
        assert_eq!(
            tool.invocations().await,
            vec!["xdotool getwindowname 42", "xdotool search"]
        );
    }

    #[tokio::test]
    async fn test_mock_tool_hang() {
        let tool = MockDesktopTool::new().with_hang("import -window root png:-");

        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            tool.exec("import", &["-window", "root", "png:-"]),
        )
        .await;
        assert!(pending.is_err());
        assert_eq!(tool.invocations().await.len(), 1);
    }
}
