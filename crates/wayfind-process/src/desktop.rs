//! Desktop process controller
//!
//! Launches the application as a child process and talks to its window through
//! X11 utilities:
//! - `xdotool search` to find the window by pid (or by title)
//! - `xdotool windowactivate ... mousemove/key` for synthetic input
//! - ImageMagick `import -window <id>` for capture

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, info, instrument, warn};
use wayfind_core::{LaunchFailure, ProcessConfig, Result, WayfindError};

use crate::controller::{CapturedImage, InputAction, ProcessController, ProcessHandle, WindowRef};
use crate::keys::to_keysym;
use crate::state::{transition, ControllerEvent, ControllerState};
use crate::tool::{CommandTool, DesktopTool, ToolOutput};

const XDOTOOL: &str = "xdotool";
const IMPORT: &str = "import";

/// Delay between window searches
const WINDOW_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Real controller for X11 desktops
pub struct DesktopController<T: DesktopTool = CommandTool> {
    tool: T,
    config: ProcessConfig,
    image_format: String,
    child: Option<Child>,
    state: ControllerState,
}

impl DesktopController<CommandTool> {
    pub fn new(config: ProcessConfig) -> Self {
        Self::with_tool(CommandTool, config)
    }
}

impl<T: DesktopTool> DesktopController<T> {
    pub fn with_tool(tool: T, config: ProcessConfig) -> Self {
        Self {
            tool,
            config,
            image_format: "png".to_string(),
            child: None,
            state: ControllerState::NotStarted,
        }
    }

    /// Encoding requested from `import` (`png`, `jpg`, ...)
    pub fn with_image_format(mut self, format: impl Into<String>) -> Self {
        self.image_format = format.into();
        self
    }

    fn apply(&mut self, event: ControllerEvent) -> Result<()> {
        self.state = transition(self.state.clone(), event)?;
        Ok(())
    }

    /// Fail unless the process is live, recording an exit if one happened
    fn ensure_running(&mut self, operation: &str) -> Result<()> {
        match &self.state {
            ControllerState::Crashed { code } => {
                return Err(WayfindError::ProcessCrashed { code: *code })
            }
            state if !state.is_live() => {
                return Err(WayfindError::InvalidState(format!(
                    "cannot {} while {:?}",
                    operation, state
                )))
            }
            _ => {}
        }

        let Some(child) = self.child.as_mut() else {
            return Err(WayfindError::InvalidState(format!(
                "cannot {}: no child process",
                operation
            )));
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                let code = status.code();
                warn!("Application exited unexpectedly ({:?}) before {}", code, operation);
                self.child = None;
                self.apply(ControllerEvent::ExitObserved { code })?;
                Err(WayfindError::ProcessCrashed { code })
            }
            Ok(None) => Ok(()),
            Err(e) => Err(WayfindError::Io(e)),
        }
    }

    async fn spawn_and_confirm(
        &mut self,
        executable: &Path,
        grace: Duration,
    ) -> std::result::Result<ProcessHandle, LaunchFailure> {
        check_executable(executable)?;

        let mut command = Command::new(executable);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = executable.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| LaunchFailure::Spawn(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| LaunchFailure::Spawn("process exited before reporting a pid".into()))?;

        debug!("Spawned {} as pid {}, grace {:?}", executable.display(), pid, grace);

        // An exit inside the grace period means a launcher stub, not the real app
        let waited = tokio::time::timeout(grace, child.wait()).await;
        match waited {
            Ok(Ok(status)) => Err(LaunchFailure::ExitedEarly {
                code: status.code(),
            }),
            Ok(Err(e)) => Err(LaunchFailure::Spawn(e.to_string())),
            Err(_elapsed) => {
                self.child = Some(child);
                Ok(ProcessHandle::new(pid))
            }
        }
    }

    async fn search_window(&self, handle: &ProcessHandle) -> Result<Option<u64>> {
        let pid = handle.pid.to_string();
        let args: Vec<&str> = match &self.config.window_title {
            Some(title) => vec!["search", "--onlyvisible", "--name", title.as_str()],
            None => vec!["search", "--onlyvisible", "--pid", pid.as_str()],
        };

        // xdotool exits non-zero when nothing matches; a hung search is a miss
        let limit = self.config.capture_timeout();
        let Some(output) = exec_within(&self.tool, limit, XDOTOOL, &args).await? else {
            return Ok(None);
        };
        Ok(output
            .stdout_text()
            .lines()
            .find_map(|line| line.trim().parse::<u64>().ok()))
    }

    async fn run_input(&self, args: &[&str]) -> Result<()> {
        let limit = self.config.input_timeout();
        let Some(output) = exec_within(&self.tool, limit, XDOTOOL, args).await? else {
            return Err(WayfindError::Input(format!(
                "xdotool did not finish within {:?}",
                limit
            )));
        };

        if !output.success {
            return Err(WayfindError::Input(output.stderr));
        }
        Ok(())
    }
}

/// Run one tool command, `None` if it did not finish within `limit`
///
/// The command is dropped on timeout, which kills a spawned child.
async fn exec_within<T: DesktopTool>(
    tool: &T,
    limit: Duration,
    program: &str,
    args: &[&str],
) -> Result<Option<ToolOutput>> {
    match tokio::time::timeout(limit, tool.exec(program, args)).await {
        Ok(output) => output.map(Some),
        Err(_) => {
            warn!("{} {} did not finish within {:?}", program, args.join(" "), limit);
            Ok(None)
        }
    }
}

fn x11_id(window: &WindowRef) -> Result<u64> {
    match window {
        WindowRef::X11 { window_id } => Ok(*window_id),
        other => Err(WayfindError::InvalidState(format!(
            "desktop controller cannot address {}",
            other
        ))),
    }
}

fn check_executable(path: &Path) -> std::result::Result<(), LaunchFailure> {
    let metadata =
        std::fs::metadata(path).map_err(|_| LaunchFailure::NotFound(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(LaunchFailure::NotExecutable(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(LaunchFailure::NotExecutable(path.to_path_buf()));
        }
    }

    Ok(())
}

/// Capture the whole screen, used when no application window is available
pub async fn capture_desktop<T: DesktopTool>(
    tool: &T,
    format: &str,
    limit: Duration,
) -> Result<CapturedImage> {
    let target = format!("{}:-", format);
    let args = ["-silent", "-window", "root", target.as_str()];
    let Some(output) = exec_within(tool, limit, IMPORT, &args).await? else {
        return Err(WayfindError::Capture(format!(
            "desktop capture did not finish within {:?}",
            limit
        )));
    };

    if !output.success || output.stdout.is_empty() {
        return Err(WayfindError::Capture(format!(
            "desktop capture failed: {}",
            output.stderr
        )));
    }
    Ok(CapturedImage::new(output.stdout, format))
}

#[async_trait]
impl<T: DesktopTool> ProcessController for DesktopController<T> {
    #[instrument(skip(self), fields(executable = %executable.display()))]
    async fn launch(&mut self, executable: &Path, grace: Duration) -> Result<ProcessHandle> {
        self.apply(ControllerEvent::LaunchRequested)?;

        match self.spawn_and_confirm(executable, grace).await {
            Ok(handle) => {
                self.apply(ControllerEvent::LaunchConfirmed)?;
                info!("Launched {} (pid {})", executable.display(), handle.pid);
                Ok(handle)
            }
            Err(failure) => {
                self.apply(ControllerEvent::LaunchFailed)?;
                warn!("Launch of {} failed: {}", executable.display(), failure);
                Err(failure.into())
            }
        }
    }

    #[instrument(skip(self, handle), fields(pid = handle.pid))]
    async fn locate_window(
        &mut self,
        handle: &ProcessHandle,
        timeout: Duration,
    ) -> Result<WindowRef> {
        let started = Instant::now();

        loop {
            self.ensure_running("locate window")?;

            if let Some(window_id) = self.search_window(handle).await? {
                self.apply(ControllerEvent::WindowFound)?;
                debug!("Found window {} after {:?}", window_id, started.elapsed());
                return Ok(WindowRef::X11 { window_id });
            }

            if started.elapsed() >= timeout {
                return Err(WayfindError::WindowNotFound {
                    pid: handle.pid,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(WINDOW_POLL_INTERVAL).await;
        }
    }

    async fn send_input(&mut self, window: &WindowRef, action: &InputAction) -> Result<()> {
        self.ensure_running("send input")?;
        let id = x11_id(window)?.to_string();
        let id = id.as_str();
        debug!("Input {} -> window {}", action, id);

        match action {
            InputAction::PointerClick { x, y } => {
                let (x, y) = (x.to_string(), y.to_string());
                self.run_input(&[
                    "windowactivate",
                    "--sync",
                    id,
                    "mousemove",
                    "--window",
                    id,
                    x.as_str(),
                    y.as_str(),
                    "click",
                    "1",
                ])
                .await
            }
            InputAction::KeyPress { key } => {
                let keysym = to_keysym(key);
                self.run_input(&[
                    "windowactivate",
                    "--sync",
                    id,
                    "key",
                    "--clearmodifiers",
                    keysym.as_str(),
                ])
                .await
            }
        }
    }

    async fn capture_image(&mut self, window: &WindowRef) -> Result<CapturedImage> {
        self.ensure_running("capture")?;
        let id = x11_id(window)?.to_string();

        let limit = self.config.capture_timeout();
        let Some(name_check) =
            exec_within(&self.tool, limit, XDOTOOL, &["getwindowname", id.as_str()]).await?
        else {
            return Err(WayfindError::Capture(format!(
                "window {} did not answer within {:?}",
                id, limit
            )));
        };
        if !name_check.success {
            if self.state == ControllerState::Ready {
                self.apply(ControllerEvent::WindowLost)?;
            }
            return Err(WayfindError::Capture(format!("window {} has closed", id)));
        }

        let target = format!("{}:-", self.image_format);
        let args = ["-silent", "-window", id.as_str(), target.as_str()];
        let Some(output) = exec_within(&self.tool, limit, IMPORT, &args).await? else {
            return Err(WayfindError::Capture(format!(
                "import of window {} did not finish within {:?}",
                id, limit
            )));
        };

        if !output.success || output.stdout.is_empty() {
            return Err(WayfindError::Capture(format!(
                "import of window {} failed: {}",
                id, output.stderr
            )));
        }

        Ok(CapturedImage::new(output.stdout, self.image_format.clone()))
    }

    #[instrument(skip(self, handle), fields(pid = handle.pid))]
    async fn terminate(&mut self, handle: &ProcessHandle) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            self.apply(ControllerEvent::TerminateRequested)?;
            return Ok(());
        };

        if let Ok(Some(status)) = child.try_wait() {
            debug!("Process {} had already exited ({:?})", handle.pid, status.code());
            if self.state.is_live() {
                self.apply(ControllerEvent::ExitObserved {
                    code: status.code(),
                })?;
            }
            return self.apply(ControllerEvent::TerminateRequested);
        }

        request_close(handle.pid, &mut child)?;

        let grace = self.config.terminate_grace();
        let waited = tokio::time::timeout(grace, child.wait()).await;
        match waited {
            Ok(status) => {
                debug!("Process {} closed: {:?}", handle.pid, status.ok().and_then(|s| s.code()));
            }
            Err(_elapsed) => {
                warn!("Process {} ignored close for {:?}, killing", handle.pid, grace);
                child.kill().await?;
            }
        }

        self.apply(ControllerEvent::TerminateRequested)?;
        info!("Terminated pid {}", handle.pid);
        Ok(())
    }

    fn state(&self) -> ControllerState {
        self.state.clone()
    }
}

/// Ask the process to exit (SIGTERM on unix)
#[cfg(unix)]
fn request_close(pid: u32, _child: &mut Child) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => Ok(()),
        // Already gone
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(WayfindError::Other(format!(
            "Failed to signal process {}: {}",
            pid, e
        ))),
    }
}

#[cfg(not(unix))]
fn request_close(_pid: u32, child: &mut Child) -> Result<()> {
    child.start_kill()?;
    Ok(())
}
