//! Deterministic simulated application
//!
//! [`SimulatedApp`] models an application as screens with buttons and key
//! bindings. [`SimulatedController`] runs it behind the [`ProcessController`]
//! trait so traversal logic can be exercised without a desktop. Captured
//! "images" are [`SimulatedFrame`] text renderings listing the current screen
//! and its visible buttons.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use wayfind_core::{LaunchFailure, Result, WayfindError};

use crate::controller::{CapturedImage, InputAction, ProcessController, ProcessHandle, WindowRef};
use crate::keys::{same_key, to_keysym};
use crate::state::{transition, ControllerEvent, ControllerState};

const FIRST_BUTTON_Y: i32 = 40;
const BUTTON_SPACING: i32 = 50;
const BUTTON_X: i32 = 100;

/// What a simulated window shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedFrame {
    pub screen: String,
    /// Button text with its click position
    pub buttons: Vec<(String, i32, i32)>,
}

impl SimulatedFrame {
    pub fn render(&self) -> Vec<u8> {
        let mut out = format!("screen: {}\n", self.screen);
        for (text, x, y) in &self.buttons {
            out.push_str(&format!("button: {} @ {},{}\n", text, x, y));
        }
        out.into_bytes()
    }

    /// Decode a rendered frame; `None` for anything else
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?;
        let mut lines = text.lines();
        let screen = lines.next()?.strip_prefix("screen: ")?.to_string();

        let buttons = lines
            .filter_map(|line| {
                let rest = line.strip_prefix("button: ")?;
                let (label, pos) = rest.rsplit_once(" @ ")?;
                let (x, y) = pos.split_once(',')?;
                Some((label.to_string(), x.parse().ok()?, y.parse().ok()?))
            })
            .collect();

        Some(Self { screen, buttons })
    }
}

#[derive(Debug, Clone)]
struct SimButton {
    text: String,
    x: i32,
    y: i32,
    target: String,
}

/// In-memory application model
#[derive(Debug, Clone)]
pub struct SimulatedApp {
    start: String,
    buttons: BTreeMap<String, Vec<SimButton>>,
    keys: HashMap<(String, String), String>,
    back_key: Option<String>,
    failing_launches: usize,
    launch_failure: LaunchFailure,
    window_missing: bool,
    crash_on_enter: Option<String>,
    cancel_after_inputs: Option<(usize, CancellationToken)>,
    broken_capture_after: Option<usize>,
}

impl SimulatedApp {
    /// Application opening on `start`, with Escape going back one screen
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            buttons: BTreeMap::new(),
            keys: HashMap::new(),
            back_key: Some("Escape".to_string()),
            failing_launches: 0,
            launch_failure: LaunchFailure::ExitedEarly { code: Some(0) },
            window_missing: false,
            crash_on_enter: None,
            cancel_after_inputs: None,
            broken_capture_after: None,
        }
    }

    /// Visible button on `screen` leading to `target`
    ///
    /// Buttons are stacked vertically in declaration order. A button whose
    /// target is its own screen does nothing visible.
    pub fn with_button(
        mut self,
        screen: impl Into<String>,
        text: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let buttons = self.buttons.entry(screen.into()).or_default();
        let y = FIRST_BUTTON_Y + BUTTON_SPACING * buttons.len() as i32;
        buttons.push(SimButton {
            text: text.into(),
            x: BUTTON_X,
            y,
            target: target.into(),
        });
        self
    }

    /// Key binding on `screen` leading to `target`
    pub fn with_key(
        mut self,
        screen: impl Into<String>,
        key: &str,
        target: impl Into<String>,
    ) -> Self {
        self.keys
            .insert((screen.into(), to_keysym(key)), target.into());
        self
    }

    pub fn without_back_key(mut self) -> Self {
        self.back_key = None;
        self
    }

    /// Fail the first `count` launches
    pub fn fail_launches(mut self, count: usize, failure: LaunchFailure) -> Self {
        self.failing_launches = count;
        self.launch_failure = failure;
        self
    }

    /// Never show a window
    pub fn without_window(mut self) -> Self {
        self.window_missing = true;
        self
    }

    /// Exit with code 139 as soon as `screen` is entered
    pub fn crash_on_enter(mut self, screen: impl Into<String>) -> Self {
        self.crash_on_enter = Some(screen.into());
        self
    }

    /// Cancel `token` once `count` inputs have been delivered
    pub fn cancel_after_inputs(mut self, count: usize, token: CancellationToken) -> Self {
        self.cancel_after_inputs = Some((count, token));
        self
    }

    /// Let the capture tool fail once `count` captures have succeeded
    pub fn break_capture_after(mut self, count: usize) -> Self {
        self.broken_capture_after = Some(count);
        self
    }

    fn frame(&self, screen: &str) -> SimulatedFrame {
        let buttons = self
            .buttons
            .get(screen)
            .map(|bs| bs.iter().map(|b| (b.text.clone(), b.x, b.y)).collect())
            .unwrap_or_default();
        SimulatedFrame {
            screen: screen.to_string(),
            buttons,
        }
    }
}

/// One recorded controller operation
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerCall {
    Launch { executable: PathBuf, grace: Duration },
    LocateWindow { pid: u32 },
    Input(InputAction),
    Capture,
    Terminate { pid: u32 },
}

/// Shared record of controller operations, readable after the controller moved
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<ControllerCall>>>,
}

impl CallLog {
    fn push(&self, call: ControllerCall) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }

    pub fn calls(&self) -> Vec<ControllerCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn terminate_count(&self) -> usize {
        self.count(|c| matches!(c, ControllerCall::Terminate { .. }))
    }

    pub fn launch_count(&self) -> usize {
        self.count(|c| matches!(c, ControllerCall::Launch { .. }))
    }

    pub fn input_count(&self) -> usize {
        self.count(|c| matches!(c, ControllerCall::Input(_)))
    }

    pub fn count(&self, predicate: impl Fn(&ControllerCall) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }
}

/// [`ProcessController`] over a [`SimulatedApp`]
pub struct SimulatedController {
    app: SimulatedApp,
    state: ControllerState,
    current: Option<String>,
    history: Vec<String>,
    exited: Option<Option<i32>>,
    pid: u32,
    launches: usize,
    inputs: usize,
    captures: usize,
    log: CallLog,
}

impl SimulatedController {
    pub fn new(app: SimulatedApp) -> Self {
        Self {
            app,
            state: ControllerState::NotStarted,
            current: None,
            history: Vec::new(),
            exited: None,
            pid: 1000,
            launches: 0,
            inputs: 0,
            captures: 0,
            log: CallLog::default(),
        }
    }

    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    /// Screen currently shown, if the application is running
    pub fn current_screen(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn apply(&mut self, event: ControllerEvent) -> Result<()> {
        self.state = transition(self.state.clone(), event)?;
        Ok(())
    }

    fn ensure_running(&mut self, operation: &str) -> Result<()> {
        if let ControllerState::Crashed { code } = self.state {
            return Err(WayfindError::ProcessCrashed { code });
        }
        if !self.state.is_live() {
            return Err(WayfindError::InvalidState(format!(
                "cannot {} while {:?}",
                operation, self.state
            )));
        }
        if let Some(code) = self.exited {
            self.current = None;
            self.apply(ControllerEvent::ExitObserved { code })?;
            return Err(WayfindError::ProcessCrashed { code });
        }
        Ok(())
    }

    fn check_window(&self, window: &WindowRef) -> Result<()> {
        match window {
            WindowRef::Virtual { id } if *id == u64::from(self.pid) => Ok(()),
            other => Err(WayfindError::Capture(format!("window {} does not exist", other))),
        }
    }

    fn navigate(&mut self, target: String) {
        if let Some(current) = self.current.take() {
            self.history.push(current);
        }
        if self.app.crash_on_enter.as_deref() == Some(target.as_str()) {
            debug!("Simulated crash entering {}", target);
            self.exited = Some(Some(139));
        }
        self.current = Some(target);
    }

    fn handle_input(&mut self, action: &InputAction) {
        let Some(current) = self.current.clone() else {
            return;
        };

        match action {
            InputAction::PointerClick { x, y } => {
                let target = self.app.buttons.get(&current).and_then(|buttons| {
                    buttons
                        .iter()
                        .find(|b| b.x == *x && b.y == *y)
                        .map(|b| b.target.clone())
                });
                if let Some(target) = target.filter(|t| *t != current) {
                    self.navigate(target);
                }
            }
            InputAction::KeyPress { key } => {
                let is_back = self
                    .app
                    .back_key
                    .as_deref()
                    .map(|back| same_key(back, key))
                    .unwrap_or(false);

                if let Some(target) = self.app.keys.get(&(current.clone(), to_keysym(key))) {
                    let target = target.clone();
                    if target != current {
                        self.navigate(target);
                    }
                } else if is_back {
                    if let Some(previous) = self.history.pop() {
                        self.current = Some(previous);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ProcessController for SimulatedController {
    async fn launch(&mut self, executable: &Path, grace: Duration) -> Result<ProcessHandle> {
        self.apply(ControllerEvent::LaunchRequested)?;
        self.log.push(ControllerCall::Launch {
            executable: executable.to_path_buf(),
            grace,
        });
        self.launches += 1;

        if self.launches <= self.app.failing_launches {
            self.apply(ControllerEvent::LaunchFailed)?;
            return Err(self.app.launch_failure.clone().into());
        }

        self.pid += 1;
        self.current = Some(self.app.start.clone());
        self.history.clear();
        self.exited = None;
        self.apply(ControllerEvent::LaunchConfirmed)?;

        Ok(ProcessHandle::new(self.pid))
    }

    async fn locate_window(
        &mut self,
        handle: &ProcessHandle,
        timeout: Duration,
    ) -> Result<WindowRef> {
        self.ensure_running("locate window")?;
        self.log.push(ControllerCall::LocateWindow { pid: handle.pid });

        if self.app.window_missing {
            return Err(WayfindError::WindowNotFound {
                pid: handle.pid,
                waited_ms: timeout.as_millis() as u64,
            });
        }

        self.apply(ControllerEvent::WindowFound)?;
        Ok(WindowRef::Virtual {
            id: u64::from(self.pid),
        })
    }

    async fn send_input(&mut self, window: &WindowRef, action: &InputAction) -> Result<()> {
        self.ensure_running("send input")?;
        self.check_window(window)
            .map_err(|e| WayfindError::Input(e.to_string()))?;
        self.log.push(ControllerCall::Input(action.clone()));

        self.handle_input(action);
        self.inputs += 1;

        if let Some((count, token)) = &self.app.cancel_after_inputs {
            if self.inputs == *count {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn capture_image(&mut self, window: &WindowRef) -> Result<CapturedImage> {
        self.ensure_running("capture")?;
        self.check_window(window)?;
        self.log.push(ControllerCall::Capture);

        if self.app.broken_capture_after.is_some_and(|n| self.captures >= n) {
            return Err(WayfindError::Tool(
                "import exited with status 1".to_string(),
            ));
        }
        self.captures += 1;

        let screen = self.current.clone().unwrap_or_default();
        Ok(CapturedImage::new(self.app.frame(&screen).render(), "png"))
    }

    async fn terminate(&mut self, handle: &ProcessHandle) -> Result<()> {
        self.log.push(ControllerCall::Terminate { pid: handle.pid });
        if self.state.is_live() {
            self.current = None;
        }
        self.apply(ControllerEvent::TerminateRequested)
    }

    fn state(&self) -> ControllerState {
        self.state.clone()
    }
}
