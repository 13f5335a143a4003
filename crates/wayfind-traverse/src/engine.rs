//! Traversal engine
//!
//! Breadth-first exploration of the navigation graph against the live
//! application. Every navigation is followed by a capture and a recognition;
//! a scene is only recorded once recognition confirms it.
//!
//! Each run:
//! 1. Launches the application (one retry with a longer grace on early exit)
//! 2. Locates its window and confirms the start scene
//! 3. Expands scenes in FIFO order, attempting each out-edge whose target is
//!    not yet visited, with bounded retries per edge
//! 4. Stops when the frontier is empty, the budget runs out, the run is
//!    cancelled, the application dies or an unrecoverable error occurs
//! 5. Terminates the application exactly once and returns the report

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wayfind_core::fail_open::fail_open;
use wayfind_core::{
    ControlDescriptor, NavigationGraph, Result, SceneId, TransitionEdge, WayfindConfig,
    WayfindError,
};
use wayfind_process::{CapturedImage, ProcessController, ProcessHandle, WindowRef};
use wayfind_vision::{ControlLocator, RecognitionResult, SceneLabel, SceneRecognizer};

use crate::report::{
    CoverageReport, FailedEdge, LaunchMetrics, SkippedEdge, StopReason, UnexpectedTransition,
};
use crate::state::{ConfirmedStep, EdgeKey, TraversalState};

/// Strategy name recorded in reports produced by the engine
pub const STRATEGY: &str = "traversal";

/// Why the main loop stopped early
#[derive(Debug)]
enum Halt {
    Stop(StopReason),
    Crashed { code: Option<i32> },
    Fatal(WayfindError),
}

impl From<WayfindError> for Halt {
    fn from(err: WayfindError) -> Self {
        match err {
            WayfindError::ProcessCrashed { code } => Halt::Crashed { code },
            other => Halt::Fatal(other),
        }
    }
}

type Step<T> = std::result::Result<T, Halt>;

/// Result of one edge attempt that did not reach the target
enum Miss {
    NoChange,
    Unrecognized,
    ControlNotLocated,
    InputFailed,
}

impl Miss {
    fn reason(&self) -> &'static str {
        match self {
            Miss::NoChange => "no visible change",
            Miss::Unrecognized => "unrecognized",
            Miss::ControlNotLocated => "control not located",
            Miss::InputFailed => "input failed",
        }
    }
}

enum EdgeOutcome {
    Reached,
    /// The target was confirmed on the way back to the source
    AlreadyVisited,
    LandedElsewhere,
    Failed,
    SourceUnreachable,
}

pub struct TraversalEngine<C, R> {
    controller: C,
    recognizer: R,
    config: WayfindConfig,
    output_dir: PathBuf,
    cancel: CancellationToken,
}

impl<C, R> TraversalEngine<C, R>
where
    C: ProcessController,
    R: SceneRecognizer + ControlLocator,
{
    pub fn new(controller: C, recognizer: R, config: WayfindConfig, output_dir: PathBuf) -> Self {
        Self {
            controller,
            recognizer,
            config,
            output_dir,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop cooperatively when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Traverse `graph` on a fresh instance of `executable`
    ///
    /// Launch failures and an undiscoverable window are returned as errors.
    /// Everything after that, including a crash or a failing desktop tool,
    /// yields a (possibly partial) report with the matching stop reason.
    pub async fn run(&mut self, graph: &NavigationGraph, executable: &Path) -> Result<CoverageReport> {
        let total = graph.enabled_scenes().count();
        info!(
            "Starting traversal of {} enabled scenes using {}",
            total,
            executable.display()
        );

        let mut run = Run {
            controller: &mut self.controller,
            recognizer: &self.recognizer,
            config: &self.config,
            output_dir: &self.output_dir,
            cancel: &self.cancel,
            graph,
            executable,
            all_labels: graph.enabled_scenes().map(SceneLabel::from).collect(),
            state: TraversalState::new(),
            report: CoverageReport::new(STRATEGY, total),
            launch: LaunchMetrics::default(),
            handle: None,
            window: None,
            current: None,
            started: false,
            deadline: Instant::now() + self.config.traversal.traversal_budget(),
        };

        let outcome = run.execute().await;
        run.shutdown().await;

        let stop = match outcome {
            Ok(stop) => stop,
            Err(Halt::Stop(reason)) => reason,
            Err(Halt::Crashed { code }) => {
                warn!("Application crashed ({:?}); keeping partial coverage", code);
                run.launch.crashed = true;
                run.launch.exit_code = code;
                StopReason::ProcessCrashed
            }
            Err(Halt::Fatal(err)) if !run.started => return Err(err),
            Err(Halt::Fatal(err)) => {
                warn!(
                    "Traversal stopped by {}: {}; keeping partial coverage",
                    err.reason_code(),
                    err
                );
                run.report
                    .warnings
                    .push(format!("stopped after {}: {}", err.reason_code(), err));
                StopReason::Error
            }
        };

        let report = run.into_report(stop);
        info!(
            "Traversal finished ({}): {}/{} scenes, {} failed edges, {} skipped",
            stop,
            report.visited_count,
            report.total_scenes,
            report.failed_edges.len(),
            report.skipped_edges.len()
        );
        Ok(report)
    }
}

/// Everything one run mutates
struct Run<'a, C, R> {
    controller: &'a mut C,
    recognizer: &'a R,
    config: &'a WayfindConfig,
    output_dir: &'a Path,
    cancel: &'a CancellationToken,
    graph: &'a NavigationGraph,
    executable: &'a Path,
    all_labels: Vec<SceneLabel>,
    state: TraversalState,
    report: CoverageReport,
    launch: LaunchMetrics,
    handle: Option<ProcessHandle>,
    window: Option<WindowRef>,
    /// Scene believed to be on screen; `None` when unknown
    current: Option<SceneId>,
    /// Set once the first launch found its window
    started: bool,
    deadline: Instant,
}

impl<'a, C, R> Run<'a, C, R>
where
    C: ProcessController,
    R: SceneRecognizer + ControlLocator,
{
    async fn execute(&mut self) -> Step<StopReason> {
        self.start_application().await?;
        self.started = true;

        let Some(start) = self.confirm_start().await? else {
            warn!("Start scene could not be recognized");
            return Ok(StopReason::StartUnrecognized);
        };
        info!("Start scene confirmed: {}", start);

        while let Some(scene) = self.state.next_scene() {
            self.check_halt()?;
            self.expand(&scene).await?;
        }

        Ok(StopReason::Completed)
    }

    // ---- lifecycle ----

    async fn start_application(&mut self) -> Step<()> {
        let started = Instant::now();
        let config = self.config;
        let process = &config.process;

        self.launch.attempts += 1;
        let first = self
            .controller
            .launch(self.executable, process.launch_grace())
            .await;
        let handle = match first {
            Ok(handle) => handle,
            Err(WayfindError::Launch(failure)) if failure.is_recoverable() => {
                warn!("{}; retrying with extended grace period", failure);
                self.launch.attempts += 1;
                self.controller
                    .launch(self.executable, process.extended_launch_grace())
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        if self.launch.pid.is_none() {
            self.launch.launch_ms = started.elapsed().as_millis() as u64;
        }
        self.launch.pid = Some(handle.pid);
        self.handle = Some(handle);
        self.locate_window().await
    }

    async fn locate_window(&mut self) -> Step<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(Halt::Fatal(WayfindError::InvalidState(
                "no running application".to_string(),
            )));
        };

        let window = self
            .controller
            .locate_window(handle, self.config.process.window_timeout())
            .await?;
        handle.window = Some(window);
        self.window = Some(window);
        Ok(())
    }

    async fn restart(&mut self) -> Step<()> {
        self.report.restarts += 1;
        info!("Restarting application (restart {})", self.report.restarts);

        if let Some(handle) = self.handle.take() {
            self.controller.terminate(&handle).await?;
        }
        self.window = None;
        self.current = None;

        match self.start_application().await {
            Ok(()) => {}
            Err(Halt::Fatal(e)) => {
                warn!("Restart failed: {}", e);
                return Err(Halt::Stop(StopReason::RestartFailed));
            }
            Err(other) => return Err(other),
        }
        self.resync().await
    }

    async fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let controller = &mut *self.controller;
            fail_open("terminate application", || async move {
                controller.terminate(&handle).await
            })
            .await;
        }
    }

    fn check_halt(&self) -> Step<()> {
        if self.cancel.is_cancelled() {
            info!("Traversal cancelled");
            return Err(Halt::Stop(StopReason::Cancelled));
        }
        if Instant::now() >= self.deadline {
            warn!("Traversal budget exhausted");
            return Err(Halt::Stop(StopReason::BudgetExhausted));
        }
        Ok(())
    }

    /// Sleep that wakes early on cancellation
    async fn pause(&self, duration: Duration) -> Step<()> {
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Halt::Stop(StopReason::Cancelled)),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    // ---- observation ----

    async fn capture(&mut self) -> Step<CapturedImage> {
        let Some(window) = self.window else {
            return Err(Halt::Stop(StopReason::WindowLost));
        };

        let captured = self.controller.capture_image(&window).await;
        match captured {
            Ok(image) => Ok(image),
            Err(WayfindError::Capture(detail)) => {
                warn!("Capture failed ({}); looking for the window again", detail);
                if let Err(e) = self.locate_window().await {
                    return Err(match e {
                        Halt::Fatal(e) => {
                            warn!("Window is gone: {}", e);
                            Halt::Stop(StopReason::WindowLost)
                        }
                        other => other,
                    });
                }
                let Some(window) = self.window else {
                    return Err(Halt::Stop(StopReason::WindowLost));
                };
                match self.controller.capture_image(&window).await {
                    Ok(image) => Ok(image),
                    Err(WayfindError::Capture(_)) => Err(Halt::Stop(StopReason::WindowLost)),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn labels_for(&self, ids: &[&SceneId]) -> Vec<SceneLabel> {
        ids.iter()
            .filter_map(|id| self.graph.scene(id))
            .map(SceneLabel::from)
            .collect()
    }

    /// Identify the current screen among all enabled scenes
    ///
    /// A confirmed scene not seen before is recorded as visited.
    async fn resync(&mut self) -> Step<()> {
        let image = self.capture().await?;
        let result = self.recognizer.recognize(&image, &self.all_labels).await;
        self.current = result.scene().cloned();

        if let Some(scene) = self.current.clone() {
            self.record_visit(&scene, &image)?;
        }
        debug!("Resynced: on {:?}", self.current);
        Ok(())
    }

    /// Initial observation, retried with backoff
    async fn confirm_start(&mut self) -> Step<Option<SceneId>> {
        let attempts = self.config.traversal.max_retries_per_edge.max(1);

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.check_halt()?;
                self.pause(self.config.traversal.retry_backoff()).await?;
            }
            self.resync().await?;
            if let Some(scene) = self.current.clone() {
                return Ok(Some(scene));
            }
            debug!("Start scene unrecognized (observation {})", attempt);
        }
        Ok(None)
    }

    fn record_visit(&mut self, scene: &SceneId, image: &CapturedImage) -> Step<bool> {
        if self.state.is_visited(scene) {
            return Ok(false);
        }
        let path = image.save(self.output_dir, &scene.file_stem())?;
        info!("Visited {} -> {}", scene, path.display());
        Ok(self.state.visit(scene.clone(), path))
    }

    // ---- navigation ----

    /// Activate `control` on the current screen; `Some(miss)` if it could not be used
    async fn activate(&mut self, control: &ControlDescriptor) -> Step<Option<Miss>> {
        let before = self.capture().await?;
        let Some(actions) = self.recognizer.resolve_control(&before, control).await else {
            debug!("Could not locate {}", control);
            return Ok(Some(Miss::ControlNotLocated));
        };

        let Some(window) = self.window else {
            return Err(Halt::Stop(StopReason::WindowLost));
        };
        for action in &actions {
            match self.controller.send_input(&window, action).await {
                Ok(()) => {}
                Err(WayfindError::Input(detail)) => {
                    warn!("Input {} failed: {}", action, detail);
                    return Ok(Some(Miss::InputFailed));
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.pause(self.config.traversal.settle_delay()).await?;
        Ok(None)
    }

    /// Follow confirmed steps; stops at the first step that does not land as expected
    async fn replay(&mut self, route: Vec<ConfirmedStep>) -> Step<()> {
        for step in route {
            if self.current.as_ref() != Some(&step.from) {
                return Ok(());
            }
            debug!("Replaying {} -> {} via {}", step.from, step.to, step.control);

            if self.activate(&step.control).await?.is_some() {
                return Ok(());
            }
            let image = self.capture().await?;
            let narrow = self.labels_for(&[&step.to]);
            let result = self.recognizer.recognize(&image, &narrow).await;
            if result.is(&step.to) {
                self.current = Some(step.to);
            } else {
                let wide = self.recognizer.recognize(&image, &self.all_labels).await;
                self.current = wide.scene().cloned();
                return Ok(());
            }
        }
        Ok(())
    }

    async fn replay_to(&mut self, target: &SceneId) -> Step<bool> {
        if let Some(current) = self.current.clone() {
            if let Some(route) = self.state.route(&current, target) {
                self.replay(route).await?;
            }
        }
        Ok(self.current.as_ref() == Some(target))
    }

    /// Bring the application to `target`: route replay, back key, restart
    async fn ensure_at(&mut self, target: &SceneId) -> Step<bool> {
        if self.current.is_none() {
            self.resync().await?;
        }
        if self.replay_to(target).await? {
            return Ok(true);
        }

        let config = self.config;
        let traversal = &config.traversal;
        if let Some(back_key) = traversal.back_key.clone().filter(|k| !k.trim().is_empty()) {
            let back = ControlDescriptor::Keys {
                keys: vec![back_key],
            };
            for _ in 0..traversal.max_back_steps {
                self.check_halt()?;
                if self.activate(&back).await?.is_some() {
                    break;
                }
                self.resync().await?;
                if self.replay_to(target).await? {
                    return Ok(true);
                }
            }
        }

        while self.report.restarts < traversal.max_restarts {
            self.check_halt()?;
            self.restart().await?;
            if self.replay_to(target).await? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    // ---- expansion ----

    async fn expand(&mut self, scene: &SceneId) -> Step<()> {
        let graph = self.graph;
        let Some(node) = graph.scene(scene) else {
            return Ok(());
        };
        debug!("Expanding {} ({} edges)", scene, node.out_edges.len());

        let mut edges = node.out_edges.iter();
        while let Some(edge) = edges.next() {
            let Some(target) = self.pending_target(scene, edge) else {
                continue;
            };

            let outcome = self.traverse_edge(scene, target, edge).await?;
            if let EdgeOutcome::SourceUnreachable = outcome {
                warn!("{} is unreachable; skipping its remaining edges", scene);
                self.skip(scene, edge, "source unreachable");
                for rest in edges.by_ref() {
                    if self.pending_target(scene, rest).is_some() {
                        self.skip(scene, rest, "source unreachable");
                    }
                }
            }
        }
        Ok(())
    }

    /// Target of `edge` if it still needs an attempt
    ///
    /// Unresolved and disabled targets are recorded as skipped; visited
    /// targets are dropped silently.
    fn pending_target<'e>(&mut self, from: &SceneId, edge: &'e TransitionEdge) -> Option<&'e SceneId> {
        let Some(target) = edge.target.resolved() else {
            self.skip(from, edge, "unresolved target");
            return None;
        };
        if !self.graph.is_enabled(target) {
            self.skip(from, edge, "target disabled");
            return None;
        }
        if self.state.is_visited(target) {
            return None;
        }
        Some(target)
    }

    fn skip(&mut self, from: &SceneId, edge: &TransitionEdge, reason: &str) {
        debug!("Skipping {} -> {:?}: {}", from, edge.target, reason);
        self.report.skipped_edges.push(SkippedEdge {
            from: from.clone(),
            target: edge.target.clone(),
            control: edge.control.clone(),
            reason: reason.to_string(),
        });
    }

    async fn traverse_edge(
        &mut self,
        from: &SceneId,
        target: &SceneId,
        edge: &TransitionEdge,
    ) -> Step<EdgeOutcome> {
        let key = EdgeKey {
            from: from.clone(),
            to: target.clone(),
            control: edge.control.clone(),
        };
        let max_attempts = self.config.traversal.max_retries_per_edge.max(1);

        loop {
            self.check_halt()?;
            if self.state.failure_count(&key) > 0 {
                self.pause(self.config.traversal.retry_backoff()).await?;
            }

            if self.state.is_visited(target) {
                return Ok(EdgeOutcome::AlreadyVisited);
            }
            if !self.ensure_at(from).await? {
                return Ok(EdgeOutcome::SourceUnreachable);
            }
            if self.state.is_visited(target) {
                debug!("{} confirmed while returning to {}", target, from);
                self.state.reset_failures(&key);
                return Ok(EdgeOutcome::AlreadyVisited);
            }

            let attempted = self.attempt(from, target, &edge.control).await?;
            let miss = match attempted {
                Ok(outcome) => {
                    self.state.reset_failures(&key);
                    return Ok(outcome);
                }
                Err(miss) => miss,
            };

            let count = self.state.record_failure(&key);
            debug!(
                "{} -> {} attempt {} failed: {}",
                from,
                target,
                count,
                miss.reason()
            );
            if count >= max_attempts {
                warn!(
                    "Giving up on {} -> {} via {} after {} attempts ({})",
                    from,
                    target,
                    edge.control,
                    count,
                    miss.reason()
                );
                self.report.failed_edges.push(FailedEdge {
                    from: from.clone(),
                    to: target.clone(),
                    control: edge.control.clone(),
                    count,
                    reason: miss.reason().to_string(),
                });
                return Ok(EdgeOutcome::Failed);
            }
        }
    }

    /// One attempt at an edge, starting on `from`
    async fn attempt(
        &mut self,
        from: &SceneId,
        target: &SceneId,
        control: &ControlDescriptor,
    ) -> Step<std::result::Result<EdgeOutcome, Miss>> {
        if let Some(miss) = self.activate(control).await? {
            return Ok(Err(miss));
        }

        let image = self.capture().await?;
        let narrow = self.labels_for(&[target, from]);
        let result = self.recognizer.recognize(&image, &narrow).await;
        debug!("Narrow recognition: {:?} ({:.2})", result.label, result.confidence);

        if result.is(target) {
            return self.arrived(from, target, control, &image).map(Ok);
        }
        if result.is(from) {
            self.current = Some(from.clone());
            return Ok(Err(Miss::NoChange));
        }

        let wide: RecognitionResult = self.recognizer.recognize(&image, &self.all_labels).await;
        match wide.scene().cloned() {
            Some(scene) if &scene == target => self.arrived(from, target, control, &image).map(Ok),
            Some(scene) if &scene == from => {
                self.current = Some(scene);
                Ok(Err(Miss::NoChange))
            }
            Some(landed) => {
                info!("{} -> {} landed on {} instead", from, target, landed);
                self.record_visit(&landed, &image)?;
                self.state
                    .record_confirmed(from.clone(), landed.clone(), control.clone());
                self.report.unexpected_transitions.push(UnexpectedTransition {
                    from: from.clone(),
                    intended: target.clone(),
                    landed: landed.clone(),
                    control: control.clone(),
                });
                self.current = Some(landed);
                Ok(Ok(EdgeOutcome::LandedElsewhere))
            }
            None => {
                self.current = None;
                Ok(Err(Miss::Unrecognized))
            }
        }
    }

    fn arrived(
        &mut self,
        from: &SceneId,
        target: &SceneId,
        control: &ControlDescriptor,
        image: &CapturedImage,
    ) -> Step<EdgeOutcome> {
        self.record_visit(target, image)?;
        self.state
            .record_confirmed(from.clone(), target.clone(), control.clone());
        self.current = Some(target.clone());
        Ok(EdgeOutcome::Reached)
    }

    fn into_report(self, stop: StopReason) -> CoverageReport {
        let mut report = self.report;
        report.visited = self.state.visited().to_vec();
        report.unreached = self
            .graph
            .enabled_scenes()
            .map(|s| s.id.clone())
            .filter(|id| !self.state.is_visited(id))
            .collect();
        report.screenshots = self
            .state
            .screenshots()
            .iter()
            .map(|(id, path)| (id.as_str().to_string(), path.clone()))
            .collect();
        report.stop_reason = Some(stop);
        report.launch = Some(self.launch);
        report.finish(self.config.traversal.completion_warn_threshold);
        report
    }
}
