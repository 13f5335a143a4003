//! Capture strategy selection
//!
//! Decides once per audit run how screenshots are produced:
//!
//! 1. Build the navigation graph and, given an executable, traverse it
//! 2. If that is impossible or confirmed nothing, run the configured fallback
//! 3. Otherwise report the failure with a machine-readable reason
//!
//! Runs for the same project are serialized.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wayfind_core::fail_open::fail_open;
use wayfind_core::{NavigationGraph, Result, WayfindConfig};
use wayfind_graph::GraphBuilder;
use wayfind_process::DesktopController;
use wayfind_traverse::{CoverageReport, FallbackRecord, StopReason, TraversalEngine};
use wayfind_vision::TextSceneRecognizer;

use crate::fallback::fallback_for;

/// Everything one capture run needs
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub project_root: PathBuf,
    pub executable: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub config: WayfindConfig,
    pub cancel: CancellationToken,
}

impl CaptureRequest {
    pub fn new(project_root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            executable: None,
            output_dir: output_dir.into(),
            config: WayfindConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn with_config(mut self, config: WayfindConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Why a capture run produced nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReason {
    /// Machine-readable, e.g. `launch failed`
    pub code: String,
    pub detail: String,
}

impl FailureReason {
    pub fn new(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}

#[derive(Debug)]
pub enum CaptureOutcome {
    Succeeded(CoverageReport),
    SucceededViaFallback(CoverageReport),
    Failed(FailureReason),
}

impl CaptureOutcome {
    /// Process exit code: 0, 3 for a fallback, 1 for failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Succeeded(_) => 0,
            Self::SucceededViaFallback(_) => 3,
            Self::Failed(_) => 1,
        }
    }

    pub fn report(&self) -> Option<&CoverageReport> {
        match self {
            Self::Succeeded(report) | Self::SucceededViaFallback(report) => Some(report),
            Self::Failed(_) => None,
        }
    }
}

/// Runs one traversal; the seam between selection policy and live processes
#[async_trait]
pub trait TraversalRunner: Send + Sync {
    async fn traverse(
        &self,
        graph: &NavigationGraph,
        executable: &Path,
        config: &WayfindConfig,
        output_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<CoverageReport>;
}

/// Traversal on the local desktop with OCR recognition
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopTraversalRunner;

#[async_trait]
impl TraversalRunner for DesktopTraversalRunner {
    async fn traverse(
        &self,
        graph: &NavigationGraph,
        executable: &Path,
        config: &WayfindConfig,
        output_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<CoverageReport> {
        let controller = DesktopController::new(config.process.clone())
            .with_image_format(config.capture.image_format.clone());
        let recognizer = TextSceneRecognizer::new(&config.recognition);

        let mut engine =
            TraversalEngine::new(controller, recognizer, config.clone(), output_dir.to_path_buf())
                .with_cancellation(cancel);
        engine.run(graph, executable).await
    }
}

/// Where a traversal attempt left things
enum Verdict {
    Done(CoverageReport),
    FallBack {
        reason: String,
        detail: String,
        total_scenes: usize,
        partial: Option<CoverageReport>,
    },
    Fail(FailureReason),
}

pub struct CaptureStrategySelector<T: TraversalRunner = DesktopTraversalRunner> {
    runner: T,
    graph_builder: GraphBuilder,
    project_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl CaptureStrategySelector<DesktopTraversalRunner> {
    pub fn new() -> Self {
        Self::with_runner(DesktopTraversalRunner)
    }
}

impl Default for CaptureStrategySelector<DesktopTraversalRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TraversalRunner> CaptureStrategySelector<T> {
    pub fn with_runner(runner: T) -> Self {
        Self {
            runner,
            graph_builder: GraphBuilder::new(),
            project_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_graph_builder(mut self, graph_builder: GraphBuilder) -> Self {
        self.graph_builder = graph_builder;
        self
    }

    /// Produce screenshots for `request.project_root`
    ///
    /// Never yields a success without at least one screenshot. The coverage
    /// report of a successful run is written to `<outputDir>/coverage.json`.
    pub async fn run(&self, request: CaptureRequest) -> CaptureOutcome {
        let lock = self.project_lock(&request.project_root).await;
        let _guard = lock.lock().await;

        let outcome = match self.attempt_traversal(&request).await {
            Verdict::Done(report) => CaptureOutcome::Succeeded(report),
            Verdict::Fail(reason) => CaptureOutcome::Failed(reason),
            Verdict::FallBack {
                reason,
                detail,
                total_scenes,
                partial,
            } => self
                .fall_back(&request, reason, detail, total_scenes, partial)
                .await,
        };

        if let Some(report) = outcome.report() {
            let dir = request.output_dir.as_path();
            if let Some(path) = fail_open("write coverage report", || async {
                report.write_to(dir)
            })
            .await
            {
                info!("Coverage report written to {}", path.display());
            }
        }

        match &outcome {
            CaptureOutcome::Succeeded(r) => info!(
                "Capture succeeded: {} screenshots ({:.0}% of scenes)",
                r.screenshot_count(),
                r.completion_rate * 100.0
            ),
            CaptureOutcome::SucceededViaFallback(r) => info!(
                "Capture succeeded via {} fallback: {} screenshots",
                r.strategy,
                r.screenshot_count()
            ),
            CaptureOutcome::Failed(reason) => warn!("Capture failed: {}", reason),
        }
        outcome
    }

    async fn project_lock(&self, root: &Path) -> Arc<Mutex<()>> {
        let key = tokio::fs::canonicalize(root)
            .await
            .unwrap_or_else(|_| root.to_path_buf());
        let mut locks = self.project_locks.lock().await;
        locks.entry(key).or_default().clone()
    }

    async fn attempt_traversal(&self, request: &CaptureRequest) -> Verdict {
        let graph = match self.graph_builder.build(&request.project_root) {
            Ok(graph) => graph,
            Err(e) => return Self::on_error(e, 0),
        };
        let total_scenes = graph.enabled_scenes().count();
        info!(
            "Navigation graph: {} scenes ({} enabled)",
            graph.len(),
            total_scenes
        );

        let Some(executable) = request.executable.as_deref() else {
            return Verdict::FallBack {
                reason: "no executable".to_string(),
                detail: "no executable was supplied".to_string(),
                total_scenes,
                partial: None,
            };
        };

        let result = self
            .runner
            .traverse(
                &graph,
                executable,
                &request.config,
                &request.output_dir,
                request.cancel.clone(),
            )
            .await;

        match result {
            Ok(report) => Self::judge(report),
            Err(e) => Self::on_error(e, total_scenes),
        }
    }

    fn on_error(err: wayfind_core::WayfindError, total_scenes: usize) -> Verdict {
        if err.is_fallback_eligible() {
            Verdict::FallBack {
                reason: err.reason_code().to_string(),
                detail: err.to_string(),
                total_scenes,
                partial: None,
            }
        } else {
            Verdict::Fail(FailureReason::new(err.reason_code(), err.to_string()))
        }
    }

    /// A finished traversal is a success only if it captured something
    fn judge(report: CoverageReport) -> Verdict {
        if report.screenshot_count() > 0 {
            return Verdict::Done(report);
        }
        if report.stop_reason == Some(StopReason::Cancelled) {
            return Verdict::Fail(FailureReason::new(
                "cancelled",
                "cancelled before any scene was captured",
            ));
        }

        let crashed = report.launch.as_ref().map(|l| l.crashed).unwrap_or(false);
        let (reason, detail) = if crashed {
            ("process crashed", "application crashed before any scene was captured")
        } else {
            ("no scenes confirmed", "traversal confirmed no scene")
        };
        Verdict::FallBack {
            reason: reason.to_string(),
            detail: detail.to_string(),
            total_scenes: report.total_scenes,
            partial: Some(report),
        }
    }

    async fn fall_back(
        &self,
        request: &CaptureRequest,
        reason: String,
        detail: String,
        total_scenes: usize,
        partial: Option<CoverageReport>,
    ) -> CaptureOutcome {
        let Some(fallback) = fallback_for(&request.config) else {
            warn!("Traversal unusable ({}) and no fallback configured", reason);
            return CaptureOutcome::Failed(FailureReason::new(reason, detail));
        };

        warn!(
            "Falling back to {} capture: {} ({})",
            fallback.name(),
            reason,
            detail
        );

        let shots = match fallback.capture(&request.output_dir, &request.cancel).await {
            Ok(shots) => shots,
            Err(e) => {
                return CaptureOutcome::Failed(FailureReason::new(
                    reason,
                    format!("{}; {} fallback failed: {}", detail, fallback.name(), e),
                ))
            }
        };
        if shots.is_empty() {
            return CaptureOutcome::Failed(FailureReason::new(
                reason,
                format!("{}; {} fallback captured nothing", detail, fallback.name()),
            ));
        }

        let mut report =
            partial.unwrap_or_else(|| CoverageReport::new(fallback.name(), total_scenes));
        report.strategy = fallback.name().to_string();
        report.screenshots = shots;
        report.fallback = Some(FallbackRecord { reason, detail });
        report.finish(request.config.traversal.completion_warn_threshold);

        CaptureOutcome::SucceededViaFallback(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let report = CoverageReport::new("traversal", 1);
        assert_eq!(CaptureOutcome::Succeeded(report.clone()).exit_code(), 0);
        assert_eq!(CaptureOutcome::SucceededViaFallback(report).exit_code(), 3);

        let failed = CaptureOutcome::Failed(FailureReason::new("launch failed", "x"));
        assert_eq!(failed.exit_code(), 1);
        assert!(failed.report().is_none());
    }

    #[test]
    fn test_empty_report_is_judged_for_fallback() {
        let report = CoverageReport::new("traversal", 3);
        match CaptureStrategySelector::<DesktopTraversalRunner>::judge(report) {
            Verdict::FallBack { reason, total_scenes, partial, .. } => {
                assert_eq!(reason, "no scenes confirmed");
                assert_eq!(total_scenes, 3);
                assert!(partial.is_some());
            }
            _ => panic!("expected fallback"),
        }
    }

    #[test]
    fn test_cancelled_empty_report_fails() {
        let mut report = CoverageReport::new("traversal", 3);
        report.stop_reason = Some(StopReason::Cancelled);
        assert!(matches!(
            CaptureStrategySelector::<DesktopTraversalRunner>::judge(report),
            Verdict::Fail(_)
        ));
    }
}
