//! Integration tests for capture strategy selection
//!
//! Covers:
//! - Traversal success and report writing
//! - Fallback on launch failure, missing executable and empty traversals
//! - Hard failures without a configured fallback
//! - Per-project serialization of runs

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wayfind_capture::{CaptureOutcome, CaptureRequest, CaptureStrategySelector, TraversalRunner};
use wayfind_core::{FallbackKind, LaunchFailure, NavigationGraph, Result, WayfindConfig};
use wayfind_process::{SimulatedApp, SimulatedController};
use wayfind_traverse::{CoverageReport, StopReason, TraversalEngine, REPORT_FILE};
use wayfind_vision::ScriptedRecognizer;

const MANIFEST: &str = r#"
entry = "Home"

[[scene]]
id = "Home"

[[scene]]
id = "Settings"

[[scene]]
id = "About"

[[edge]]
from = "Home"
to = "Settings"
label = "Settings"

[[edge]]
from = "Home"
to = "About"
label = "About"
"#;

/// Traversal against a simulated application
struct SimRunner {
    app: SimulatedApp,
    recognizer: ScriptedRecognizer,
}

impl SimRunner {
    fn new(app: SimulatedApp) -> Self {
        Self {
            app,
            recognizer: ScriptedRecognizer::perfect(),
        }
    }
}

#[async_trait]
impl TraversalRunner for SimRunner {
    async fn traverse(
        &self,
        graph: &NavigationGraph,
        executable: &Path,
        config: &WayfindConfig,
        output_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<CoverageReport> {
        let mut engine = TraversalEngine::new(
            SimulatedController::new(self.app.clone()),
            self.recognizer.clone(),
            config.clone(),
            output_dir.to_path_buf(),
        )
        .with_cancellation(cancel);
        engine.run(graph, executable).await
    }
}

fn home_app() -> SimulatedApp {
    SimulatedApp::new("Home")
        .with_button("Home", "Settings", "Settings")
        .with_button("Home", "About", "About")
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".wayfind")).unwrap();
    std::fs::write(dir.path().join(".wayfind/navigation.toml"), MANIFEST).unwrap();
    dir
}

fn fast_config() -> WayfindConfig {
    let mut config = WayfindConfig::default();
    config.traversal.settle_delay_ms = 0;
    config.traversal.retry_backoff_ms = 0;
    config
}

/// Config importing two pre-captured images from a fresh directory
fn import_config() -> (WayfindConfig, TempDir) {
    let captures = TempDir::new().unwrap();
    std::fs::write(captures.path().join("MainMenu.png"), b"png").unwrap();
    std::fs::write(captures.path().join("Options.png"), b"png").unwrap();

    let mut config = fast_config();
    config.capture.fallback = FallbackKind::Import;
    config.capture.import_dir = Some(captures.path().to_path_buf());
    (config, captures)
}

fn request(project: &TempDir, output: &TempDir, config: WayfindConfig) -> CaptureRequest {
    CaptureRequest::new(project.path(), output.path()).with_config(config)
}

#[tokio::test]
async fn test_traversal_success_writes_report() {
    let (project, output) = (project(), TempDir::new().unwrap());
    let selector = CaptureStrategySelector::with_runner(SimRunner::new(home_app()));

    let outcome = selector
        .run(request(&project, &output, fast_config()).with_executable("/sim/app"))
        .await;

    assert_eq!(outcome.exit_code(), 0);
    let CaptureOutcome::Succeeded(report) = outcome else {
        panic!("expected traversal success");
    };
    assert_eq!(report.strategy, "traversal");
    assert_eq!(report.visited_count, 3);
    assert!(report.fallback.is_none());

    let written = CoverageReport::load(&output.path().join(REPORT_FILE)).unwrap();
    assert_eq!(written.run_id, report.run_id);
    assert!(output.path().join("About.png").exists());
}

#[tokio::test]
async fn test_launch_failure_falls_back() {
    let (project, output) = (project(), TempDir::new().unwrap());
    let (config, _captures) = import_config();
    let app = home_app().fail_launches(5, LaunchFailure::NotFound("/sim/app".into()));
    let selector = CaptureStrategySelector::with_runner(SimRunner::new(app));

    let outcome = selector
        .run(request(&project, &output, config).with_executable("/sim/app"))
        .await;

    assert_eq!(outcome.exit_code(), 3);
    let CaptureOutcome::SucceededViaFallback(report) = outcome else {
        panic!("expected fallback success");
    };
    let fallback = report.fallback.as_ref().unwrap();
    assert_eq!(fallback.reason, "launch failed");
    assert!(fallback.detail.contains("/sim/app"));
    assert_eq!(report.strategy, "import");
    assert_eq!(report.screenshot_count(), 2);
    assert_eq!(report.total_scenes, 3);
    assert!(output.path().join("MainMenu.png").exists());
    assert!(output.path().join(REPORT_FILE).exists());
}

#[tokio::test]
async fn test_launch_failure_without_fallback_fails() {
    let (project, output) = (project(), TempDir::new().unwrap());
    let app = home_app().fail_launches(5, LaunchFailure::Spawn("permission denied".into()));
    let selector = CaptureStrategySelector::with_runner(SimRunner::new(app));

    let outcome = selector
        .run(request(&project, &output, fast_config()).with_executable("/sim/app"))
        .await;

    assert_eq!(outcome.exit_code(), 1);
    let CaptureOutcome::Failed(reason) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(reason.code, "launch failed");
    assert!(!output.path().join(REPORT_FILE).exists());
}

#[tokio::test]
async fn test_missing_executable_falls_back() {
    let (project, output) = (project(), TempDir::new().unwrap());
    let (config, _captures) = import_config();
    let selector = CaptureStrategySelector::with_runner(SimRunner::new(home_app()));

    let outcome = selector.run(request(&project, &output, config)).await;

    let report = outcome.report().unwrap();
    assert_eq!(outcome.exit_code(), 3);
    assert_eq!(report.fallback.as_ref().unwrap().reason, "no executable");
}

#[tokio::test]
async fn test_empty_project_fails_with_graph_reason() {
    let (project, output) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let selector = CaptureStrategySelector::with_runner(SimRunner::new(home_app()));

    let outcome = selector
        .run(request(&project, &output, fast_config()).with_executable("/sim/app"))
        .await;

    let CaptureOutcome::Failed(reason) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(reason.code, "graph build failed");
}

#[tokio::test]
async fn test_unrecognized_start_falls_back_keeping_partial_report() {
    let (project, output) = (project(), TempDir::new().unwrap());
    let (config, _captures) = import_config();
    let runner = SimRunner {
        app: home_app(),
        recognizer: ScriptedRecognizer::perfect().blind_to("Home"),
    };
    let selector = CaptureStrategySelector::with_runner(runner);

    let outcome = selector
        .run(request(&project, &output, config).with_executable("/sim/app"))
        .await;

    let CaptureOutcome::SucceededViaFallback(report) = outcome else {
        panic!("expected fallback success");
    };
    assert_eq!(report.fallback.as_ref().unwrap().reason, "no scenes confirmed");
    assert_eq!(report.stop_reason, Some(StopReason::StartUnrecognized));
    assert_eq!(report.launch.as_ref().unwrap().attempts, 1);
}

/// Runner that records how many traversals overlap
#[derive(Clone, Default)]
struct SlowRunner {
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

#[async_trait]
impl TraversalRunner for SlowRunner {
    async fn traverse(
        &self,
        _graph: &NavigationGraph,
        _executable: &Path,
        _config: &WayfindConfig,
        output_dir: &Path,
        _cancel: CancellationToken,
    ) -> Result<CoverageReport> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        let mut report = CoverageReport::new("traversal", 1);
        report
            .screenshots
            .insert("Home".to_string(), output_dir.join("Home.png"));
        Ok(report)
    }
}

#[tokio::test]
async fn test_runs_for_one_project_are_serialized() {
    let project = project();
    let (out_a, out_b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let runner = SlowRunner::default();
    let selector = CaptureStrategySelector::with_runner(runner.clone());

    let (a, b) = tokio::join!(
        selector.run(request(&project, &out_a, fast_config()).with_executable("/sim/app")),
        selector.run(request(&project, &out_b, fast_config()).with_executable("/sim/app")),
    );

    assert_eq!(a.exit_code(), 0);
    assert_eq!(b.exit_code(), 0);
    assert_eq!(runner.max_active.load(Ordering::SeqCst), 1);
}
