//! Coverage report
//!
//! Written as `coverage.json` next to the screenshots. Field names are
//! camelCase so downstream visual-analysis tooling can read it directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use wayfind_core::{ControlDescriptor, EdgeTarget, Result, SceneId};

/// File name of the serialized report inside the output directory
pub const REPORT_FILE: &str = "coverage.json";

const COMPLETION_WARNING_PREFIX: &str = "completion rate";

/// Why a traversal run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Frontier exhausted
    Completed,
    BudgetExhausted,
    Cancelled,
    ProcessCrashed,
    /// The first screen could not be identified
    StartUnrecognized,
    /// The window disappeared and could not be found again
    WindowLost,
    /// A restart needed to reach a scene did not produce a usable window
    RestartFailed,
    /// An unrecoverable error after the start scene was confirmed; the
    /// cause is recorded in `warnings`
    Error,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::BudgetExhausted => "budget exhausted",
            Self::Cancelled => "cancelled",
            Self::ProcessCrashed => "process crashed",
            Self::StartUnrecognized => "start unrecognized",
            Self::WindowLost => "window lost",
            Self::RestartFailed => "restart failed",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// An edge abandoned after exhausting its retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedEdge {
    pub from: SceneId,
    pub to: SceneId,
    pub control: ControlDescriptor,
    pub count: u32,
    /// Outcome of the last attempt
    pub reason: String,
}

/// An edge that was never attempted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedEdge {
    pub from: SceneId,
    pub target: EdgeTarget,
    pub control: ControlDescriptor,
    pub reason: String,
}

/// Navigation that confirmed a scene other than the intended one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnexpectedTransition {
    pub from: SceneId,
    pub intended: SceneId,
    pub landed: SceneId,
    pub control: ControlDescriptor,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Time from the first launch request to a confirmed launch
    pub launch_ms: u64,
    /// Launch requests, restarts included
    pub attempts: u32,
    pub crashed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Why an alternative capture mechanism produced this report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackRecord {
    /// Machine-readable reason, e.g. `launch failed`
    pub reason: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Capture mechanism that produced the screenshots
    pub strategy: String,
    pub visited_count: usize,
    /// Enabled scenes in the navigation graph
    pub total_scenes: usize,
    pub completion_rate: f64,
    pub visited: Vec<SceneId>,
    /// Enabled scenes never confirmed
    pub unreached: Vec<SceneId>,
    pub failed_edges: Vec<FailedEdge>,
    pub skipped_edges: Vec<SkippedEdge>,
    pub unexpected_transitions: Vec<UnexpectedTransition>,
    /// Screenshot per label: scene ids for traversal, shot names for fallbacks
    pub screenshots: BTreeMap<String, PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch: Option<LaunchMetrics>,
    pub restarts: u32,
    pub warnings: Vec<String>,
}

impl CoverageReport {
    pub fn new(strategy: impl Into<String>, total_scenes: usize) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            finished_at: now,
            strategy: strategy.into(),
            visited_count: 0,
            total_scenes,
            completion_rate: 0.0,
            visited: Vec::new(),
            unreached: Vec::new(),
            failed_edges: Vec::new(),
            skipped_edges: Vec::new(),
            unexpected_transitions: Vec::new(),
            screenshots: BTreeMap::new(),
            stop_reason: None,
            fallback: None,
            launch: None,
            restarts: 0,
            warnings: Vec::new(),
        }
    }

    /// Stamp the finish time and derive the completion rate
    ///
    /// A rate below `warn_threshold` adds a warning; it is never an error.
    /// Finishing again replaces the earlier completion warning.
    pub fn finish(&mut self, warn_threshold: f64) {
        self.finished_at = Utc::now();
        self.warnings
            .retain(|w| !w.starts_with(COMPLETION_WARNING_PREFIX));
        self.visited_count = self.visited.len();
        self.completion_rate = if self.total_scenes == 0 {
            0.0
        } else {
            self.visited_count as f64 / self.total_scenes as f64
        };

        if self.total_scenes > 0 && self.completion_rate < warn_threshold {
            self.warnings.push(format!(
                "{} {:.0}% is below {:.0}% ({} of {} scenes)",
                COMPLETION_WARNING_PREFIX,
                self.completion_rate * 100.0,
                warn_threshold * 100.0,
                self.visited_count,
                self.total_scenes
            ));
        }
    }

    pub fn screenshot_count(&self) -> usize {
        self.screenshots.len()
    }

    /// Write `<dir>/coverage.json`, returning its path
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_computes_rate_and_warns() {
        let mut report = CoverageReport::new("traversal", 3);
        report.visited = vec![SceneId::from("Home"), SceneId::from("Settings")];
        report.finish(0.8);

        assert_eq!(report.visited_count, 2);
        assert!((report.completion_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.finished_at >= report.started_at);

        report.warnings.push("window lost once".to_string());
        report.finish(0.8);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings[0].starts_with("window lost"));
    }

    #[test]
    fn test_full_coverage_no_warning() {
        let mut report = CoverageReport::new("traversal", 1);
        report.visited = vec![SceneId::from("Home")];
        report.finish(0.8);
        assert_eq!(report.completion_rate, 1.0);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_serialized_field_names() {
        let mut report = CoverageReport::new("traversal", 0);
        report.stop_reason = Some(StopReason::BudgetExhausted);
        report.finish(0.8);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["visitedCount"], 0);
        assert_eq!(json["totalScenes"], 0);
        assert_eq!(json["completionRate"], 0.0);
        assert_eq!(json["stopReason"], "budget_exhausted");
        assert!(json["failedEdges"].as_array().unwrap().is_empty());
        assert!(json.get("fallback").is_none());
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut report = CoverageReport::new("traversal", 2);
        report
            .screenshots
            .insert("Home".to_string(), dir.path().join("Home.png"));
        report.finish(0.8);

        let path = report.write_to(dir.path()).unwrap();
        assert!(path.ends_with(REPORT_FILE));
        assert_eq!(CoverageReport::load(&path).unwrap(), report);
    }
}
