//! Configuration management for Wayfind
//!
//! Per-project overrides for traversal timing, recognition strictness, process
//! control and the capture fallback. Loaded from `.wayfind/config.toml` in the
//! project root; every key is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Result, WayfindError};

/// Project-level Wayfind configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WayfindConfig {
    /// Traversal timing and retry policy
    #[serde(default)]
    pub traversal: TraversalConfig,

    /// Scene recognition
    #[serde(default)]
    pub recognition: RecognitionConfig,

    /// Process controller timing
    #[serde(default)]
    pub process: ProcessConfig,

    /// Screenshot output and fallback capture
    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraversalConfig {
    /// Wait after each injected input before capturing
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Total attempts per edge before it is abandoned
    #[serde(default = "default_max_retries_per_edge")]
    pub max_retries_per_edge: u32,

    /// Global wall-clock budget for one traversal run
    #[serde(default = "default_traversal_budget_ms")]
    pub traversal_budget_ms: u64,

    /// Pause between attempts of the same edge
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Completion rate under which the report carries a warning
    #[serde(default = "default_completion_warn_threshold")]
    pub completion_warn_threshold: f64,

    /// Key that returns to the previous screen; an empty string disables it
    #[serde(default = "default_back_key", skip_serializing_if = "Option::is_none")]
    pub back_key: Option<String>,

    /// Back presses tried before restarting the application
    #[serde(default = "default_max_back_steps")]
    pub max_back_steps: u32,

    /// Application restarts allowed while returning to a scene
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionConfig {
    /// Fuzzy matches below this similarity are reported as unrecognized
    #[serde(default = "default_similarity_threshold")]
    pub recognition_similarity_threshold: f64,

    /// Tesseract binary used for text extraction
    #[serde(default = "default_tesseract_path")]
    pub tesseract_path: String,

    /// OCR words below this confidence (0-100) are discarded
    #[serde(default = "default_ocr_min_confidence")]
    pub ocr_min_confidence: f32,

    /// A Tesseract run exceeding this is killed and reported as a tool failure
    #[serde(default = "default_ocr_timeout_ms")]
    pub ocr_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessConfig {
    /// A process exiting before this elapses counts as a failed launch
    #[serde(default = "default_launch_grace_ms")]
    pub launch_grace_ms: u64,

    /// Grace period for the single retry after an early exit
    #[serde(default = "default_extended_launch_grace_ms")]
    pub extended_launch_grace_ms: u64,

    /// How long to poll for the application window
    #[serde(default = "default_window_timeout_ms")]
    pub window_timeout_ms: u64,

    /// Wait after a graceful close request before killing
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,

    /// Upper bound for a single input injection
    #[serde(default = "default_input_timeout_ms")]
    pub input_timeout_ms: u64,

    /// Upper bound for one window search or screen capture
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,

    /// Locate the window by title instead of by process id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
}

/// Alternative capture used when traversal is impossible or fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackKind {
    #[default]
    None,
    /// Periodic full-desktop screenshots
    Desktop,
    /// Copy images produced by another capture mechanism
    Import,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Image file extension for screenshots
    #[serde(default = "default_image_format")]
    pub image_format: String,

    #[serde(default)]
    pub fallback: FallbackKind,

    #[serde(default = "default_fallback_shots")]
    pub fallback_shots: u32,

    #[serde(default = "default_fallback_interval_ms")]
    pub fallback_interval_ms: u64,

    /// Source directory for the `import` fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_dir: Option<PathBuf>,
}

// Default value providers
fn default_settle_delay_ms() -> u64 {
    750
}

fn default_max_retries_per_edge() -> u32 {
    3
}

fn default_traversal_budget_ms() -> u64 {
    600_000
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_completion_warn_threshold() -> f64 {
    0.8
}

fn default_back_key() -> Option<String> {
    Some("Escape".to_string())
}

fn default_max_back_steps() -> u32 {
    3
}

fn default_max_restarts() -> u32 {
    2
}

fn default_similarity_threshold() -> f64 {
    0.85
}

fn default_tesseract_path() -> String {
    "tesseract".to_string()
}

fn default_ocr_min_confidence() -> f32 {
    30.0
}

fn default_ocr_timeout_ms() -> u64 {
    30_000
}

fn default_launch_grace_ms() -> u64 {
    2_000
}

fn default_extended_launch_grace_ms() -> u64 {
    8_000
}

fn default_window_timeout_ms() -> u64 {
    30_000
}

fn default_terminate_grace_ms() -> u64 {
    10_000
}

fn default_input_timeout_ms() -> u64 {
    5_000
}

fn default_capture_timeout_ms() -> u64 {
    10_000
}

fn default_image_format() -> String {
    "png".to_string()
}

fn default_fallback_shots() -> u32 {
    5
}

fn default_fallback_interval_ms() -> u64 {
    2_000
}

impl WayfindConfig {
    /// Relative location of the config file inside a project
    pub const RELATIVE_PATH: &'static str = ".wayfind/config.toml";

    /// Load configuration from `.wayfind/config.toml` or use defaults
    pub fn load_or_default(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(Self::RELATIVE_PATH);

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content).map_err(|e| {
                WayfindError::Config(format!(
                    "Failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Write default configuration to `.wayfind/config.toml`
    pub fn write_default(project_root: &Path) -> Result<PathBuf> {
        let config_dir = project_root.join(".wayfind");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = project_root.join(Self::RELATIVE_PATH);
        let content = toml::to_string_pretty(&Self::default()).map_err(|e| {
            WayfindError::Config(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    /// Reject values the traversal cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.traversal.max_retries_per_edge == 0 {
            return Err(WayfindError::Config(
                "maxRetriesPerEdge must be at least 1".to_string(),
            ));
        }

        let threshold = self.recognition.recognition_similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(WayfindError::Config(format!(
                "recognitionSimilarityThreshold must be within [0, 1], got {}",
                threshold
            )));
        }

        let warn = self.traversal.completion_warn_threshold;
        if !(0.0..=1.0).contains(&warn) {
            return Err(WayfindError::Config(format!(
                "completionWarnThreshold must be within [0, 1], got {}",
                warn
            )));
        }

        if self.capture.fallback == FallbackKind::Import && self.capture.import_dir.is_none() {
            return Err(WayfindError::Config(
                "fallback = \"import\" requires importDir".to_string(),
            ));
        }

        Ok(())
    }
}

impl TraversalConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn traversal_budget(&self) -> Duration {
        Duration::from_millis(self.traversal_budget_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl RecognitionConfig {
    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_millis(self.ocr_timeout_ms)
    }
}

impl ProcessConfig {
    pub fn launch_grace(&self) -> Duration {
        Duration::from_millis(self.launch_grace_ms)
    }

    pub fn extended_launch_grace(&self) -> Duration {
        Duration::from_millis(self.extended_launch_grace_ms)
    }

    pub fn window_timeout(&self) -> Duration {
        Duration::from_millis(self.window_timeout_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn input_timeout(&self) -> Duration {
        Duration::from_millis(self.input_timeout_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            max_retries_per_edge: default_max_retries_per_edge(),
            traversal_budget_ms: default_traversal_budget_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            completion_warn_threshold: default_completion_warn_threshold(),
            back_key: default_back_key(),
            max_back_steps: default_max_back_steps(),
            max_restarts: default_max_restarts(),
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            recognition_similarity_threshold: default_similarity_threshold(),
            tesseract_path: default_tesseract_path(),
            ocr_min_confidence: default_ocr_min_confidence(),
            ocr_timeout_ms: default_ocr_timeout_ms(),
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            launch_grace_ms: default_launch_grace_ms(),
            extended_launch_grace_ms: default_extended_launch_grace_ms(),
            window_timeout_ms: default_window_timeout_ms(),
            terminate_grace_ms: default_terminate_grace_ms(),
            input_timeout_ms: default_input_timeout_ms(),
            capture_timeout_ms: default_capture_timeout_ms(),
            window_title: None,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            image_format: default_image_format(),
            fallback: FallbackKind::None,
            fallback_shots: default_fallback_shots(),
            fallback_interval_ms: default_fallback_interval_ms(),
            import_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let config = WayfindConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config, WayfindConfig::default());
        assert_eq!(config.traversal.max_retries_per_edge, 3);
        assert_eq!(config.traversal.back_key.as_deref(), Some("Escape"));
    }

    #[test]
    fn test_partial_override() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".wayfind")).unwrap();
        std::fs::write(
            dir.path().join(".wayfind/config.toml"),
            r#"
[traversal]
settleDelayMs = 100
maxRetriesPerEdge = 5
traversalBudgetMs = 1000

[recognition]
recognitionSimilarityThreshold = 0.9
ocrTimeoutMs = 4000

[process]
captureTimeoutMs = 2500
"#,
        )
        .unwrap();

        let config = WayfindConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.traversal.settle_delay(), Duration::from_millis(100));
        assert_eq!(config.traversal.max_retries_per_edge, 5);
        assert_eq!(config.traversal.traversal_budget_ms, 1000);
        assert_eq!(config.traversal.retry_backoff_ms, 500);
        assert!((config.recognition.recognition_similarity_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.recognition.ocr_timeout(), Duration::from_secs(4));
        assert_eq!(config.process.capture_timeout(), Duration::from_millis(2500));
        assert_eq!(
            config.process,
            ProcessConfig {
                capture_timeout_ms: 2500,
                ..ProcessConfig::default()
            }
        );
    }

    #[test]
    fn test_rejects_zero_retries() {
        let mut config = WayfindConfig::default();
        config.traversal.max_retries_per_edge = 0;
        assert!(matches!(config.validate(), Err(WayfindError::Config(_))));
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let mut config = WayfindConfig::default();
        config.recognition.recognition_similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_import_fallback_requires_dir() {
        let mut config = WayfindConfig::default();
        config.capture.fallback = FallbackKind::Import;
        assert!(config.validate().is_err());
        config.capture.import_dir = Some(PathBuf::from("/shots"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_write_default_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = WayfindConfig::write_default(dir.path()).unwrap();
        assert!(path.ends_with("config.toml"));
        let loaded = WayfindConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, WayfindConfig::default());
    }
}
