//! Alternative capture mechanisms
//!
//! Used when graph traversal cannot run or captured nothing. Each mechanism
//! writes images into the output directory and returns them keyed by label.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wayfind_core::{FallbackKind, Result, WayfindConfig, WayfindError};
use wayfind_process::{capture_desktop, CommandTool, DesktopTool};

const DEFAULT_SHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// Extensions picked up by [`DirectoryImport`]
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

#[async_trait]
pub trait FallbackCapture: Send + Sync {
    /// Strategy name recorded in the coverage report
    fn name(&self) -> &'static str;

    /// Write images into `output_dir`, returning label -> path
    async fn capture(
        &self,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, PathBuf>>;
}

/// Build the fallback selected by `config`, if any
pub fn fallback_for(config: &WayfindConfig) -> Option<Box<dyn FallbackCapture>> {
    let capture = &config.capture;
    match capture.fallback {
        FallbackKind::None => None,
        FallbackKind::Desktop => Some(Box::new(
            DesktopSnapshotCapture::new(
                capture.fallback_shots,
                Duration::from_millis(capture.fallback_interval_ms),
                capture.image_format.clone(),
            )
            .with_shot_timeout(config.process.capture_timeout()),
        )),
        FallbackKind::Import => match &capture.import_dir {
            Some(dir) => Some(Box::new(DirectoryImport::new(dir.clone()))),
            None => {
                warn!("Import fallback configured without importDir");
                None
            }
        },
    }
}

/// Fixed number of full-desktop screenshots taken at an interval
///
/// Files are named `screen_01.<ext>`, `screen_02.<ext>`, ... Cancellation
/// stops the loop and keeps what was captured so far.
pub struct DesktopSnapshotCapture<T: DesktopTool = CommandTool> {
    tool: T,
    shots: u32,
    interval: Duration,
    format: String,
    shot_timeout: Duration,
}

impl DesktopSnapshotCapture<CommandTool> {
    pub fn new(shots: u32, interval: Duration, format: impl Into<String>) -> Self {
        Self::with_tool(CommandTool, shots, interval, format)
    }
}

impl<T: DesktopTool> DesktopSnapshotCapture<T> {
    pub fn with_tool(tool: T, shots: u32, interval: Duration, format: impl Into<String>) -> Self {
        Self {
            tool,
            shots,
            interval,
            format: format.into(),
            shot_timeout: DEFAULT_SHOT_TIMEOUT,
        }
    }

    /// Give up on a single screenshot after `limit`
    pub fn with_shot_timeout(mut self, limit: Duration) -> Self {
        self.shot_timeout = limit;
        self
    }
}

#[async_trait]
impl<T: DesktopTool> FallbackCapture for DesktopSnapshotCapture<T> {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn capture(
        &self,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, PathBuf>> {
        info!("Taking {} desktop screenshots", self.shots);
        let mut captured = BTreeMap::new();

        for shot in 1..=self.shots {
            if shot > 1 {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Desktop capture cancelled after {} shots", captured.len());
                        break;
                    }
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }

            let label = format!("screen_{:02}", shot);
            let image = capture_desktop(&self.tool, &self.format, self.shot_timeout).await?;
            let path = image.save(output_dir, &label)?;
            debug!("Captured {}", path.display());
            captured.insert(label, path);
        }

        Ok(captured)
    }
}

/// Copies images written by another capture mechanism
///
/// File stems become labels. Non-image files are ignored.
pub struct DirectoryImport {
    source: PathBuf,
}

impl DirectoryImport {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }

    fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl FallbackCapture for DirectoryImport {
    fn name(&self) -> &'static str {
        "import"
    }

    async fn capture(
        &self,
        output_dir: &Path,
        _cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.source).await.map_err(|e| {
            WayfindError::Fallback(format!("cannot read {}: {}", self.source.display(), e))
        })?;

        let mut sources = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && Self::is_image(&path) {
                sources.push(path);
            }
        }
        sources.sort();

        tokio::fs::create_dir_all(output_dir).await?;
        let mut imported = BTreeMap::new();
        for source in sources {
            let (Some(stem), Some(name)) = (source.file_stem(), source.file_name()) else {
                continue;
            };
            let dest = output_dir.join(name);
            if dest != source {
                tokio::fs::copy(&source, &dest).await?;
            }
            imported.insert(stem.to_string_lossy().into_owned(), dest);
        }

        info!(
            "Imported {} images from {}",
            imported.len(),
            self.source.display()
        );
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wayfind_process::{MockDesktopTool, ToolOutput};

    const ROOT_CAPTURE: &str = "import -silent -window root png:-";

    #[tokio::test]
    async fn test_desktop_snapshots_are_numbered() {
        let out = TempDir::new().unwrap();
        let tool = MockDesktopTool::new().with_response(ROOT_CAPTURE, ToolOutput::ok("PNGDATA"));
        let capture = DesktopSnapshotCapture::with_tool(tool.clone(), 3, Duration::ZERO, "png");

        let shots = capture
            .capture(out.path(), &CancellationToken::new())
            .await
            .unwrap();

        let labels: Vec<&str> = shots.keys().map(|k| k.as_str()).collect();
        assert_eq!(labels, vec!["screen_01", "screen_02", "screen_03"]);
        assert_eq!(
            std::fs::read(out.path().join("screen_02.png")).unwrap(),
            b"PNGDATA"
        );
        assert_eq!(tool.invocations().await.len(), 3);
    }

    #[tokio::test]
    async fn test_desktop_capture_failure_propagates() {
        let out = TempDir::new().unwrap();
        let tool = MockDesktopTool::new()
            .with_response(ROOT_CAPTURE, ToolOutput::failed("unable to open X server"));
        let capture = DesktopSnapshotCapture::with_tool(tool, 2, Duration::ZERO, "png");

        let err = capture
            .capture(out.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WayfindError::Capture(_)));
    }

    #[tokio::test]
    async fn test_hung_desktop_capture_fails() {
        let out = TempDir::new().unwrap();
        let tool = MockDesktopTool::new().with_hang(ROOT_CAPTURE);
        let capture = DesktopSnapshotCapture::with_tool(tool, 2, Duration::ZERO, "png")
            .with_shot_timeout(Duration::from_millis(50));

        let err = capture
            .capture(out.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WayfindError::Capture(_)));
    }

    #[tokio::test]
    async fn test_desktop_capture_stops_on_cancel() {
        let out = TempDir::new().unwrap();
        let tool = MockDesktopTool::new().with_response(ROOT_CAPTURE, ToolOutput::ok("PNGDATA"));
        let capture =
            DesktopSnapshotCapture::with_tool(tool, 5, Duration::from_secs(60), "png");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let shots = capture.capture(out.path(), &cancel).await.unwrap();
        assert_eq!(shots.len(), 1);
    }

    #[tokio::test]
    async fn test_directory_import() {
        let source = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::write(source.path().join("MainMenu.png"), b"a").unwrap();
        std::fs::write(source.path().join("Settings.JPG"), b"b").unwrap();
        std::fs::write(source.path().join("notes.txt"), b"c").unwrap();

        let shots = DirectoryImport::new(source.path())
            .capture(out.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(shots.len(), 2);
        assert_eq!(shots["MainMenu"], out.path().join("MainMenu.png"));
        assert!(out.path().join("Settings.JPG").exists());
        assert!(!out.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_directory_import_missing_source() {
        let out = TempDir::new().unwrap();
        let err = DirectoryImport::new("/nonexistent/wayfind-import")
            .capture(out.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WayfindError::Fallback(_)));
    }

    #[test]
    fn test_fallback_for_config() {
        let mut config = WayfindConfig::default();
        assert!(fallback_for(&config).is_none());

        config.capture.fallback = FallbackKind::Desktop;
        assert_eq!(fallback_for(&config).unwrap().name(), "desktop");

        config.capture.fallback = FallbackKind::Import;
        assert!(fallback_for(&config).is_none());
        config.capture.import_dir = Some(PathBuf::from("/captures"));
        assert_eq!(fallback_for(&config).unwrap().name(), "import");
    }
}
