//! Optical text extraction
//!
//! Tesseract is run as `tesseract stdin stdout tsv` with the encoded image on
//! stdin; its word-level TSV is grouped back into lines with bounding boxes.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};
use wayfind_core::{RecognitionConfig, Result, WayfindError};
use wayfind_process::CapturedImage;

/// TSV row level of a single word
const WORD_LEVEL: u32 = 5;

/// One recognized word with its pixel box
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f32,
}

/// Words tesseract placed on the same text line, left to right
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub words: Vec<Word>,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Height of the tallest word, a proxy for font size
    pub fn height(&self) -> i32 {
        self.words.iter().map(|w| w.height).max().unwrap_or(0)
    }

    /// Center of the union box of `words[start..end]`
    pub fn center_of(&self, start: usize, end: usize) -> Option<(i32, i32)> {
        let words = self.words.get(start..end)?;
        let left = words.iter().map(|w| w.left).min()?;
        let top = words.iter().map(|w| w.top).min()?;
        let right = words.iter().map(|w| w.left + w.width).max()?;
        let bottom = words.iter().map(|w| w.top + w.height).max()?;
        Some(((left + right) / 2, (top + bottom) / 2))
    }
}

/// Extracts text lines from an image
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, image: &CapturedImage) -> Result<Vec<TextLine>>;
}

/// Runs the `tesseract` command line tool
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    program: String,
    min_confidence: f32,
    timeout: Duration,
}

impl TesseractExtractor {
    pub fn new(config: &RecognitionConfig) -> Self {
        Self {
            program: config.tesseract_path.clone(),
            min_confidence: config.ocr_min_confidence,
            timeout: config.ocr_timeout(),
        }
    }
}

#[async_trait]
impl TextExtractor for TesseractExtractor {
    #[instrument(skip(self, image), fields(bytes = image.bytes.len()))]
    async fn extract(&self, image: &CapturedImage) -> Result<Vec<TextLine>> {
        let mut child = Command::new(&self.program)
            .args(["stdin", "stdout", "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WayfindError::Tool(format!("Failed to execute {}: {}", self.program, e)))?;

        let stdin = child.stdin.take();
        let run = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&image.bytes).await?;
                // Dropping stdin closes the pipe so tesseract starts reading
            }
            child.wait_with_output().await
        };

        // Timing out drops the child, which kills it
        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                WayfindError::Tool(format!(
                    "{} did not finish within {:?}",
                    self.program, self.timeout
                ))
            })??;
        if !output.status.success() {
            return Err(WayfindError::Tool(format!(
                "{} failed: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let lines = parse_tsv(&String::from_utf8_lossy(&output.stdout), self.min_confidence);
        debug!("OCR found {} lines", lines.len());
        Ok(lines)
    }
}

/// Group tesseract TSV word rows into lines
///
/// Words below `min_confidence` (0-100) or without text are dropped.
pub fn parse_tsv(tsv: &str, min_confidence: f32) -> Vec<TextLine> {
    let mut lines: BTreeMap<(u32, u32, u32, u32), Vec<Word>> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 12 {
            continue;
        }

        let num = |i: usize| cols[i].trim().parse::<i64>().ok();
        let (Some(level), Some(page), Some(block), Some(par), Some(line)) =
            (num(0), num(1), num(2), num(3), num(4))
        else {
            continue;
        };
        if level != i64::from(WORD_LEVEL) {
            continue;
        }

        let text = cols[11].trim();
        let confidence = cols[10].trim().parse::<f32>().unwrap_or(-1.0);
        if text.is_empty() || confidence < min_confidence {
            continue;
        }

        let (Some(left), Some(top), Some(width), Some(height)) = (num(6), num(7), num(8), num(9))
        else {
            continue;
        };

        lines
            .entry((page as u32, block as u32, par as u32, line as u32))
            .or_default()
            .push(Word {
                text: text.to_string(),
                left: left as i32,
                top: top as i32,
                width: width as i32,
                height: height as i32,
                confidence,
            });
    }

    lines
        .into_values()
        .map(|mut words| {
            words.sort_by_key(|w| w.left);
            TextLine { words }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t1280\t720\t-1\t
4\t1\t1\t1\t1\t0\t500\t40\t280\t48\t-1\t
5\t1\t1\t1\t1\t1\t500\t40\t120\t48\t96.1\tMain
5\t1\t1\t1\t1\t2\t640\t40\t140\t48\t95.3\tMenu
5\t1\t2\t1\t1\t1\t560\t300\t90\t20\t91.0\tSettings
5\t1\t2\t1\t1\t2\t700\t300\t10\t20\t12.0\t~
5\t1\t3\t1\t1\t1\t560\t350\t60\t20\t88.0\tAbout
";

    #[test]
    fn test_parse_tsv_groups_lines() {
        let lines = parse_tsv(TSV, 30.0);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text(), "Main Menu");
        assert_eq!(lines[0].height(), 48);
        assert_eq!(lines[0].center_of(0, 2), Some((640, 64)));

        // Low-confidence noise is dropped
        assert_eq!(lines[1].text(), "Settings");
        assert_eq!(lines[2].text(), "About");
    }

    #[test]
    fn test_parse_tsv_ignores_garbage() {
        assert!(parse_tsv("", 30.0).is_empty());
        assert!(parse_tsv("header\nnot\ta\trow", 30.0).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_tesseract_is_killed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let program = dir.path().join("tesseract");
        std::fs::write(&program, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = RecognitionConfig {
            tesseract_path: program.display().to_string(),
            ocr_timeout_ms: 100,
            ..RecognitionConfig::default()
        };
        let started = std::time::Instant::now();
        let err = TesseractExtractor::new(&config)
            .extract(&CapturedImage::new(b"PNG".to_vec(), "png"))
            .await
            .unwrap_err();

        assert!(matches!(err, WayfindError::Tool(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
