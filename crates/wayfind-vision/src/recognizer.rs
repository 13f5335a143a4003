//! Scene recognition and control location
//!
//! Recognition never fails: OCR errors and ambiguous evidence both come back
//! as [`RecognitionLabel::Unrecognized`], and deciding what to do about that is
//! the caller's job.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};
use wayfind_core::{ControlDescriptor, RecognitionConfig, SceneId, SceneNode};
use wayfind_process::{CapturedImage, InputAction};

use crate::ocr::{TesseractExtractor, TextExtractor, TextLine};
use crate::text::{normalize, similarity};

/// Confidence reported when two candidates match equally well
const TIE_CONFIDENCE: f32 = 0.5;

/// A scene the recognizer may answer with, plus the texts that identify it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneLabel {
    pub id: SceneId,
    pub texts: Vec<String>,
}

impl SceneLabel {
    pub fn new(id: impl Into<SceneId>, texts: Vec<String>) -> Self {
        Self {
            id: id.into(),
            texts,
        }
    }
}

impl From<&SceneNode> for SceneLabel {
    fn from(node: &SceneNode) -> Self {
        Self {
            id: node.id.clone(),
            texts: node.display_texts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RecognitionLabel {
    Recognized { scene: SceneId },
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub label: RecognitionLabel,
    /// In [0, 1]
    pub confidence: f32,
}

impl RecognitionResult {
    pub fn recognized(scene: SceneId, confidence: f32) -> Self {
        Self {
            label: RecognitionLabel::Recognized { scene },
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn unrecognized(confidence: f32) -> Self {
        Self {
            label: RecognitionLabel::Unrecognized,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn scene(&self) -> Option<&SceneId> {
        match &self.label {
            RecognitionLabel::Recognized { scene } => Some(scene),
            RecognitionLabel::Unrecognized => None,
        }
    }

    pub fn is(&self, id: &SceneId) -> bool {
        self.scene() == Some(id)
    }
}

/// Classifies a captured image as one of the candidate scenes
#[async_trait]
pub trait SceneRecognizer: Send + Sync {
    async fn recognize(&self, image: &CapturedImage, candidates: &[SceneLabel])
        -> RecognitionResult;
}

/// Finds on-screen controls
#[async_trait]
pub trait ControlLocator: Send + Sync {
    /// Window-relative center of the control showing `text`
    async fn locate_label(&self, image: &CapturedImage, text: &str) -> Option<(i32, i32)>;

    /// Input events that activate `control`; `None` if it cannot be found
    async fn resolve_control(
        &self,
        image: &CapturedImage,
        control: &ControlDescriptor,
    ) -> Option<Vec<InputAction>> {
        match control {
            ControlDescriptor::Label { text } => self
                .locate_label(image, text)
                .await
                .map(|(x, y)| vec![InputAction::click(x, y)]),
            ControlDescriptor::Point { x, y } => Some(vec![InputAction::click(*x, *y)]),
            ControlDescriptor::Keys { keys } => {
                if keys.is_empty() {
                    None
                } else {
                    Some(keys.iter().map(InputAction::key).collect())
                }
            }
        }
    }
}

/// Pure recognition policy over extracted text lines
///
/// 1. A line whose normalized text equals a candidate text is an exact match.
///    With several exactly matching candidates the one matched by the tallest
///    line wins; equal heights are reported as unrecognized.
/// 2. Otherwise the best line similarity per candidate is compared; the top
///    candidate wins only if it reaches `threshold` and strictly beats the
///    runner-up.
pub fn classify(lines: &[TextLine], candidates: &[SceneLabel], threshold: f32) -> RecognitionResult {
    let normalized_lines: Vec<(String, i32)> = lines
        .iter()
        .map(|line| (normalize(&line.text()), line.height()))
        .filter(|(text, _)| !text.is_empty())
        .collect();

    let mut exact: Vec<(&SceneId, i32)> = Vec::new();
    let mut scored: Vec<(&SceneId, f32)> = Vec::new();

    for candidate in candidates {
        let texts: Vec<String> = candidate
            .texts
            .iter()
            .map(|t| normalize(t))
            .filter(|t| !t.is_empty())
            .collect();
        if texts.is_empty() {
            continue;
        }

        let exact_height = normalized_lines
            .iter()
            .filter(|(line, _)| texts.iter().any(|t| t == line))
            .map(|(_, height)| *height)
            .max();
        if let Some(height) = exact_height {
            exact.push((&candidate.id, height));
            continue;
        }

        let best = normalized_lines
            .iter()
            .flat_map(|(line, _)| texts.iter().map(move |t| similarity(t, line)))
            .fold(0.0_f32, f32::max);
        scored.push((&candidate.id, best));
    }

    if !exact.is_empty() {
        exact.sort_by(|a, b| b.1.cmp(&a.1));
        if exact.len() > 1 && exact[0].1 == exact[1].1 {
            debug!("Exact matches tie between {} and {}", exact[0].0, exact[1].0);
            return RecognitionResult::unrecognized(TIE_CONFIDENCE);
        }
        return RecognitionResult::recognized(exact[0].0.clone(), 1.0);
    }

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    match scored.as_slice() {
        [] => RecognitionResult::unrecognized(0.0),
        [(best, score)] if *score >= threshold => RecognitionResult::recognized((*best).clone(), *score),
        [(best, score), (_, runner_up), ..] if *score >= threshold && score > runner_up => {
            RecognitionResult::recognized((*best).clone(), *score)
        }
        [(_, score), ..] => RecognitionResult::unrecognized(*score),
    }
}

/// Center of the best run of words in `lines` spelling `label`
///
/// Runs with the same word count as the label are compared; an exact
/// normalized match wins, else the most similar run at or above `threshold`.
pub fn locate_in_lines(lines: &[TextLine], label: &str, threshold: f32) -> Option<(i32, i32)> {
    let target = normalize(label);
    if target.is_empty() {
        return None;
    }
    let width = target.split(' ').count();

    let mut best: Option<(f32, (i32, i32))> = None;
    for line in lines {
        if line.words.len() < width {
            continue;
        }
        for start in 0..=(line.words.len() - width) {
            let run = line.words[start..start + width]
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let score = similarity(&target, &normalize(&run));
            let Some(center) = line.center_of(start, start + width) else {
                continue;
            };
            if score >= 1.0 {
                return Some(center);
            }
            if score >= threshold && best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, center));
            }
        }
    }

    best.map(|(_, center)| center)
}

/// OCR-backed recognizer and control locator
pub struct TextSceneRecognizer<E: TextExtractor = TesseractExtractor> {
    extractor: E,
    threshold: f32,
}

impl TextSceneRecognizer<TesseractExtractor> {
    pub fn new(config: &RecognitionConfig) -> Self {
        Self::with_extractor(
            TesseractExtractor::new(config),
            config.recognition_similarity_threshold as f32,
        )
    }
}

impl<E: TextExtractor> TextSceneRecognizer<E> {
    pub fn with_extractor(extractor: E, threshold: f32) -> Self {
        Self {
            extractor,
            threshold,
        }
    }

    async fn lines(&self, image: &CapturedImage) -> Option<Vec<TextLine>> {
        match self.extractor.extract(image).await {
            Ok(lines) => Some(lines),
            Err(e) => {
                warn!("Text extraction failed: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl<E: TextExtractor> SceneRecognizer for TextSceneRecognizer<E> {
    async fn recognize(
        &self,
        image: &CapturedImage,
        candidates: &[SceneLabel],
    ) -> RecognitionResult {
        let Some(lines) = self.lines(image).await else {
            return RecognitionResult::unrecognized(0.0);
        };

        let result = classify(&lines, candidates, self.threshold);
        debug!(
            "Recognition over {} candidates: {:?} ({:.2})",
            candidates.len(),
            result.label,
            result.confidence
        );
        result
    }
}

#[async_trait]
impl<E: TextExtractor> ControlLocator for TextSceneRecognizer<E> {
    async fn locate_label(&self, image: &CapturedImage, text: &str) -> Option<(i32, i32)> {
        let lines = self.lines(image).await?;
        locate_in_lines(&lines, text, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::Word;
    use wayfind_core::Result;

    fn line(words: &[(&str, i32, i32)]) -> TextLine {
        TextLine {
            words: words
                .iter()
                .map(|(text, left, height)| Word {
                    text: text.to_string(),
                    left: *left,
                    top: 100,
                    width: 10 * text.len() as i32,
                    height: *height,
                    confidence: 90.0,
                })
                .collect(),
        }
    }

    fn label(id: &str, texts: &[&str]) -> SceneLabel {
        SceneLabel::new(id, texts.iter().map(|t| t.to_string()).collect())
    }

    fn home_screen() -> Vec<TextLine> {
        vec![
            line(&[("Main", 100, 48), ("Menu", 160, 48)]),
            line(&[("Settings", 100, 20)]),
            line(&[("About", 100, 20)]),
        ]
    }

    #[test]
    fn test_exact_match_prefers_tallest_line() {
        // Home shows a Settings button, but its own title is larger
        let candidates = vec![
            label("Settings", &["Settings"]),
            label("Home", &["Home", "Main Menu"]),
        ];
        let result = classify(&home_screen(), &candidates, 0.85);
        assert!(result.is(&SceneId::from("Home")));
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_exact_tie_is_unrecognized() {
        let candidates = vec![label("Settings", &["Settings"]), label("About", &["About"])];
        let result = classify(&home_screen(), &candidates, 0.85);
        assert_eq!(result.label, RecognitionLabel::Unrecognized);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_fuzzy_match_above_threshold() {
        let lines = vec![line(&[("Setlings", 100, 30)])];
        let candidates = vec![label("Settings", &["Settings"]), label("Home", &["Home"])];

        let result = classify(&lines, &candidates, 0.85);
        assert!(result.is(&SceneId::from("Settings")));
        assert!((result.confidence - 0.875).abs() < 1e-6);

        let strict = classify(&lines, &candidates, 0.9);
        assert_eq!(strict.label, RecognitionLabel::Unrecognized);
    }

    #[test]
    fn test_fuzzy_tie_is_unrecognized() {
        let lines = vec![line(&[("Levelx", 100, 30)])];
        let candidates = vec![label("Level1", &["Level1"]), label("Level2", &["Level2"])];
        let result = classify(&lines, &candidates, 0.5);
        assert_eq!(result.label, RecognitionLabel::Unrecognized);
    }

    #[test]
    fn test_nothing_readable() {
        let result = classify(&[], &[label("Home", &["Home"])], 0.85);
        assert_eq!(result, RecognitionResult::unrecognized(0.0));
    }

    #[test]
    fn test_locate_label_in_row_of_buttons() {
        let lines = vec![line(&[("Play", 100, 20), ("Career", 200, 20), ("Explorer", 270, 20)])];
        // "Career Explorer" spans x 200..350
        assert_eq!(locate_in_lines(&lines, "Career Explorer", 0.85), Some((275, 110)));
        assert_eq!(locate_in_lines(&lines, "Settings", 0.85), None);
    }

    struct FailingExtractor;

    #[async_trait]
    impl TextExtractor for FailingExtractor {
        async fn extract(&self, _image: &CapturedImage) -> Result<Vec<TextLine>> {
            Err(wayfind_core::WayfindError::Tool("tesseract missing".to_string()))
        }
    }

    #[tokio::test]
    async fn test_extraction_failure_is_unrecognized() {
        let recognizer = TextSceneRecognizer::with_extractor(FailingExtractor, 0.85);
        let image = CapturedImage::new(vec![1, 2, 3], "png");

        let result = recognizer
            .recognize(&image, &[label("Home", &["Home"])])
            .await;
        assert_eq!(result, RecognitionResult::unrecognized(0.0));

        let keys = ControlDescriptor::Keys {
            keys: vec!["enter".to_string()],
        };
        assert_eq!(
            recognizer.resolve_control(&image, &keys).await,
            Some(vec![InputAction::key("enter")])
        );
        let button = ControlDescriptor::Label {
            text: "Home".to_string(),
        };
        assert_eq!(recognizer.resolve_control(&image, &button).await, None);
    }
}
