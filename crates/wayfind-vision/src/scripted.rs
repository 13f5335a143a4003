//! Recognizer for simulated applications
//!
//! Reads the [`SimulatedFrame`] the simulator renders instead of running OCR,
//! so traversal tests control recognition exactly: a scene can be made
//! invisible for good or for its first few observations, or misread as
//! another one.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use wayfind_process::{CapturedImage, SimulatedFrame};

use crate::recognizer::{ControlLocator, RecognitionResult, SceneLabel, SceneRecognizer};
use crate::text::normalize;

#[derive(Debug, Clone, Default)]
pub struct ScriptedRecognizer {
    blind: HashSet<String>,
    blind_first: HashMap<String, usize>,
    observations: Arc<Mutex<HashMap<String, usize>>>,
    misreads: HashMap<String, String>,
}

impl ScriptedRecognizer {
    /// Recognizes every screen correctly
    pub fn perfect() -> Self {
        Self::default()
    }

    /// Never recognize `screen`
    pub fn blind_to(mut self, screen: impl Into<String>) -> Self {
        self.blind.insert(screen.into());
        self
    }

    /// Fail to recognize the first `count` observations of `screen`
    pub fn blind_at_first(mut self, screen: impl Into<String>, count: usize) -> Self {
        self.blind_first.insert(screen.into(), count);
        self
    }

    fn still_blind(&self, screen: &str) -> bool {
        let Some(&limit) = self.blind_first.get(screen) else {
            return false;
        };
        let mut observations = self
            .observations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let seen = observations.entry(screen.to_string()).or_default();
        *seen += 1;
        *seen <= limit
    }

    /// Report `actual` as `reported`
    pub fn misread(mut self, actual: impl Into<String>, reported: impl Into<String>) -> Self {
        self.misreads.insert(actual.into(), reported.into());
        self
    }
}

#[async_trait]
impl SceneRecognizer for ScriptedRecognizer {
    async fn recognize(
        &self,
        image: &CapturedImage,
        candidates: &[SceneLabel],
    ) -> RecognitionResult {
        let Some(frame) = SimulatedFrame::parse(&image.bytes) else {
            return RecognitionResult::unrecognized(0.0);
        };
        if self.blind.contains(&frame.screen) || self.still_blind(&frame.screen) {
            return RecognitionResult::unrecognized(0.0);
        }

        let seen = self
            .misreads
            .get(&frame.screen)
            .cloned()
            .unwrap_or(frame.screen);

        candidates
            .iter()
            .find(|c| c.id.as_str() == seen)
            .map(|c| RecognitionResult::recognized(c.id.clone(), 1.0))
            .unwrap_or_else(|| RecognitionResult::unrecognized(0.0))
    }
}

#[async_trait]
impl ControlLocator for ScriptedRecognizer {
    async fn locate_label(&self, image: &CapturedImage, text: &str) -> Option<(i32, i32)> {
        let frame = SimulatedFrame::parse(&image.bytes)?;
        let wanted = normalize(text);
        frame
            .buttons
            .iter()
            .find(|(label, _, _)| normalize(label) == wanted)
            .map(|(_, x, y)| (*x, *y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfind_core::SceneId;

    fn frame(screen: &str) -> CapturedImage {
        let frame = SimulatedFrame {
            screen: screen.to_string(),
            buttons: vec![("Settings".to_string(), 100, 40)],
        };
        CapturedImage::new(frame.render(), "png")
    }

    fn candidates() -> Vec<SceneLabel> {
        vec![
            SceneLabel::new("Home", vec![]),
            SceneLabel::new("Settings", vec![]),
        ]
    }

    #[tokio::test]
    async fn test_scripted_recognition() {
        let recognizer = ScriptedRecognizer::perfect().blind_to("Settings");

        let home = recognizer.recognize(&frame("Home"), &candidates()).await;
        assert!(home.is(&SceneId::from("Home")));

        let settings = recognizer.recognize(&frame("Settings"), &candidates()).await;
        assert!(settings.scene().is_none());

        let outside = recognizer.recognize(&frame("About"), &candidates()).await;
        assert!(outside.scene().is_none());
    }

    #[tokio::test]
    async fn test_blind_at_first() {
        let recognizer = ScriptedRecognizer::perfect().blind_at_first("Home", 2);

        assert!(recognizer.recognize(&frame("Settings"), &candidates()).await.scene().is_some());
        assert!(recognizer.recognize(&frame("Home"), &candidates()).await.scene().is_none());
        assert!(recognizer.recognize(&frame("Home"), &candidates()).await.scene().is_none());
        let third = recognizer.recognize(&frame("Home"), &candidates()).await;
        assert!(third.is(&SceneId::from("Home")));
    }

    #[tokio::test]
    async fn test_misread_and_locate() {
        let recognizer = ScriptedRecognizer::perfect().misread("Home", "Settings");
        let result = recognizer.recognize(&frame("Home"), &candidates()).await;
        assert!(result.is(&SceneId::from("Settings")));

        assert_eq!(
            recognizer.locate_label(&frame("Home"), "settings").await,
            Some((100, 40))
        );
        assert_eq!(recognizer.locate_label(&frame("Home"), "About").await, None);
    }
}
