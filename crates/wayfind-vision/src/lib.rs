//! # wayfind-vision
//!
//! Decides which known scene a captured window image shows, and where a
//! labelled control sits in it.
//!
//! This crate provides:
//! - `TextExtractor` with a Tesseract implementation
//! - `TextSceneRecognizer`, the OCR-based recognition policy
//! - `ScriptedRecognizer`, a test double for simulated applications

mod ocr;
mod recognizer;
mod scripted;
pub mod text;

pub use ocr::{parse_tsv, TesseractExtractor, TextExtractor, TextLine, Word};
pub use recognizer::{
    classify, locate_in_lines, ControlLocator, RecognitionLabel, RecognitionResult, SceneLabel,
    SceneRecognizer, TextSceneRecognizer,
};
pub use scripted::ScriptedRecognizer;
