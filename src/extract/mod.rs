//! Extractor: an opaque capability that turns a preprocessed frame into
//! up to `max_hands` hand-landmark detections. The real hand-landmark
//! model is an out-of-scope external collaborator; this
//! module defines the contract and ships a deterministic stub used by
//! tests and by any caller that has not wired in a real model.

use crate::error::ExtractionError;
use crate::model::{ExtractionResult, HandLandmarks};
use std::time::Instant;

/// Implemented by whatever backs the real hand-landmark model. Must be
/// initialized once and reused; a load failure is fatal.
pub trait Extractor: Send {
    fn extract(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<HandLandmarks>, ExtractionError>;
}

pub struct ExtractorConfig {
    pub max_hands: usize,
    pub min_detection_confidence: f32,
}

/// Drives a boxed `Extractor`, de-normalizing float32 pixels back to uint8
/// if the preprocessor emitted a normalized frame (the detector always
/// expects uint8 input).
pub struct ExtractionEngine {
    backend: Box<dyn Extractor>,
    config: ExtractorConfig,
}

impl ExtractionEngine {
    pub fn new(backend: Box<dyn Extractor>, config: ExtractorConfig) -> Self {
        ExtractionEngine { backend, config }
    }

    pub fn run(
        &mut self,
        frame: &crate::model::PreprocessedFrame,
    ) -> Result<ExtractionResult, ExtractionError> {
        let start = Instant::now();

        let pixels: Cow<[u8]> = if frame.normalized {
            let pixels_f32 = frame
                .pixels_f32
                .as_ref()
                .expect("normalized frame must carry pixels_f32");
            Cow::Owned(
                pixels_f32
                    .iter()
                    .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
                    .collect(),
            )
        } else {
            Cow::Borrowed(&frame.pixels)
        };

        let mut hands = self
            .backend
            .extract(&pixels, frame.processed_width, frame.processed_height)?;

        hands.retain(|h| h.confidence >= self.config.min_detection_confidence);
        if hands.len() > self.config.max_hands {
            hands.truncate(self.config.max_hands);
        }

        Ok(ExtractionResult {
            hands,
            extraction_latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            frame_timestamp: frame.capture_timestamp,
        })
    }
}

use std::borrow::Cow;

/// A stub extractor: never detects a hand. Useful as a placeholder before
/// a real model is wired in, and in tests that only exercise classifiers
/// by constructing `ExtractionResult`s directly.
pub struct NullExtractor;

impl Extractor for NullExtractor {
    fn extract(
        &mut self,
        _pixels: &[u8],
        _width: u32,
        _height: u32,
    ) -> Result<Vec<HandLandmarks>, ExtractionError> {
        Ok(Vec::new())
    }
}
