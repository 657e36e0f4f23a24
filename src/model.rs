//! Shared data model: frames, landmarks, inference results and output
//! events that flow between pipeline stages.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A raw frame pulled from the capture backend. Immutable after creation.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pixels: Vec<u8>,
    pub capture_timestamp: f64,
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub capture_latency_ms: f64,
}

/// A frame after the preprocessing stage chain.
#[derive(Debug, Clone)]
pub struct PreprocessedFrame {
    pub pixels: Vec<u8>,
    /// Present only when `normalized` is set: `pixels` converted to
    /// `[0, 1]`-range floats (`byte as f32 / 255.0`). `pixels` itself is
    /// left untouched so stages that only need the raw bytes never pay
    /// for the conversion.
    pub pixels_f32: Option<Vec<f32>>,
    pub original_width: u32,
    pub original_height: u32,
    pub processed_width: u32,
    pub processed_height: u32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub normalized: bool,
    pub capture_timestamp: f64,
}

/// Ordering of the 21 points is fixed by the extractor contract: wrist=0,
/// thumb chain 1..4, index 5..8, middle 9..12, ring 13..16, pinky 17..20.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub pixel_x: f32,
    pub pixel_y: f32,
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, source_width: u32, source_height: u32) -> Self {
        Landmark {
            x,
            y,
            z,
            pixel_x: x * source_width as f32,
            pixel_y: y * source_height as f32,
            visibility: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Handedness {
    Left,
    Right,
}

/// Fixed 21-point landmark layout for a single detected hand.
#[derive(Debug, Clone)]
pub struct HandLandmarks {
    pub points: [Landmark; 21],
    pub handedness: Handedness,
    pub confidence: f32,
}

// Tip / PIP (or IP for the thumb) index pairs used throughout the
// classifier set.
pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const THUMB_IP: usize = 3;
pub const INDEX_TIP: usize = 8;
pub const INDEX_PIP: usize = 6;
pub const MIDDLE_TIP: usize = 12;
pub const MIDDLE_PIP: usize = 10;
pub const RING_TIP: usize = 16;
pub const RING_PIP: usize = 14;
pub const PINKY_TIP: usize = 20;
pub const PINKY_PIP: usize = 18;

impl HandLandmarks {
    pub fn tip(&self, finger: Finger) -> Landmark {
        self.points[finger.tip_index()]
    }

    pub fn pip(&self, finger: Finger) -> Landmark {
        self.points[finger.pip_index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    pub fn tip_index(self) -> usize {
        match self {
            Finger::Thumb => THUMB_TIP,
            Finger::Index => INDEX_TIP,
            Finger::Middle => MIDDLE_TIP,
            Finger::Ring => RING_TIP,
            Finger::Pinky => PINKY_TIP,
        }
    }

    pub fn pip_index(self) -> usize {
        match self {
            Finger::Thumb => THUMB_IP,
            Finger::Index => INDEX_PIP,
            Finger::Middle => MIDDLE_PIP,
            Finger::Ring => RING_PIP,
            Finger::Pinky => PINKY_PIP,
        }
    }
}

/// Output of the extraction stage: up to `max_hands` detections.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub hands: Vec<HandLandmarks>,
    pub extraction_latency_ms: f64,
    pub frame_timestamp: f64,
}

/// Per-finger up/down state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FingerStates {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerStates {
    pub fn count(&self) -> u8 {
        [self.thumb, self.index, self.middle, self.ring, self.pinky]
            .iter()
            .filter(|b| **b)
            .count() as u8
    }

    pub fn as_tuple(&self) -> (bool, bool, bool, bool, bool) {
        (self.thumb, self.index, self.middle, self.ring, self.pinky)
    }
}

/// Stable string enum over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureTag {
    None,
    FingerCount,
    Pinch,
    SwipeLeft,
    SwipeRight,
    SwipeUp,
    SwipeDown,
    ThumbsUp,
    ThumbsDown,
    Fist,
    OpenPalm,
    Peace,
    OkSign,
    Pointing,
}

impl Default for GestureTag {
    fn default() -> Self {
        GestureTag::None
    }
}

/// Result of a single classify() call, bounded to one frame iteration.
#[derive(Debug, Clone, Default)]
pub struct InferenceResult {
    pub gesture: GestureTag,
    pub confidence: f32,
    pub inference_latency_ms: f64,
    pub finger_count: Option<u8>,
    pub finger_states: Option<FingerStates>,
    pub pinch_distance: Option<f32>,
    pub cursor_target: Option<(f32, f32)>,
    pub aux: HashMap<String, serde_json::Value>,
}

impl InferenceResult {
    pub fn none() -> Self {
        InferenceResult {
            gesture: GestureTag::None,
            confidence: 0.0,
            finger_count: Some(0),
            ..Default::default()
        }
    }
}

/// An event fanned out by the Output Dispatcher. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct OutputEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub project: String,
    pub timestamp_ms: u64,
    pub data: serde_json::Value,
}
