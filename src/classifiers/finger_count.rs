//! Finger-Count classifier. Per-hand finger up/down state, aggregated
//! into a total, stable-voted over the last K samples.

use super::{pose_for, Classifier};
use crate::model::{
    ExtractionResult, Finger, FingerStates, GestureTag, HandLandmarks, Handedness, InferenceResult,
};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
pub struct FingerCountConfig {
    pub smoothing_frames: usize,
    pub disable_thumb: bool,
}

impl Default for FingerCountConfig {
    fn default() -> Self {
        FingerCountConfig {
            smoothing_frames: 3,
            disable_thumb: false,
        }
    }
}

pub struct FingerCountClassifier {
    config: FingerCountConfig,
    history: VecDeque<u8>,
    supported: Vec<GestureTag>,
}

impl FingerCountClassifier {
    pub fn new(config: FingerCountConfig) -> Self {
        FingerCountClassifier {
            config,
            history: VecDeque::new(),
            supported: vec![
                GestureTag::FingerCount,
                GestureTag::Fist,
                GestureTag::OpenPalm,
                GestureTag::Peace,
                GestureTag::ThumbsUp,
                GestureTag::Pointing,
                GestureTag::None,
            ],
        }
    }

    fn finger_states(&self, hand: &HandLandmarks) -> FingerStates {
        let mut states = FingerStates::default();
        for finger in Finger::ALL {
            let up = match finger {
                Finger::Thumb => {
                    if self.config.disable_thumb {
                        false
                    } else {
                        let tip = hand.tip(Finger::Thumb);
                        let ip = hand.pip(Finger::Thumb);
                        match hand.handedness {
                            Handedness::Right => tip.x < ip.x,
                            Handedness::Left => tip.x > ip.x,
                        }
                    }
                }
                other => {
                    // image Y grows downward: tip above PIP means up.
                    hand.tip(other).y < hand.pip(other).y
                }
            };
            match finger {
                Finger::Thumb => states.thumb = up,
                Finger::Index => states.index = up,
                Finger::Middle => states.middle = up,
                Finger::Ring => states.ring = up,
                Finger::Pinky => states.pinky = up,
            }
        }
        states
    }

    /// Mode vote over the last `smoothing_frames` samples. Stable-vote
    /// mode rather than a rounded mean, so a single outlier sample never
    /// flips the emitted total.
    fn stable_vote(&self) -> u8 {
        let mut counts = [0u32; 6]; // 0..=5 fingers possible per frame total across hands is unbounded but clamp the vote buckets to a reasonable range
        let mut max_seen = 0u8;
        for &v in &self.history {
            let idx = v.min(5) as usize;
            counts[idx] += 1;
            max_seen = max_seen.max(v);
        }
        let mut best_idx = 0usize;
        let mut best_count = 0u32;
        for (idx, &count) in counts.iter().enumerate() {
            if count > best_count {
                best_count = count;
                best_idx = idx;
            }
        }
        if best_idx == 5 {
            max_seen.max(5)
        } else {
            best_idx as u8
        }
    }
}

impl Classifier for FingerCountClassifier {
    fn name(&self) -> &str {
        "finger_count"
    }

    fn supported_gestures(&self) -> &[GestureTag] {
        &self.supported
    }

    fn classify(&mut self, input: &ExtractionResult) -> InferenceResult {
        if input.hands.is_empty() {
            self.history.push_back(0);
            if self.history.len() > self.config.smoothing_frames {
                self.history.pop_front();
            }
            return InferenceResult::none();
        }

        let mut total = 0u8;
        let mut last_states = FingerStates::default();
        for hand in &input.hands {
            let states = self.finger_states(hand);
            total = total.saturating_add(states.count());
            last_states = states; // pose mapping uses the most recently processed hand
        }

        self.history.push_back(total);
        if self.history.len() > self.config.smoothing_frames {
            self.history.pop_front();
        }
        let smoothed = self.stable_vote();

        let gesture = if input.hands.len() == 1 {
            pose_for(&last_states).unwrap_or(GestureTag::FingerCount)
        } else {
            GestureTag::FingerCount
        };

        InferenceResult {
            gesture,
            confidence: input.hands.iter().map(|h| h.confidence).fold(0.0, f32::max),
            inference_latency_ms: 0.0,
            finger_count: Some(smoothed),
            finger_states: Some(last_states),
            pinch_distance: None,
            cursor_target: None,
            aux: Default::default(),
        }
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}
