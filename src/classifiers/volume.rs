//! Volume-Control classifier: pinch distance mapped to a volume level
//! with exponential smoothing, plus a held-fist mute toggle.

use super::Classifier;
use crate::model::{ExtractionResult, Finger, GestureTag, HandLandmarks, Handedness, InferenceResult};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub enum HandPreference {
    Left,
    Right,
    Any,
}

#[derive(Debug, Clone, Copy)]
pub struct VolumeConfig {
    pub preferred_hand: HandPreference,
    pub d_min: f32,
    pub d_max: f32,
    pub v_min: f32,
    pub v_max: f32,
    pub smoothing_alpha: f32,
    pub mute_hold: Duration,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        VolumeConfig {
            preferred_hand: HandPreference::Any,
            d_min: 0.03,
            d_max: 0.15,
            v_min: 0.0,
            v_max: 1.0,
            smoothing_alpha: 0.3,
            mute_hold: Duration::from_millis(1000),
        }
    }
}

pub struct VolumeClassifier {
    config: VolumeConfig,
    smoothed_volume: Option<f32>,
    fist_since: Option<Instant>,
    mute_armed: bool,
    muted: bool,
    supported: Vec<GestureTag>,
}

impl VolumeClassifier {
    pub fn new(config: VolumeConfig) -> Self {
        VolumeClassifier {
            config,
            smoothed_volume: None,
            fist_since: None,
            mute_armed: true,
            muted: false,
            supported: vec![GestureTag::Pinch, GestureTag::Fist, GestureTag::None],
        }
    }

    fn select_hand<'a>(&self, hands: &'a [HandLandmarks]) -> Option<&'a HandLandmarks> {
        match self.config.preferred_hand {
            HandPreference::Any => hands.first(),
            HandPreference::Left => hands
                .iter()
                .find(|h| h.handedness == Handedness::Left)
                .or_else(|| hands.first()),
            HandPreference::Right => hands
                .iter()
                .find(|h| h.handedness == Handedness::Right)
                .or_else(|| hands.first()),
        }
    }

    fn is_fist(hand: &HandLandmarks) -> bool {
        [Finger::Index, Finger::Middle, Finger::Ring, Finger::Pinky]
            .iter()
            .all(|&f| hand.tip(f).y > hand.pip(f).y)
    }

    /// Returns Some(pinch_distance) and updates the smoothed volume and
    /// mute-hold state machine. `now` is injected for deterministic tests.
    fn step(&mut self, hand: &HandLandmarks, now: Instant) -> (f32, f32, bool) {
        let thumb = hand.tip(Finger::Thumb);
        let index = hand.tip(Finger::Index);
        let dx = thumb.x - index.x;
        let dy = thumb.y - index.y;
        let distance = (dx * dx + dy * dy).sqrt();

        let clamped = distance.clamp(self.config.d_min, self.config.d_max);
        let t = (clamped - self.config.d_min) / (self.config.d_max - self.config.d_min).max(1e-9);
        let target = self.config.v_min + t * (self.config.v_max - self.config.v_min);

        let smoothed = match self.smoothed_volume {
            Some(prev) => self.config.smoothing_alpha * target + (1.0 - self.config.smoothing_alpha) * prev,
            None => target,
        };
        self.smoothed_volume = Some(smoothed);

        let mut mute_toggled = false;
        if Self::is_fist(hand) {
            match self.fist_since {
                None => self.fist_since = Some(now),
                Some(since) => {
                    if now.duration_since(since) >= self.config.mute_hold && self.mute_armed {
                        self.muted = !self.muted;
                        mute_toggled = true;
                        self.mute_armed = false;
                    }
                }
            }
        } else {
            self.fist_since = None;
            self.mute_armed = true;
        }

        (distance, smoothed, mute_toggled)
    }
}

impl Classifier for VolumeClassifier {
    fn name(&self) -> &str {
        "volume_control"
    }

    fn supported_gestures(&self) -> &[GestureTag] {
        &self.supported
    }

    fn classify(&mut self, input: &ExtractionResult) -> InferenceResult {
        let hand = match self.select_hand(&input.hands) {
            Some(h) => h,
            None => return InferenceResult::none(),
        };

        let (distance, volume, mute_toggled) = self.step(hand, Instant::now());

        let mut aux = std::collections::HashMap::new();
        aux.insert("volume_level".to_string(), serde_json::json!(volume));
        aux.insert("mute_toggled".to_string(), serde_json::json!(mute_toggled));
        aux.insert("muted".to_string(), serde_json::json!(self.muted));

        InferenceResult {
            gesture: if Self::is_fist(hand) { GestureTag::Fist } else { GestureTag::Pinch },
            confidence: hand.confidence,
            inference_latency_ms: 0.0,
            finger_count: None,
            finger_states: None,
            pinch_distance: Some(distance),
            cursor_target: None,
            aux,
        }
    }

    fn reset(&mut self) {
        self.smoothed_volume = None;
        self.fist_since = None;
        self.mute_armed = true;
        self.muted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Landmark;

    fn hand_with_pinch(distance_x: f32) -> HandLandmarks {
        let mut points = [Landmark::new(0.5, 0.5, 0.0, 100, 100); 21];
        points[crate::model::THUMB_TIP] = Landmark::new(0.5, 0.5, 0.0, 100, 100);
        points[crate::model::INDEX_TIP] = Landmark::new(0.5 + distance_x, 0.5, 0.0, 100, 100);
        // keep non-thumb fingers "up" so is_fist() is false
        for (tip, pip) in [
            (crate::model::INDEX_TIP, crate::model::INDEX_PIP),
            (crate::model::MIDDLE_TIP, crate::model::MIDDLE_PIP),
            (crate::model::RING_TIP, crate::model::RING_PIP),
            (crate::model::PINKY_TIP, crate::model::PINKY_PIP),
        ] {
            if tip != crate::model::INDEX_TIP {
                points[tip] = Landmark::new(0.5, 0.2, 0.0, 100, 100);
            }
            points[pip] = Landmark::new(0.5, 0.5, 0.0, 100, 100);
        }
        HandLandmarks {
            points,
            handedness: Handedness::Right,
            confidence: 0.9,
        }
    }

    #[test]
    fn volume_mapping_matches_scenario_3_bounds() {
        let mut classifier = VolumeClassifier::new(VolumeConfig {
            smoothing_alpha: 1.0, // disable smoothing lag for this boundary check
            ..Default::default()
        });
        let (d, v, _) = classifier.step(&hand_with_pinch(0.03), Instant::now());
        assert!((d - 0.03).abs() < 1e-6);
        assert!((v - 0.0).abs() < 1e-6);

        classifier.reset();
        let (_, v, _) = classifier.step(&hand_with_pinch(0.15), Instant::now());
        assert!((v - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mute_toggles_exactly_once_per_sustained_fist() {
        let mut classifier = VolumeClassifier::new(VolumeConfig::default());
        let mut fist = hand_with_pinch(0.03);
        // force all non-thumb tips below pip => fist
        for (tip, pip) in [
            (crate::model::INDEX_TIP, crate::model::INDEX_PIP),
            (crate::model::MIDDLE_TIP, crate::model::MIDDLE_PIP),
            (crate::model::RING_TIP, crate::model::RING_PIP),
            (crate::model::PINKY_TIP, crate::model::PINKY_PIP),
        ] {
            fist.points[tip] = Landmark::new(0.5, 0.8, 0.0, 100, 100);
            fist.points[pip] = Landmark::new(0.5, 0.5, 0.0, 100, 100);
        }

        let t0 = Instant::now();
        let (_, _, toggled_early) = classifier.step(&fist, t0);
        assert!(!toggled_early);

        let (_, _, toggled_at_hold) = classifier.step(&fist, t0 + Duration::from_millis(1000));
        assert!(toggled_at_hold);

        let (_, _, toggled_again) = classifier.step(&fist, t0 + Duration::from_millis(2000));
        assert!(!toggled_again, "must fire exactly once per sustained fist");
    }
}
