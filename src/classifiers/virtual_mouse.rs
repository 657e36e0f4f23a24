//! Virtual-Mouse classifier: pointing-pose cursor control with One-Euro
//! smoothing and a pinch-driven click/drag state machine.

use super::one_euro::{OneEuroFilter2D, OneEuroParams};
use super::Classifier;
use crate::model::{ExtractionResult, Finger, GestureTag, HandLandmarks, InferenceResult};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MouseState {
    Idle,
    Moving,
    Clicking,
    Dragging,
}

#[derive(Debug, Clone, Copy)]
pub struct GestureZone {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl Default for GestureZone {
    fn default() -> Self {
        GestureZone {
            x_min: 0.2,
            y_min: 0.2,
            x_max: 0.8,
            y_max: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VirtualMouseConfig {
    pub require_pointing: bool,
    pub zone: GestureZone,
    pub screen_width: f32,
    pub screen_height: f32,
    pub edge_margin: f32,
    pub click_threshold: f32,
    pub drag_start_delay: Duration,
    pub one_euro: OneEuroParams,
    pub nominal_fps: f64,
}

impl Default for VirtualMouseConfig {
    fn default() -> Self {
        VirtualMouseConfig {
            require_pointing: true,
            zone: GestureZone::default(),
            screen_width: 1920.0,
            screen_height: 1080.0,
            edge_margin: 10.0,
            click_threshold: 0.05,
            drag_start_delay: Duration::from_millis(200),
            one_euro: OneEuroParams::default(),
            nominal_fps: 30.0,
        }
    }
}

pub struct VirtualMouseClassifier {
    config: VirtualMouseConfig,
    state: MouseState,
    filter: OneEuroFilter2D,
    pinch_since: Option<Instant>,
    drag_emitted: bool,
    start_time: Instant,
    supported: Vec<GestureTag>,
    last_click: Option<Instant>,
}

impl VirtualMouseClassifier {
    pub fn new(config: VirtualMouseConfig) -> Self {
        let filter = OneEuroFilter2D::new(config.one_euro, config.nominal_fps);
        VirtualMouseClassifier {
            config,
            state: MouseState::Idle,
            filter,
            pinch_since: None,
            drag_emitted: false,
            start_time: Instant::now(),
            supported: vec![GestureTag::Pointing, GestureTag::Pinch, GestureTag::None],
            last_click: None,
        }
    }

    fn is_pointing(hand: &HandLandmarks) -> bool {
        let index_up = hand.tip(Finger::Index).y < hand.pip(Finger::Index).y;
        let others_down = [Finger::Middle, Finger::Ring, Finger::Pinky]
            .iter()
            .all(|&f| hand.tip(f).y > hand.pip(f).y);
        index_up && others_down
    }

    fn pinch_distance(hand: &HandLandmarks) -> f32 {
        let thumb = hand.tip(Finger::Thumb);
        let index = hand.tip(Finger::Index);
        let dx = thumb.x - index.x;
        let dy = thumb.y - index.y;
        (dx * dx + dy * dy).sqrt()
    }

    fn map_to_screen(&mut self, hand: &HandLandmarks, now: Instant) -> (f32, f32) {
        let tip = hand.tip(Finger::Index);
        let zone = &self.config.zone;
        let zx = ((tip.x - zone.x_min) / (zone.x_max - zone.x_min).max(1e-9)).clamp(0.0, 1.0);
        let zy = ((tip.y - zone.y_min) / (zone.y_max - zone.y_min).max(1e-9)).clamp(0.0, 1.0);

        let margin = self.config.edge_margin;
        let screen_x = margin + zx * (self.config.screen_width - 2.0 * margin);
        let screen_y = margin + zy * (self.config.screen_height - 2.0 * margin);

        let t = now.duration_since(self.start_time).as_secs_f64();
        let (fx, fy) = self.filter.filter((screen_x as f64, screen_y as f64), t);
        (fx as f32, fy as f32)
    }

    /// Runs one step of the state machine; `now` is injected for
    /// deterministic tests of the click/drag timing.
    fn step(&mut self, input: &ExtractionResult, now: Instant) -> InferenceResult {
        let hand = match input.hands.first() {
            Some(h) => h,
            None => {
                self.state = MouseState::Idle;
                self.pinch_since = None;
                return InferenceResult::none();
            }
        };

        if self.config.require_pointing && !Self::is_pointing(hand) {
            self.state = MouseState::Idle;
            self.pinch_since = None;
            return InferenceResult::none();
        }

        let (cx, cy) = self.map_to_screen(hand, now);
        let pinching = Self::pinch_distance(hand) < self.config.click_threshold;

        let mut aux = std::collections::HashMap::new();
        let mut click = false;
        let mut drag = false;
        let mut release = false;

        match self.state {
            MouseState::Idle | MouseState::Moving => {
                if pinching {
                    self.state = MouseState::Clicking;
                    self.pinch_since = Some(now);
                    self.drag_emitted = false;
                } else {
                    self.state = MouseState::Moving;
                }
            }
            MouseState::Clicking => {
                if !pinching {
                    click = true;
                    self.state = MouseState::Moving;
                    self.pinch_since = None;
                } else if let Some(since) = self.pinch_since {
                    if now.duration_since(since) >= self.config.drag_start_delay {
                        drag = true;
                        self.drag_emitted = true;
                        self.state = MouseState::Dragging;
                    }
                }
            }
            MouseState::Dragging => {
                if !pinching {
                    release = true;
                    self.state = MouseState::Moving;
                    self.pinch_since = None;
                    self.drag_emitted = false;
                }
            }
        }

        if click {
            if let Some(prev) = self.last_click {
                let interval_ms = now.duration_since(prev).as_secs_f64() * 1000.0;
                aux.insert("prev_click_interval_ms".to_string(), serde_json::json!(interval_ms));
            }
            self.last_click = Some(now);
        }

        aux.insert("click".to_string(), serde_json::json!(click));
        aux.insert("drag".to_string(), serde_json::json!(drag));
        aux.insert("release".to_string(), serde_json::json!(release));

        InferenceResult {
            gesture: if pinching { GestureTag::Pinch } else { GestureTag::Pointing },
            confidence: hand.confidence,
            inference_latency_ms: 0.0,
            finger_count: None,
            finger_states: None,
            pinch_distance: Some(Self::pinch_distance(hand)),
            cursor_target: Some((cx, cy)),
            aux,
        }
    }
}

impl Classifier for VirtualMouseClassifier {
    fn name(&self) -> &str {
        "virtual_mouse"
    }

    fn supported_gestures(&self) -> &[GestureTag] {
        &self.supported
    }

    fn classify(&mut self, input: &ExtractionResult) -> InferenceResult {
        self.step(input, Instant::now())
    }

    fn reset(&mut self) {
        self.state = MouseState::Idle;
        self.filter.reset();
        self.pinch_since = None;
        self.drag_emitted = false;
        self.start_time = Instant::now();
        self.last_click = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Handedness, Landmark};

    fn pointing_hand(pinch_distance: f32) -> HandLandmarks {
        let mut points = [Landmark::new(0.5, 0.5, 0.0, 100, 100); 21];
        points[crate::model::INDEX_TIP] = Landmark::new(0.5, 0.2, 0.0, 100, 100);
        points[crate::model::INDEX_PIP] = Landmark::new(0.5, 0.5, 0.0, 100, 100);
        for (tip, pip) in [
            (crate::model::MIDDLE_TIP, crate::model::MIDDLE_PIP),
            (crate::model::RING_TIP, crate::model::RING_PIP),
            (crate::model::PINKY_TIP, crate::model::PINKY_PIP),
        ] {
            points[tip] = Landmark::new(0.5, 0.8, 0.0, 100, 100);
            points[pip] = Landmark::new(0.5, 0.5, 0.0, 100, 100);
        }
        points[crate::model::THUMB_TIP] = Landmark::new(0.5, 0.5, 0.0, 100, 100);
        points[crate::model::INDEX_TIP] = Landmark::new(0.5 + pinch_distance, 0.2, 0.0, 100, 100);
        HandLandmarks {
            points,
            handedness: Handedness::Right,
            confidence: 0.9,
        }
    }

    fn extraction(hand: HandLandmarks) -> ExtractionResult {
        ExtractionResult {
            hands: vec![hand],
            extraction_latency_ms: 0.0,
            frame_timestamp: 0.0,
        }
    }

    #[test]
    fn click_emitted_once_when_pinch_released_before_drag_delay() {
        let mut classifier = VirtualMouseClassifier::new(VirtualMouseConfig::default());
        let t0 = Instant::now();

        // not pinching -> Moving
        classifier.step(&extraction(pointing_hand(0.2)), t0);
        // pinch starts
        classifier.step(&extraction(pointing_hand(0.0)), t0 + Duration::from_millis(10));
        // release before drag_start_delay (150ms total pinch hold)
        let result = classifier.step(
            &extraction(pointing_hand(0.2)),
            t0 + Duration::from_millis(150),
        );
        assert_eq!(result.aux.get("click").unwrap(), &serde_json::json!(true));
        assert_eq!(result.aux.get("drag").unwrap(), &serde_json::json!(false));
    }

    #[test]
    fn drag_then_release_when_pinch_held_past_delay() {
        let mut classifier = VirtualMouseClassifier::new(VirtualMouseConfig::default());
        let t0 = Instant::now();

        classifier.step(&extraction(pointing_hand(0.2)), t0);
        classifier.step(&extraction(pointing_hand(0.0)), t0 + Duration::from_millis(10));
        let drag_result = classifier.step(
            &extraction(pointing_hand(0.0)),
            t0 + Duration::from_millis(250),
        );
        assert_eq!(drag_result.aux.get("drag").unwrap(), &serde_json::json!(true));

        let release_result = classifier.step(
            &extraction(pointing_hand(0.2)),
            t0 + Duration::from_millis(500),
        );
        assert_eq!(
            release_result.aux.get("release").unwrap(),
            &serde_json::json!(true)
        );
    }

    #[test]
    fn second_click_carries_prev_click_interval_ms() {
        let mut classifier = VirtualMouseClassifier::new(VirtualMouseConfig::default());
        let t0 = Instant::now();

        // first click cycle: pinch then release before the drag delay
        classifier.step(&extraction(pointing_hand(0.2)), t0);
        classifier.step(&extraction(pointing_hand(0.0)), t0 + Duration::from_millis(10));
        let first_click = classifier.step(
            &extraction(pointing_hand(0.2)),
            t0 + Duration::from_millis(50),
        );
        assert_eq!(first_click.aux.get("click").unwrap(), &serde_json::json!(true));
        assert!(!first_click.aux.contains_key("prev_click_interval_ms"));

        // second click cycle, pinch starting 350ms after t0 (300ms after the first click)
        classifier.step(&extraction(pointing_hand(0.0)), t0 + Duration::from_millis(350));
        let second_click = classifier.step(
            &extraction(pointing_hand(0.2)),
            t0 + Duration::from_millis(400),
        );
        assert_eq!(second_click.aux.get("click").unwrap(), &serde_json::json!(true));
        let interval = second_click
            .aux
            .get("prev_click_interval_ms")
            .unwrap()
            .as_f64()
            .unwrap();
        assert!((interval - 350.0).abs() < 1.0);
    }

    #[test]
    fn non_pointing_hand_emits_none_when_required() {
        let mut classifier = VirtualMouseClassifier::new(VirtualMouseConfig::default());
        let mut flat_hand = pointing_hand(0.2);
        // make middle finger up too, so it's no longer a pointing pose
        flat_hand.points[crate::model::MIDDLE_TIP] = Landmark::new(0.5, 0.2, 0.0, 100, 100);
        let result = classifier.step(&extraction(flat_hand), Instant::now());
        assert_eq!(result.gesture, GestureTag::None);
    }
}
