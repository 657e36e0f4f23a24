//! Classifier plug-in set: the capability contract every
//! finger-count/volume/virtual-mouse classifier implements, plus the
//! pose lookup table shared by finger-based classifiers.
//!
//! The registry itself (the "active" atomic pointer, `register`/
//! `set_active`) lives in `crate::engine`.

pub mod finger_count;
pub mod one_euro;
pub mod virtual_mouse;
pub mod volume;

use crate::model::{ExtractionResult, FingerStates, GestureTag, InferenceResult};

/// Every classifier must be deterministic given its temporal state and
/// input sequence, expose a unique name, and support `reset()`.
pub trait Classifier: Send {
    fn name(&self) -> &str;
    fn supported_gestures(&self) -> &[GestureTag];
    fn classify(&mut self, input: &ExtractionResult) -> InferenceResult;
    fn reset(&mut self);
}

/// Canonical 5-tuple (thumb, index, middle, ring, pinky) -> pose tag
/// lookup table, kept as a constant table rather than an if/else cascade.
pub const POSE_TABLE: &[((bool, bool, bool, bool, bool), GestureTag)] = &[
    ((false, false, false, false, false), GestureTag::Fist),
    ((true, true, true, true, true), GestureTag::OpenPalm),
    ((false, true, true, false, false), GestureTag::Peace),
    ((true, false, false, false, false), GestureTag::ThumbsUp),
    ((false, true, false, false, false), GestureTag::Pointing),
];

pub fn pose_for(states: &FingerStates) -> Option<GestureTag> {
    let tuple = states.as_tuple();
    POSE_TABLE
        .iter()
        .find(|(pattern, _)| *pattern == tuple)
        .map(|(_, tag)| *tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_table_matches_documented_patterns() {
        let fist = FingerStates::default();
        assert_eq!(pose_for(&fist), Some(GestureTag::Fist));

        let open = FingerStates {
            thumb: true,
            index: true,
            middle: true,
            ring: true,
            pinky: true,
        };
        assert_eq!(pose_for(&open), Some(GestureTag::OpenPalm));

        let peace = FingerStates {
            thumb: false,
            index: true,
            middle: true,
            ring: false,
            pinky: false,
        };
        assert_eq!(pose_for(&peace), Some(GestureTag::Peace));

        let generic = FingerStates {
            thumb: true,
            index: true,
            middle: false,
            ring: false,
            pinky: true,
        };
        assert_eq!(pose_for(&generic), None);
    }
}
