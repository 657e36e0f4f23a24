//! Inference Engine: name→classifier registry plus a single atomically
//! swapped "active" pointer, guarded by a `parking_lot::Mutex` the same
//! way a small shared session table would be.

use crate::classifiers::Classifier;
use crate::error::ClassifierError;
use crate::metrics::LatencyWindow;
use crate::model::{ExtractionResult, InferenceResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

/// Holds every registered classifier and tracks which one is active.
/// `infer` and `set_active` may race; both take the same lock, so a
/// frame iteration observes a stable, fully-reset classifier reference
/// for its whole stage chain.
pub struct InferenceEngine {
    state: Mutex<EngineState>,
    latency: LatencyWindow,
}

struct EngineState {
    classifiers: HashMap<String, Box<dyn Classifier>>,
    active: Option<String>,
}

impl InferenceEngine {
    pub fn new() -> Self {
        InferenceEngine {
            state: Mutex::new(EngineState {
                classifiers: HashMap::new(),
                active: None,
            }),
            latency: LatencyWindow::new(),
        }
    }

    pub fn register(&self, classifier: Box<dyn Classifier>) -> Result<(), ClassifierError> {
        let mut state = self.state.lock();
        let name = classifier.name().to_string();
        if state.classifiers.contains_key(&name) {
            return Err(ClassifierError::DuplicateName(name));
        }
        state.classifiers.insert(name, classifier);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Result<(), ClassifierError> {
        let mut state = self.state.lock();
        if !state.classifiers.contains_key(name) {
            return Err(ClassifierError::NotFound(name.to_string()));
        }
        if state.active.as_deref() == Some(name) {
            return Err(ClassifierError::ActiveInUse(name.to_string()));
        }
        state.classifiers.remove(name);
        Ok(())
    }

    /// Switches the active classifier, calling `reset()` on it before any
    /// frame can reach it, so the first classify call after activation
    /// never observes stale temporal state.
    pub fn set_active(&self, name: &str) -> Result<(), ClassifierError> {
        let mut state = self.state.lock();
        if !state.classifiers.contains_key(name) {
            return Err(ClassifierError::NotFound(name.to_string()));
        }
        if let Some(classifier) = state.classifiers.get_mut(name) {
            classifier.reset();
        }
        state.active = Some(name.to_string());
        Ok(())
    }

    pub fn active_name(&self) -> Option<String> {
        self.state.lock().active.clone()
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.state.lock().classifiers.keys().cloned().collect()
    }

    /// Routes a frame to the active classifier. Returns an empty result
    /// rather than an error when nothing is active, since that is routine
    /// at startup, not exceptional.
    pub fn infer(&self, input: &ExtractionResult) -> InferenceResult {
        let start = Instant::now();
        let mut state = self.state.lock();
        let result = match state.active.clone() {
            Some(name) => match state.classifiers.get_mut(&name) {
                Some(classifier) => classifier.classify(input),
                None => InferenceResult::none(),
            },
            None => InferenceResult::none(),
        };
        drop(state);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.latency.push(elapsed_ms);

        InferenceResult {
            inference_latency_ms: elapsed_ms,
            ..result
        }
    }

    pub fn avg_inference_latency_ms(&self) -> f64 {
        self.latency.avg()
    }
}

impl Default for InferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GestureTag;

    struct StubClassifier {
        name: String,
        reset_calls: std::sync::Arc<std::sync::atomic::AtomicU32>,
    }

    impl Classifier for StubClassifier {
        fn name(&self) -> &str {
            &self.name
        }

        fn supported_gestures(&self) -> &[GestureTag] {
            &[]
        }

        fn classify(&mut self, _input: &ExtractionResult) -> InferenceResult {
            InferenceResult::none()
        }

        fn reset(&mut self) {
            self.reset_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn stub(name: &str) -> (Box<dyn Classifier>, std::sync::Arc<std::sync::atomic::AtomicU32>) {
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        (
            Box::new(StubClassifier {
                name: name.to_string(),
                reset_calls: counter.clone(),
            }),
            counter,
        )
    }

    fn extraction() -> ExtractionResult {
        ExtractionResult {
            hands: vec![],
            extraction_latency_ms: 0.0,
            frame_timestamp: 0.0,
        }
    }

    #[test]
    fn infer_with_no_active_returns_empty_result() {
        let engine = InferenceEngine::new();
        let result = engine.infer(&extraction());
        assert_eq!(result.gesture, GestureTag::None);
    }

    #[test]
    fn set_active_resets_before_first_classify() {
        let engine = InferenceEngine::new();
        let (classifier, resets) = stub("a");
        engine.register(classifier).unwrap();
        engine.set_active("a").unwrap();
        assert_eq!(resets.load(std::sync::atomic::Ordering::SeqCst), 1);
        engine.infer(&extraction());
        assert_eq!(resets.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_active_classifier_is_rejected() {
        let engine = InferenceEngine::new();
        let (classifier, _) = stub("a");
        engine.register(classifier).unwrap();
        engine.set_active("a").unwrap();
        assert!(matches!(
            engine.unregister("a"),
            Err(ClassifierError::ActiveInUse(_))
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let engine = InferenceEngine::new();
        let (c1, _) = stub("a");
        let (c2, _) = stub("a");
        engine.register(c1).unwrap();
        assert!(matches!(
            engine.register(c2),
            Err(ClassifierError::DuplicateName(_))
        ));
    }
}
