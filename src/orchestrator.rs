//! Orchestrator: the state machine coordinating start/stop/switch and
//! owning the per-frame stage loop. A single owner constructs every
//! stage, logs transitions, and guarantees teardown releases the capture
//! device on every exit path: `stop()` always calls `capture.stop()`
//! regardless of which state the machine was in.

use crate::capture::{CaptureBackend, CaptureSource};
use crate::config::Config;
use crate::dispatch::OutputDispatcher;
use crate::engine::InferenceEngine;
use crate::error::OrchestratorError;
use crate::extract::ExtractionEngine;
use crate::hub::ProjectController;
use crate::metrics::PipelineMetrics;
use crate::pipeline::buffer::FrameBuffer;
use crate::pipeline::preprocess::{self, PreprocessOptions};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorStatus {
    Idle,
    Initializing,
    Running,
    Paused,
    Stopping,
    Stopped,
    Error,
}

struct Shared {
    status: Mutex<OrchestratorStatus>,
    consecutive_errors: AtomicU32,
    active_project: Mutex<Option<String>>,
    buffer: Arc<FrameBuffer>,
    engine: Arc<InferenceEngine>,
    dispatcher: Arc<OutputDispatcher>,
    metrics: Arc<PipelineMetrics>,
    preprocess_opts: PreprocessOptions,
    config: Config,
    sequence: AtomicU64,
}

/// Owns the capture source, the per-frame task handle, and every shared
/// pipeline component. Constructed once at startup; `start`/`stop`/
/// `switch_project`/`pause`/`resume` mutate the state machine.
pub struct Orchestrator {
    shared: Arc<Shared>,
    capture: Mutex<Option<CaptureSource>>,
    extractor: Arc<Mutex<ExtractionEngine>>,
    frame_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        extractor: ExtractionEngine,
        engine: Arc<InferenceEngine>,
        dispatcher: Arc<OutputDispatcher>,
    ) -> Self {
        let buffer = Arc::new(FrameBuffer::new(
            config.pipeline.pipeline_buffer_size,
            config.pipeline.pipeline_drop_frames,
        ));
        let shared = Arc::new(Shared {
            status: Mutex::new(OrchestratorStatus::Idle),
            consecutive_errors: AtomicU32::new(0),
            active_project: Mutex::new(None),
            buffer,
            engine,
            dispatcher,
            metrics: Arc::new(PipelineMetrics::new()),
            preprocess_opts: PreprocessOptions::default(),
            config,
            sequence: AtomicU64::new(0),
        });
        Orchestrator {
            shared,
            capture: Mutex::new(None),
            extractor: Arc::new(Mutex::new(extractor)),
            frame_task: Mutex::new(None),
        }
    }

    pub fn status(&self) -> OrchestratorStatus {
        *self.shared.status.lock()
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.shared.metrics.clone()
    }

    pub fn frame_buffer(&self) -> Arc<FrameBuffer> {
        self.shared.buffer.clone()
    }

    fn transition(&self, to: OrchestratorStatus) {
        let mut status = self.shared.status.lock();
        info!(from = ?*status, to = ?to, "orchestrator transition");
        *status = to;
    }

    /// Idle →(start)→ Initializing →(capture ok & active classifier ok)→
    /// Running.
    pub fn start(
        &self,
        backend: Box<dyn CaptureBackend>,
        project: &str,
    ) -> Result<(), OrchestratorError> {
        if self.status() != OrchestratorStatus::Idle && self.status() != OrchestratorStatus::Stopped {
            return Err(OrchestratorError::InvalidTransition {
                from: format!("{:?}", self.status()),
                action: "start".to_string(),
            });
        }
        self.transition(OrchestratorStatus::Initializing);

        if self.shared.engine.active_name().as_deref() != Some(project) {
            if self.shared.engine.set_active(project).is_err() {
                self.transition(OrchestratorStatus::Error);
                return Err(OrchestratorError::Fatal(format!(
                    "classifier '{project}' not registered"
                )));
            }
        }

        let source = match CaptureSource::start(
            backend,
            self.shared.config.camera.clone(),
            self.shared.buffer.clone(),
        ) {
            Ok(source) => source,
            Err(err) => {
                self.transition(OrchestratorStatus::Error);
                return Err(OrchestratorError::Fatal(err.to_string()));
            }
        };
        *self.capture.lock() = Some(source);

        *self.shared.active_project.lock() = Some(project.to_string());
        self.shared.consecutive_errors.store(0, Ordering::SeqCst);
        self.transition(OrchestratorStatus::Running);
        self.spawn_frame_loop();
        Ok(())
    }

    pub fn pause(&self) -> Result<(), OrchestratorError> {
        if self.status() != OrchestratorStatus::Running {
            return Err(OrchestratorError::InvalidTransition {
                from: format!("{:?}", self.status()),
                action: "pause".to_string(),
            });
        }
        self.transition(OrchestratorStatus::Paused);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), OrchestratorError> {
        if self.status() != OrchestratorStatus::Paused {
            return Err(OrchestratorError::InvalidTransition {
                from: format!("{:?}", self.status()),
                action: "resume".to_string(),
            });
        }
        self.transition(OrchestratorStatus::Running);
        Ok(())
    }

    /// Whether `project` names a registered classifier, regardless of
    /// whether it is currently active.
    pub fn project_exists(&self, project: &str) -> bool {
        self.shared
            .engine
            .registered_names()
            .iter()
            .any(|name| name == project)
    }

    /// Running →(switch_project)→ Running: atomic classifier swap plus
    /// reset.
    pub fn switch_project(&self, project: &str) -> Result<(), OrchestratorError> {
        if self.status() != OrchestratorStatus::Running && self.status() != OrchestratorStatus::Paused {
            return Err(OrchestratorError::InvalidTransition {
                from: format!("{:?}", self.status()),
                action: "switch_project".to_string(),
            });
        }
        self.shared
            .engine
            .set_active(project)
            .map_err(|e| OrchestratorError::Fatal(e.to_string()))?;
        *self.shared.active_project.lock() = Some(project.to_string());
        Ok(())
    }

    /// any →(stop)→ Stopping →(tasks joined, actuators cleaned)→ Stopped.
    /// Always releases the capture device and closes sessions, even
    /// mid-error.
    pub fn stop(&self) -> Result<(), OrchestratorError> {
        self.transition(OrchestratorStatus::Stopping);

        if let Some(handle) = self.frame_task.lock().take() {
            handle.abort();
        }

        if let Some(mut source) = self.capture.lock().take() {
            if let Err(err) = source.stop() {
                warn!(error = %err, "capture stop did not join cleanly");
            }
        }

        self.transition(OrchestratorStatus::Stopped);
        Ok(())
    }

    fn spawn_frame_loop(&self) {
        let shared = self.shared.clone();
        let extractor = self.extractor.clone();
        let handle = tokio::spawn(async move {
            run_frame_loop(shared, extractor).await;
        });
        *self.frame_task.lock() = Some(handle);
    }
}

async fn run_frame_loop(shared: Arc<Shared>, extractor: Arc<Mutex<ExtractionEngine>>) {
    let target_fps = shared.config.camera.target_fps.max(1) as f64;
    let frame_interval = Duration::from_secs_f64(1.0 / target_fps);
    let max_consecutive_errors = shared.config.pipeline.max_consecutive_errors;
    let error_cooldown = Duration::from_secs_f64(shared.config.pipeline.error_cooldown_seconds);
    let dequeue_timeout = Duration::from_millis(shared.config.pipeline.dequeue_timeout_ms);
    let mut last_reported_dropped = shared.buffer.dropped();

    loop {
        let status = *shared.status.lock();
        match status {
            OrchestratorStatus::Paused => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
            OrchestratorStatus::Stopping | OrchestratorStatus::Stopped | OrchestratorStatus::Error => break,
            _ => {}
        }

        let current_dropped = shared.buffer.dropped();
        let newly_dropped = current_dropped.saturating_sub(last_reported_dropped);
        if newly_dropped > 0 {
            shared.metrics.record_frames_dropped(newly_dropped);
            last_reported_dropped = current_dropped;
        }

        let iteration_start = Instant::now();
        let frame = shared.buffer.pop_timeout(dequeue_timeout);
        let Some(frame) = frame else {
            continue;
        };

        let project = shared.active_project.lock().clone();
        let Some(project) = project else {
            continue;
        };

        let outcome = run_stage_chain(&shared, &extractor, &project, frame).await;
        match outcome {
            Ok(()) => {
                shared.metrics.record_frame_processed();
                shared.consecutive_errors.store(0, Ordering::SeqCst);
            }
            Err(fatal) => {
                shared.metrics.record_error();
                let count = shared.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
                error!(error = %fatal, count, "stage chain error");
                if fatal.is_fatal || count >= max_consecutive_errors {
                    *shared.status.lock() = OrchestratorStatus::Error;
                    break;
                }
                tokio::time::sleep(error_cooldown).await;
            }
        }

        let elapsed = iteration_start.elapsed();
        if elapsed < frame_interval {
            tokio::time::sleep(frame_interval - elapsed).await;
        }
    }
}

struct StageError {
    message: String,
    is_fatal: bool,
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

async fn run_stage_chain(
    shared: &Arc<Shared>,
    extractor: &Arc<Mutex<ExtractionEngine>>,
    project: &str,
    frame: crate::model::Frame,
) -> Result<(), StageError> {
    let total_start = Instant::now();
    shared.metrics.ingestion.push(frame.capture_latency_ms);

    let preprocess_start = Instant::now();
    let preprocessed = preprocess::preprocess(&frame, &shared.preprocess_opts).map_err(|e| StageError {
        message: e.to_string(),
        is_fatal: false,
    })?;
    shared
        .metrics
        .preprocessing
        .push(preprocess_start.elapsed().as_secs_f64() * 1000.0);

    let extraction_start = Instant::now();
    let extraction = extractor
        .lock()
        .run(&preprocessed)
        .map_err(|e| StageError {
            message: e.to_string(),
            is_fatal: false,
        })?;
    shared
        .metrics
        .extraction
        .push(extraction_start.elapsed().as_secs_f64() * 1000.0);

    let inference_start = Instant::now();
    let inference = shared.engine.infer(&extraction);
    shared
        .metrics
        .inference
        .push(inference_start.elapsed().as_secs_f64() * 1000.0);

    let output_start = Instant::now();
    let timestamp_ms = shared.sequence.fetch_add(1, Ordering::Relaxed);
    let event = OutputDispatcher::build_event(project, &inference, timestamp_ms);
    shared.dispatcher.dispatch(&event, &inference).await;
    shared
        .metrics
        .output
        .push(output_start.elapsed().as_secs_f64() * 1000.0);

    shared
        .metrics
        .total
        .push(total_start.elapsed().as_secs_f64() * 1000.0);

    Ok(())
}

pub struct OrchestratorController {
    pub orchestrator: Arc<Orchestrator>,
}

impl ProjectController for OrchestratorController {
    fn select_project(&self, project: &str) -> Result<(), String> {
        self.orchestrator
            .switch_project(project)
            .map_err(|e| e.to_string())
    }

    fn start_project(&self, project: &str) -> Result<(), String> {
        self.orchestrator
            .switch_project(project)
            .map_err(|e| e.to_string())
    }

    fn stop_project(&self, _project: &str) -> Result<(), String> {
        self.orchestrator.stop().map_err(|e| e.to_string())
    }

    fn project_exists(&self, project: &str) -> bool {
        self.orchestrator.project_exists(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TestPatternBackend;
    use crate::classifiers::finger_count::{FingerCountClassifier, FingerCountConfig};
    use crate::extract::{ExtractionEngine, NullExtractor};

    fn test_orchestrator() -> Orchestrator {
        let config = Config::default();
        let extractor_config = crate::extract::ExtractorConfig {
            max_hands: config.extractor.max_hands,
            min_detection_confidence: config.extractor.min_detection_confidence,
        };
        let extractor = ExtractionEngine::new(Box::new(NullExtractor), extractor_config);
        let engine = Arc::new(InferenceEngine::new());
        engine
            .register(Box::new(FingerCountClassifier::new(FingerCountConfig::default())))
            .unwrap();
        let dispatcher = Arc::new(OutputDispatcher::new());
        Orchestrator::new(config, extractor, engine, dispatcher)
    }

    #[tokio::test]
    async fn start_transitions_idle_to_running() {
        let orchestrator = test_orchestrator();
        orchestrator
            .start(Box::new(TestPatternBackend::new()), "finger_count")
            .unwrap();
        assert_eq!(orchestrator.status(), OrchestratorStatus::Running);
        orchestrator.stop().unwrap();
        assert_eq!(orchestrator.status(), OrchestratorStatus::Stopped);
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips_to_running() {
        let orchestrator = test_orchestrator();
        orchestrator
            .start(Box::new(TestPatternBackend::new()), "finger_count")
            .unwrap();
        orchestrator.pause().unwrap();
        assert_eq!(orchestrator.status(), OrchestratorStatus::Paused);
        orchestrator.resume().unwrap();
        assert_eq!(orchestrator.status(), OrchestratorStatus::Running);
        orchestrator.stop().unwrap();
    }

    #[tokio::test]
    async fn stop_from_error_still_releases_capture() {
        let orchestrator = test_orchestrator();
        orchestrator
            .start(Box::new(TestPatternBackend::new()), "finger_count")
            .unwrap();
        *orchestrator.shared.status.lock() = OrchestratorStatus::Error;
        assert!(orchestrator.stop().is_ok());
        assert_eq!(orchestrator.status(), OrchestratorStatus::Stopped);
    }
}
