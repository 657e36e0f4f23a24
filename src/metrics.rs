//! Rolling per-stage latency windows and throughput counters: a
//! per-component average over the last 100 samples.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const WINDOW_SIZE: usize = 100;

/// Single-writer, many-reader rolling average over the last `WINDOW_SIZE`
/// samples. Reads may race with a concurrent push; this is tolerated in
/// exchange for lock-free, monotonically-consistent statistics.
#[derive(Debug, Default)]
pub struct LatencyWindow {
    samples: Mutex<VecDeque<f64>>,
}

impl LatencyWindow {
    pub fn new() -> Self {
        LatencyWindow {
            samples: Mutex::new(VecDeque::with_capacity(WINDOW_SIZE)),
        }
    }

    pub fn push(&self, latency_ms: f64) {
        let mut samples = self.samples.lock();
        samples.push_back(latency_ms);
        if samples.len() > WINDOW_SIZE {
            samples.pop_front();
        }
    }

    pub fn avg(&self) -> f64 {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sliding 1-second window of frame-completion timestamps used to
/// compute a live fps figure.
pub struct FpsWindow {
    timestamps: Mutex<VecDeque<Instant>>,
}

impl FpsWindow {
    pub fn new() -> Self {
        FpsWindow {
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(&self, now: Instant) {
        let mut ts = self.timestamps.lock();
        ts.push_back(now);
        while let Some(&front) = ts.front() {
            if now.duration_since(front).as_secs_f64() > 1.0 {
                ts.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn fps(&self) -> f64 {
        self.timestamps.lock().len() as f64
    }
}

impl Default for FpsWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-project metrics snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub total_latency_ms: f64,
    pub ingestion_latency_ms: f64,
    pub preprocessing_latency_ms: f64,
    pub extraction_latency_ms: f64,
    pub inference_latency_ms: f64,
    pub output_latency_ms: f64,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub errors_count: u64,
    pub fps: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// All counters and latency windows the orchestrator updates once per
/// frame iteration.
pub struct PipelineMetrics {
    pub ingestion: LatencyWindow,
    pub preprocessing: LatencyWindow,
    pub extraction: LatencyWindow,
    pub inference: LatencyWindow,
    pub output: LatencyWindow,
    pub total: LatencyWindow,
    pub fps_window: FpsWindow,
    frames_processed: AtomicU64,
    frames_dropped: AtomicU64,
    errors_count: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        PipelineMetrics {
            ingestion: LatencyWindow::new(),
            preprocessing: LatencyWindow::new(),
            extraction: LatencyWindow::new(),
            inference: LatencyWindow::new(),
            output: LatencyWindow::new(),
            total: LatencyWindow::new(),
            fps_window: FpsWindow::new(),
            frames_processed: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
        }
    }

    pub fn record_frame_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.fps_window.record(Instant::now());
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Folds in a batch of drops observed elsewhere (e.g. the frame
    /// buffer's own cumulative counter) rather than one at a time.
    pub fn record_frames_dropped(&self, count: u64) {
        self.frames_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn errors_count(&self) -> u64 {
        self.errors_count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_latency_ms: round2(self.total.avg()),
            ingestion_latency_ms: round2(self.ingestion.avg()),
            preprocessing_latency_ms: round2(self.preprocessing.avg()),
            extraction_latency_ms: round2(self.extraction.avg()),
            inference_latency_ms: round2(self.inference.avg()),
            output_latency_ms: round2(self.output.avg()),
            frames_processed: self.frames_processed(),
            frames_dropped: self.frames_dropped(),
            errors_count: self.errors_count(),
            fps: (self.fps_window.fps() * 10.0).round() / 10.0,
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
