//! Capture Source: a dedicated producer thread pulling frames from a
//! camera device, decoupled from the async consumer. A small
//! `CaptureBackend` trait lets a v4l2 device and a synthetic test source
//! share one driver loop.

use crate::config::CameraConfig;
use crate::error::CaptureError;
use crate::model::Frame;
use crate::pipeline::buffer::FrameBuffer;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Abstraction over the device that produces raw frames. `V4lBackend` is
/// the real implementation; tests use `TestPatternBackend`.
pub trait CaptureBackend: Send {
    /// Open or re-open the device, returning the actual (possibly
    /// downgraded) width/height/fps.
    fn open(&mut self, cfg: &CameraConfig) -> Result<(u32, u32, u32), CaptureError>;
    fn read_frame(&mut self) -> Result<Vec<u8>, CaptureError>;
    fn close(&mut self);
}

/// Runs one `CaptureBackend` on a dedicated OS thread and pushes frames
/// into a `FrameBuffer`. `stop()` joins the worker within a bounded
/// timeout and releases the device on every exit path.
pub struct CaptureSource {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    sequence: Arc<AtomicU64>,
}

const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

impl CaptureSource {
    pub fn start(
        mut backend: Box<dyn CaptureBackend>,
        cfg: CameraConfig,
        buffer: Arc<FrameBuffer>,
    ) -> Result<Self, CaptureError> {
        let running = Arc::new(AtomicBool::new(true));
        let sequence = Arc::new(AtomicU64::new(0));

        let (actual_w, actual_h, actual_fps) = backend.open(&cfg)?;
        if actual_w != cfg.camera_width || actual_h != cfg.camera_height {
            warn!(
                requested_w = cfg.camera_width,
                requested_h = cfg.camera_height,
                actual_w,
                actual_h,
                "camera downgraded requested resolution"
            );
        }
        info!(actual_w, actual_h, actual_fps, "capture source opened");

        let worker_running = running.clone();
        let worker_seq = sequence.clone();
        let channels = 3u32;

        let handle = thread::spawn(move || {
            let mut consecutive_failures = 0u32;
            while worker_running.load(Ordering::Acquire) {
                let read_start = Instant::now();
                match backend.read_frame() {
                    Ok(pixels) => {
                        consecutive_failures = 0;
                        let capture_latency_ms = read_start.elapsed().as_secs_f64() * 1000.0;
                        let seq = worker_seq.fetch_add(1, Ordering::Relaxed);
                        let frame = Frame {
                            pixels,
                            capture_timestamp: now_monotonic_secs(),
                            sequence: seq,
                            width: actual_w,
                            height: actual_h,
                            channels,
                            capture_latency_ms,
                        };
                        buffer.push(frame);
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        error!(error = %e, consecutive_failures, "capture read failed");
                        if !cfg.auto_reconnect {
                            warn!("auto-reconnect disabled, stopping capture worker");
                            break;
                        }
                        thread::sleep(Duration::from_millis(cfg.reconnect_delay_ms));
                        if let Err(e) = backend.open(&cfg) {
                            error!(error = %e, "reconnect attempt failed");
                        } else {
                            info!("capture source reconnected");
                        }
                    }
                }
            }
            backend.close();
            debug!("capture worker exiting, device released");
        });

        Ok(CaptureSource {
            handle: Some(handle),
            running,
            sequence,
        })
    }

    /// Signal the worker to stop and join it within a bounded timeout.
    /// The device is released on every exit path via `CaptureBackend::close`.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            let joiner = thread::spawn(move || {
                let _ = handle.join();
                let _ = done_tx.send(());
            });
            match done_rx.recv_timeout(STOP_JOIN_TIMEOUT) {
                Ok(()) => {
                    let _ = joiner.join();
                    Ok(())
                }
                Err(_) => Err(CaptureError::JoinTimeout),
            }
        } else {
            Ok(())
        }
    }

    pub fn frames_produced(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

fn now_monotonic_secs() -> f64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Real v4l2 camera backend.
///
/// `v4l`'s mmap stream borrows its backing `Device` for the stream's
/// lifetime, which does not fit a backend that must be reopened in place
/// on reconnect. We leak the `Device` behind a `'static` reference instead
/// of threading a self-referential struct through `CaptureBackend`; each
/// reconnect leaks one more `Device`, which is the accepted tradeoff for a
/// handful of reconnects over a process lifetime.
pub struct V4lBackend {
    stream: Option<v4l::io::mmap::stream::Stream<'static>>,
}

impl V4lBackend {
    pub fn new() -> Self {
        V4lBackend { stream: None }
    }
}

impl Default for V4lBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for V4lBackend {
    fn open(&mut self, cfg: &CameraConfig) -> Result<(u32, u32, u32), CaptureError> {
        use v4l::io::mmap::stream::Stream;
        use v4l::prelude::*;
        use v4l::video::Capture;

        let path = format!("/dev/video{}", cfg.camera_index);
        let dev = Device::with_path(&path).map_err(|e| CaptureError::Open(e.to_string()))?;

        let mut format = dev
            .format()
            .map_err(|e| CaptureError::Open(format!("querying format: {e}")))?;
        format.width = cfg.camera_width;
        format.height = cfg.camera_height;
        let format = dev
            .set_format(&format)
            .map_err(|e| CaptureError::Open(format!("setting format: {e}")))?;

        let actual_w = format.width;
        let actual_h = format.height;

        let leaked: &'static Device = Box::leak(Box::new(dev));
        let stream = Stream::with_buffers(leaked, v4l::buffer::Type::VideoCapture, 4)
            .map_err(|e| CaptureError::Open(format!("starting stream: {e}")))?;
        self.stream = Some(stream);

        Ok((actual_w, actual_h, cfg.target_fps))
    }

    fn read_frame(&mut self) -> Result<Vec<u8>, CaptureError> {
        use v4l::io::traits::CaptureStream;

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CaptureError::Read("device not open".into()))?;
        let (buf, _meta) = stream
            .next()
            .map_err(|e| CaptureError::Read(e.to_string()))?;
        Ok(buf.to_vec())
    }

    fn close(&mut self) {
        self.stream = None;
    }
}

/// Synthetic backend used by tests and by `--test-mode`; produces a flat
/// gray frame each call rather than touching real hardware.
pub struct TestPatternBackend {
    width: u32,
    height: u32,
    fail_every: Option<u32>,
    calls: u32,
}

impl TestPatternBackend {
    pub fn new() -> Self {
        TestPatternBackend {
            width: 0,
            height: 0,
            fail_every: None,
            calls: 0,
        }
    }

    pub fn failing_every(mut self, n: u32) -> Self {
        self.fail_every = Some(n);
        self
    }
}

impl Default for TestPatternBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for TestPatternBackend {
    fn open(&mut self, cfg: &CameraConfig) -> Result<(u32, u32, u32), CaptureError> {
        self.width = cfg.camera_width;
        self.height = cfg.camera_height;
        Ok((self.width, self.height, cfg.target_fps))
    }

    fn read_frame(&mut self) -> Result<Vec<u8>, CaptureError> {
        self.calls += 1;
        if let Some(n) = self.fail_every {
            if n > 0 && self.calls % n == 0 {
                return Err(CaptureError::Read("synthetic failure".into()));
            }
        }
        Ok(vec![128u8; (self.width * self.height * 3) as usize])
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::buffer::FrameBuffer;

    #[test]
    fn start_and_stop_joins_worker_within_timeout() {
        let cfg = CameraConfig {
            camera_width: 16,
            camera_height: 16,
            target_fps: 30,
            ..Default::default()
        };
        let buffer = Arc::new(FrameBuffer::new(5, true));
        let mut source =
            CaptureSource::start(Box::new(TestPatternBackend::new()), cfg, buffer.clone())
                .expect("start");
        thread::sleep(Duration::from_millis(20));
        source.stop().expect("stop");
        assert!(source.frames_produced() > 0);
    }

    #[test]
    fn reconnect_on_repeated_failure_keeps_producing() {
        let cfg = CameraConfig {
            camera_width: 8,
            camera_height: 8,
            target_fps: 30,
            reconnect_delay_ms: 1,
            auto_reconnect: true,
            ..Default::default()
        };
        let buffer = Arc::new(FrameBuffer::new(5, true));
        let backend = TestPatternBackend::new().failing_every(3);
        let mut source = CaptureSource::start(Box::new(backend), cfg, buffer.clone()).expect("start");
        thread::sleep(Duration::from_millis(50));
        source.stop().expect("stop");
        assert!(source.frames_produced() > 0);
    }
}
