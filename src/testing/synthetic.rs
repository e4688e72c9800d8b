//! Synthetic frame source and scripted detector for offline tests.

use crate::detector::{CancelToken, SmileDetector};
use crate::errors::BoothError;
use crate::orchestrator::RetakeConfirm;
use crate::source::{FrameSource, FrameStream};
use crate::types::{RawFrame, Verdict};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Create a synthetic RGB frame with content that varies per frame number.
pub fn synthetic_raw_frame(frame_number: u64, width: u32, height: u32) -> RawFrame {
    let mut data = vec![0u8; (width * height * 3) as usize];

    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }

    RawFrame::new(data, width, height)
}

/// Frame source producing synthetic frames, with instrumentation for
/// asserting stream lifecycle invariants.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    fail_open: Mutex<bool>,
    /// Number of snapshots that fail before frames start flowing.
    fail_snapshots: Arc<AtomicU64>,
    opens: Arc<AtomicU64>,
    active_streams: Arc<AtomicI64>,
    frame_counter: Arc<AtomicU64>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fail_open: Mutex::new(false),
            fail_snapshots: Arc::new(AtomicU64::new(0)),
            opens: Arc::new(AtomicU64::new(0)),
            active_streams: Arc::new(AtomicI64::new(0)),
            frame_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Make the next `open` calls fail with a device-access error.
    pub fn set_fail_open(&self, fail: bool) {
        *self.fail_open.lock().expect("lock poisoned") = fail;
    }

    /// Make the next `count` snapshots fail before frames start flowing.
    pub fn set_fail_snapshots(&self, count: u64) {
        self.fail_snapshots.store(count, Ordering::SeqCst);
    }

    /// How many times a stream has been opened.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Streams currently open (opened and not yet stopped).
    pub fn active_streams(&self) -> i64 {
        self.active_streams.load(Ordering::SeqCst)
    }

    /// Total frames served across all streams.
    pub fn frames_served(&self) -> u64 {
        self.frame_counter.load(Ordering::SeqCst)
    }
}

impl FrameSource for SyntheticSource {
    fn open(&self) -> Result<Box<dyn FrameStream>, BoothError> {
        if *self.fail_open.lock().expect("lock poisoned") {
            return Err(BoothError::device_access("synthetic source set to fail"));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.active_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticStream {
            width: self.width,
            height: self.height,
            fail_snapshots: self.fail_snapshots.clone(),
            frame_counter: self.frame_counter.clone(),
            active_streams: self.active_streams.clone(),
            stopped: false,
        }))
    }
}

struct SyntheticStream {
    width: u32,
    height: u32,
    fail_snapshots: Arc<AtomicU64>,
    frame_counter: Arc<AtomicU64>,
    active_streams: Arc<AtomicI64>,
    stopped: bool,
}

impl FrameStream for SyntheticStream {
    fn snapshot(&mut self) -> Result<RawFrame, BoothError> {
        let failures = self.fail_snapshots.load(Ordering::SeqCst);
        if failures > 0 {
            self.fail_snapshots.store(failures - 1, Ordering::SeqCst);
            return Err(BoothError::capture("synthetic frame not available"));
        }
        let n = self.frame_counter.fetch_add(1, Ordering::SeqCst);
        Ok(synthetic_raw_frame(n, self.width, self.height))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.active_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Smile detector that replays a scripted verdict sequence.
///
/// Once the script runs dry it keeps answering with the default verdict.
/// Honors cancellation the same way the real client does.
pub struct ScriptedDetector {
    script: Mutex<VecDeque<Verdict>>,
    default: Verdict,
    latency: Duration,
    polls: AtomicU64,
    manual_notifications: AtomicU64,
}

impl ScriptedDetector {
    pub fn new(script: impl IntoIterator<Item = Verdict>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            default: Verdict::NoSmile,
            latency: Duration::ZERO,
            polls: AtomicU64::new(0),
            manual_notifications: AtomicU64::new(0),
        }
    }

    pub fn always(verdict: Verdict) -> Self {
        let mut detector = Self::new([]);
        detector.default = verdict;
        detector
    }

    /// Simulate request latency; a cancelled token wins the race exactly
    /// like it does against a real in-flight request.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Append further verdicts to the script.
    pub fn push(&self, verdict: Verdict) {
        self.script.lock().expect("lock poisoned").push_back(verdict);
    }

    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn manual_notifications(&self) -> u64 {
        self.manual_notifications.load(Ordering::SeqCst)
    }
}

impl SmileDetector for ScriptedDetector {
    async fn predict(&self, _image_jpeg: Vec<u8>, mut cancel: CancelToken) -> Verdict {
        self.polls.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Verdict::NoDecision,
                _ = tokio::time::sleep(self.latency) => {}
            }
        }
        if cancel.is_cancelled() {
            return Verdict::NoDecision;
        }

        self.script
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or(self.default)
    }

    async fn notify_manual(&self, _image_jpeg: Vec<u8>) {
        self.manual_notifications.fetch_add(1, Ordering::SeqCst);
    }
}

/// Retake confirmation with a fixed scripted answer.
pub struct ScriptedConfirm {
    answer: bool,
    asked: AtomicU64,
}

impl ScriptedConfirm {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicU64::new(0),
        }
    }

    pub fn asked(&self) -> u64 {
        self.asked.load(Ordering::SeqCst)
    }
}

impl RetakeConfirm for ScriptedConfirm {
    fn confirm_retake(&self, _index: usize) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}
