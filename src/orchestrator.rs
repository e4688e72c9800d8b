//! Capture orchestration state machine.
//!
//! Owns the session for the duration of a capturing run and coordinates the
//! detection polling loop, the countdown-and-capture sequence, manual
//! triggers, retakes, and reset. All continuations re-check the `polling`
//! flag and the session generation immediately before mutating state, so a
//! reset lands synchronously no matter how many tasks are in flight.
//!
//! The polling loop is an explicit tick function returning "reschedule
//! after a delay" or "stop", driven by one spawned task per capturing run;
//! it is never recursive and never outlives its session generation.

use crate::composer::StripComposer;
use crate::config::{BoothConfig, TimingSettings};
use crate::detector::{cancel_pair, CancelHandle, SmileDetector};
use crate::errors::BoothError;
use crate::filters;
use crate::session::{Session, SessionSnapshot};
use crate::source::{self, FrameSource, FrameStream};
use crate::types::{BoothEvent, BoothPhase, ConnectivityStatus, FilterKind, PhotoFrame, PhotoStrip, Verdict};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

/// Yes/no gate for retaking a single photo.
pub trait RetakeConfirm: Send + Sync {
    fn confirm_retake(&self, index: usize) -> bool;
}

/// Confirmation that always answers yes. Used when the host UI performs
/// its own prompt before invoking the retake command.
pub struct AlwaysConfirm;

impl RetakeConfirm for AlwaysConfirm {
    fn confirm_retake(&self, _index: usize) -> bool {
        true
    }
}

/// Outcome of one polling-loop tick.
enum Tick {
    Reschedule(Duration),
    Stop,
}

struct Inner<D: SmileDetector> {
    session: Mutex<Session>,
    detector: Arc<D>,
    source: Arc<dyn FrameSource>,
    stream: Arc<Mutex<Option<Box<dyn FrameStream>>>>,
    confirm: Arc<dyn RetakeConfirm>,
    timing: TimingSettings,
    photo_quality: u8,
    /// Authoritative guard: checked before every state mutation.
    polling: AtomicBool,
    /// Single-countdown guard.
    countdown_active: AtomicBool,
    /// Bumped on reset; stale continuations see the mismatch and bail.
    generation: AtomicU64,
    last_trigger: Mutex<Option<Instant>>,
    current_filter: Mutex<FilterKind>,
    /// Handle of the in-flight detection request, if any.
    inflight: Mutex<Option<CancelHandle>>,
    connectivity: watch::Receiver<ConnectivityStatus>,
    events: broadcast::Sender<BoothEvent>,
    composer: StripComposer,
}

impl<D: SmileDetector> Inner<D> {
    /// True while the given capturing run is still the live one.
    fn guard_live(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
            && self.polling.load(Ordering::SeqCst)
    }

    fn cancel_inflight(&self) {
        if let Some(handle) = self.inflight.lock().expect("lock poisoned").take() {
            handle.cancel();
        }
    }

    fn emit(&self, event: BoothEvent) {
        // No receivers is fine; events are advisory.
        let _ = self.events.send(event);
    }

    /// Clear the countdown guard, unless a reset already reclaimed it for
    /// a newer session generation.
    fn finish_countdown(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.countdown_active.store(false, Ordering::SeqCst);
        }
    }
}

/// The capture orchestrator. Cheap to clone via the internal `Arc`.
pub struct BoothOrchestrator<D: SmileDetector> {
    inner: Arc<Inner<D>>,
}

impl<D: SmileDetector> Clone for BoothOrchestrator<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: SmileDetector> BoothOrchestrator<D> {
    pub fn new(
        source: Arc<dyn FrameSource>,
        detector: Arc<D>,
        connectivity: watch::Receiver<ConnectivityStatus>,
        confirm: Arc<dyn RetakeConfirm>,
        config: &BoothConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                session: Mutex::new(Session::new()),
                detector,
                source,
                stream: Arc::new(Mutex::new(None)),
                confirm,
                timing: config.timing.clone(),
                photo_quality: config.camera.jpeg_quality,
                polling: AtomicBool::new(false),
                countdown_active: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                last_trigger: Mutex::new(None),
                current_filter: Mutex::new(FilterKind::None),
                inflight: Mutex::new(None),
                connectivity,
                events,
                composer: StripComposer::new(config.strip.clone()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoothEvent> {
        self.inner.events.subscribe()
    }

    pub fn phase(&self) -> BoothPhase {
        self.inner.session.lock().expect("lock poisoned").phase()
    }

    pub fn session_snapshot(&self) -> SessionSnapshot {
        self.inner.session.lock().expect("lock poisoned").snapshot()
    }

    pub fn photos(&self) -> Vec<PhotoFrame> {
        self.inner
            .session
            .lock()
            .expect("lock poisoned")
            .photos()
            .to_vec()
    }

    pub fn connectivity(&self) -> ConnectivityStatus {
        *self.inner.connectivity.borrow()
    }

    pub fn set_filter(&self, filter: FilterKind) {
        *self.inner.current_filter.lock().expect("lock poisoned") = filter;
        log::debug!("Filter selected: {}", filter.as_str());
    }

    pub fn current_filter(&self) -> FilterKind {
        *self.inner.current_filter.lock().expect("lock poisoned")
    }

    pub fn set_caption(&self, caption: Option<String>) {
        self.inner
            .session
            .lock()
            .expect("lock poisoned")
            .set_caption(caption);
    }

    /// `Idle -> Capturing`: clears the session, opens a fresh camera
    /// stream, and starts the detection loop. Device failure is surfaced
    /// and leaves the session in `Idle`.
    pub async fn start(&self) -> Result<(), BoothError> {
        {
            let mut session = self.inner.session.lock().expect("lock poisoned");
            if session.phase() != BoothPhase::Idle {
                return Err(BoothError::InvalidPhase {
                    phase: session.phase().as_str().to_string(),
                    operation: "start".to_string(),
                });
            }
            // Reserve the session so concurrent starts cannot race the
            // stream slot; reverted below if the camera fails to open.
            session.clear();
            session.set_phase(BoothPhase::Capturing);
        }

        let stream = match Self::open_stream(&self.inner).await {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("Failed to acquire frame source: {}", e);
                self.inner
                    .session
                    .lock()
                    .expect("lock poisoned")
                    .set_phase(BoothPhase::Idle);
                return Err(e);
            }
        };

        *self.inner.stream.lock().expect("lock poisoned") = Some(stream);
        *self.inner.last_trigger.lock().expect("lock poisoned") = None;
        self.inner.polling.store(true, Ordering::SeqCst);
        let generation = self.inner.generation.load(Ordering::SeqCst);

        self.inner.emit(BoothEvent::PhaseChanged {
            phase: BoothPhase::Capturing,
        });
        log::info!("Capture session started");

        Self::spawn_poll_loop(self.inner.clone(), generation, Duration::ZERO);
        Ok(())
    }

    /// Manual capture trigger. Available only while the detection backend
    /// is reachable; bypasses the detection step but not the
    /// single-countdown guard.
    pub async fn manual_trigger(&self) -> Result<(), BoothError> {
        if !self.inner.connectivity.borrow().is_connected() {
            log::warn!("Manual trigger rejected: backend not connected");
            return Err(BoothError::DetectorOffline);
        }
        {
            let session = self.inner.session.lock().expect("lock poisoned");
            if session.phase() != BoothPhase::Capturing {
                return Err(BoothError::InvalidPhase {
                    phase: session.phase().as_str().to_string(),
                    operation: "manual trigger".to_string(),
                });
            }
        }

        let generation = self.inner.generation.load(Ordering::SeqCst);
        let jpeg = Self::snapshot_jpeg_raw(&self.inner).await?;

        // Fire-and-forget backend notification; failure is non-fatal and
        // not surfaced.
        let detector = self.inner.detector.clone();
        tokio::spawn(async move {
            detector.notify_manual(jpeg).await;
        });

        if Self::start_countdown(&self.inner, generation) {
            log::info!("Manual capture triggered");
        } else {
            log::debug!("Manual trigger ignored: countdown already running");
        }
        Ok(())
    }

    /// `Preview -> Capturing(retake=index)`, gated on user confirmation.
    /// Returns `Ok(false)` when the user declines (no state change).
    pub async fn retake(&self, index: usize) -> Result<bool, BoothError> {
        {
            let session = self.inner.session.lock().expect("lock poisoned");
            if session.phase() != BoothPhase::Preview {
                return Err(BoothError::InvalidPhase {
                    phase: session.phase().as_str().to_string(),
                    operation: "retake".to_string(),
                });
            }
            if index >= session.photos().len() {
                return Err(BoothError::InvalidSlot {
                    index,
                    count: session.photos().len(),
                });
            }
        }

        let confirm = self.inner.confirm.clone();
        let confirmed = tokio::task::spawn_blocking(move || confirm.confirm_retake(index))
            .await
            .unwrap_or(false);
        if !confirmed {
            log::info!("Retake of slot {} declined", index);
            return Ok(false);
        }

        let stream = Self::open_stream(&self.inner).await?;

        let raced = {
            let mut session = self.inner.session.lock().expect("lock poisoned");
            if session.phase() != BoothPhase::Preview {
                true
            } else {
                session.begin_retake(index)?;
                session.set_phase(BoothPhase::Capturing);
                false
            }
        };

        if raced {
            // Reset raced the confirmation prompt; abandon quietly.
            let mut stream = stream;
            let _ = tokio::task::spawn_blocking(move || stream.stop()).await;
            return Err(BoothError::InvalidPhase {
                phase: "idle".to_string(),
                operation: "retake".to_string(),
            });
        }

        *self.inner.stream.lock().expect("lock poisoned") = Some(stream);
        self.inner.polling.store(true, Ordering::SeqCst);
        let generation = self.inner.generation.load(Ordering::SeqCst);

        self.inner.emit(BoothEvent::PhaseChanged {
            phase: BoothPhase::Capturing,
        });
        log::info!("Retaking photo {}", index);

        // Give the freshly opened stream a moment before the first poll.
        Self::spawn_poll_loop(
            self.inner.clone(),
            generation,
            self.inner.timing.retake_resume_delay(),
        );
        Ok(true)
    }

    /// `Preview -> Final`: composes the strip. A no-op (logged) unless the
    /// session is in `Preview` with exactly three photos.
    pub async fn compose_strip(&self) -> Result<Option<PhotoStrip>, BoothError> {
        let (photos, caption) = {
            let session = self.inner.session.lock().expect("lock poisoned");
            if session.phase() != BoothPhase::Preview {
                log::warn!("Compose ignored in phase {}", session.phase().as_str());
                return Ok(None);
            }
            (
                session.photos().to_vec(),
                session.caption().map(str::to_string),
            )
        };

        if photos.len() != Session::MAX_PHOTOS {
            log::warn!(
                "Compose requires exactly {} photos, have {}",
                Session::MAX_PHOTOS,
                photos.len()
            );
            return Ok(None);
        }

        let strip = self.inner.composer.compose(&photos, caption.as_deref()).await?;

        self.inner
            .session
            .lock()
            .expect("lock poisoned")
            .set_phase(BoothPhase::Final);
        self.inner.emit(BoothEvent::PhaseChanged {
            phase: BoothPhase::Final,
        });
        self.inner.emit(BoothEvent::StripComposed {
            filename: strip.filename.clone(),
        });
        log::info!("Strip composed: {}", strip.filename);
        Ok(Some(strip))
    }

    /// Return to `Idle` from any state. Idempotent; discards in-flight
    /// work. The guards flip before the first suspension point, so every
    /// pending continuation bails before touching the session.
    pub async fn reset(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.polling.store(false, Ordering::SeqCst);
        self.inner.countdown_active.store(false, Ordering::SeqCst);
        self.inner.cancel_inflight();
        *self.inner.last_trigger.lock().expect("lock poisoned") = None;
        self.inner.session.lock().expect("lock poisoned").clear();

        Self::release_stream(&self.inner).await;

        self.inner.emit(BoothEvent::PhaseChanged {
            phase: BoothPhase::Idle,
        });
        log::info!("Session reset");
    }

    // ---- internals ----

    async fn open_stream(inner: &Arc<Inner<D>>) -> Result<Box<dyn FrameStream>, BoothError> {
        let source = inner.source.clone();
        tokio::task::spawn_blocking(move || source.open())
            .await
            .map_err(|e| BoothError::device_access(format!("camera task failed: {}", e)))?
    }

    /// Release the stream exactly once; subsequent calls are no-ops.
    async fn release_stream(inner: &Arc<Inner<D>>) {
        let stream = inner.stream.lock().expect("lock poisoned").take();
        if let Some(mut stream) = stream {
            let _ = tokio::task::spawn_blocking(move || stream.stop()).await;
            log::info!("Frame source released");
        }
    }

    async fn snapshot_encoded(
        inner: &Arc<Inner<D>>,
        filter: FilterKind,
    ) -> Result<(Vec<u8>, u32, u32), BoothError> {
        let stream = inner.stream.clone();
        let quality = inner.photo_quality;
        tokio::task::spawn_blocking(move || {
            let raw = {
                let mut guard = stream.lock().expect("lock poisoned");
                let active = guard
                    .as_mut()
                    .ok_or_else(|| BoothError::capture("no active camera stream"))?;
                active.snapshot()?
            };
            let image = source::raw_to_image(raw)?;
            let image = filters::apply(filter, image);
            let (width, height) = image.dimensions();
            let bytes = source::encode_jpeg(&image, quality)?;
            Ok::<_, BoothError>((bytes, width, height))
        })
        .await
        .map_err(|e| BoothError::capture(format!("capture task failed: {}", e)))?
    }

    /// Unfiltered snapshot for detection and manual-trigger payloads.
    async fn snapshot_jpeg_raw(inner: &Arc<Inner<D>>) -> Result<Vec<u8>, BoothError> {
        Self::snapshot_encoded(inner, FilterKind::None)
            .await
            .map(|(bytes, _, _)| bytes)
    }

    async fn snapshot_photo(
        inner: &Arc<Inner<D>>,
        filter: FilterKind,
    ) -> Result<PhotoFrame, BoothError> {
        let (bytes, width, height) = Self::snapshot_encoded(inner, filter).await?;
        Ok(PhotoFrame::new(bytes, width, height, filter))
    }

    fn spawn_poll_loop(inner: Arc<Inner<D>>, generation: u64, initial_delay: Duration) {
        tokio::spawn(async move {
            if !initial_delay.is_zero() {
                tokio::time::sleep(initial_delay).await;
            }
            log::debug!("Detection loop started");
            loop {
                match Self::poll_tick(&inner, generation).await {
                    Tick::Reschedule(delay) => tokio::time::sleep(delay).await,
                    Tick::Stop => break,
                }
            }
            log::debug!("Detection loop stopped");
        });
    }

    /// One iteration of the detection loop. Rules are evaluated in order;
    /// the first that applies decides the tick.
    async fn poll_tick(inner: &Arc<Inner<D>>, generation: u64) -> Tick {
        // 1. Deactivated, superseded, or photo set complete: stop.
        if !inner.guard_live(generation) {
            return Tick::Stop;
        }
        if inner
            .session
            .lock()
            .expect("lock poisoned")
            .is_complete()
        {
            return Tick::Stop;
        }

        // 2. Countdown running: hold off, re-check later.
        if inner.countdown_active.load(Ordering::SeqCst) {
            return Tick::Reschedule(inner.timing.countdown_hold());
        }

        // 3. Inside the post-trigger cooldown: wait without sampling.
        if let Some(last) = *inner.last_trigger.lock().expect("lock poisoned") {
            if last.elapsed() < inner.timing.min_trigger_gap() {
                return Tick::Reschedule(inner.timing.cooldown_recheck());
            }
        }

        // 4. Sample a raw frame; a miss just retries at the base interval.
        let jpeg = match Self::snapshot_jpeg_raw(inner).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::debug!("No frame available for detection: {}", e);
                return Tick::Reschedule(inner.timing.poll_interval());
            }
        };

        // 5. At most one request in flight: cancel the previous one before
        // arming a fresh token.
        let token = {
            let mut slot = inner.inflight.lock().expect("lock poisoned");
            if let Some(previous) = slot.take() {
                previous.cancel();
            }
            let (handle, token) = cancel_pair();
            *slot = Some(handle);
            token
        };

        let verdict = inner.detector.predict(jpeg, token).await;

        // 6. A smile starts the countdown, unless the session moved on or
        // a countdown is already running.
        if verdict == Verdict::Smile
            && inner.guard_live(generation)
            && !inner.countdown_active.load(Ordering::SeqCst)
        {
            log::info!("Smile detected, starting countdown");
            Self::start_countdown(inner, generation);
        }

        // 7. Re-arm while the run is live and the photo set incomplete.
        // Stop condition and phase transition are one atomic check here.
        if inner.guard_live(generation)
            && !inner
                .session
                .lock()
                .expect("lock poisoned")
                .is_complete()
        {
            Tick::Reschedule(inner.timing.poll_interval())
        } else {
            Tick::Stop
        }
    }

    /// Start the countdown-and-capture sequence. Returns false when a
    /// countdown is already running (the trigger is a no-op and does not
    /// restart or extend it).
    fn start_countdown(inner: &Arc<Inner<D>>, generation: u64) -> bool {
        if inner
            .countdown_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        *inner.last_trigger.lock().expect("lock poisoned") = Some(Instant::now());
        tokio::spawn(Self::run_countdown(inner.clone(), generation));
        true
    }

    async fn run_countdown(inner: Arc<Inner<D>>, generation: u64) {
        let from = inner.timing.countdown_from;
        for remaining in (0..=from).rev() {
            if !inner.guard_live(generation) {
                // Reset mid-countdown; the guard flags were already
                // reclaimed, so just disappear without recording anything.
                log::info!("Countdown cancelled");
                return;
            }
            inner.emit(BoothEvent::CountdownTick { remaining });
            log::debug!("Countdown: {}", remaining);
            if remaining > 0 {
                tokio::time::sleep(inner.timing.countdown_tick()).await;
            }
        }

        let filter = *inner.current_filter.lock().expect("lock poisoned");
        let captured = Self::snapshot_photo(&inner, filter).await;

        // Authoritative guard, re-checked after the last suspension point
        // and immediately before the commit.
        if !inner.guard_live(generation) {
            log::info!("Countdown discarded: session reset before commit");
            return;
        }

        match captured {
            Ok(photo) => {
                let mut completed = false;
                let mut event = None;
                {
                    let mut session = inner.session.lock().expect("lock poisoned");
                    match session.commit_photo(photo) {
                        Ok(slot) => {
                            let count = session.photos().len();
                            log::info!("Photo {} committed ({} of {})", slot, count, Session::MAX_PHOTOS);
                            event = Some(BoothEvent::PhotoCaptured { slot, count });
                            if session.is_complete() {
                                // Stop polling and transition in the same
                                // critical section so no extra poll slips in.
                                inner.polling.store(false, Ordering::SeqCst);
                                session.set_phase(BoothPhase::Preview);
                                completed = true;
                            }
                        }
                        Err(e) => log::error!("Failed to commit photo: {}", e),
                    }
                }
                if let Some(event) = event {
                    inner.emit(event);
                }
                if completed {
                    inner.cancel_inflight();
                    Self::release_stream(&inner).await;
                    inner.emit(BoothEvent::PhaseChanged {
                        phase: BoothPhase::Preview,
                    });
                    log::info!("All photos captured, entering preview");
                }
            }
            Err(e) => log::error!("Capture at countdown zero failed: {}", e),
        }

        inner.finish_countdown(generation);
    }
}
