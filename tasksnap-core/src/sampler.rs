//! Periodic frame sampling
//!
//! Every `interval` the sampler looks at the session's playback surface and,
//! if it holds enough data, renders the current frame and encodes it as PNG.
//! Ticks are wall-clock periodic and never wait for uploads: captured frames
//! go out on an unbounded channel.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::capture::{PlaybackSurface, TrackEnded};
use crate::render::FrameRenderer;
use crate::types::{CapturedFrame, ReadyState, TaskId};

/// Why a tick produced no frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Surface below `HaveEnoughData`
    NotReady,
    /// Surface claimed readiness but held no frame
    NoFrame,
    /// Frame could not be drawn to a raster
    RenderFailed,
    /// Encoder failed or produced no bytes
    EmptyEncode,
}

/// Result of a single tick
#[derive(Debug)]
pub enum TickOutcome {
    /// A frame was captured
    Captured(CapturedFrame),
    /// Nothing this tick
    Skipped(SkipReason),
}

/// Counters shared between the sampler task and observers
#[derive(Debug, Default)]
pub struct SamplerStats {
    ticks: AtomicU64,
    captured: AtomicU64,
    skipped: AtomicU64,
}

impl SamplerStats {
    /// Ticks that fired
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Ticks that produced a frame
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    /// Ticks that produced nothing
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Why the sampling loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerExit {
    /// Stop was requested
    Stopped,
    /// The video track ended
    TrackEnded,
    /// Nobody is consuming frames anymore
    ConsumerGone,
}

/// Extracts still frames from a playback surface on a fixed interval
pub struct FrameSampler {
    surface: Arc<dyn PlaybackSurface>,
    renderer: Arc<dyn FrameRenderer>,
    task_id: TaskId,
    interval: Duration,
    sequence: u64,
    stats: Arc<SamplerStats>,
}

impl FrameSampler {
    /// Create a sampler for one task
    pub fn new(
        surface: Arc<dyn PlaybackSurface>,
        renderer: Arc<dyn FrameRenderer>,
        task_id: TaskId,
        interval: Duration,
    ) -> Self {
        Self {
            surface,
            renderer,
            task_id,
            interval,
            sequence: 0,
            stats: Arc::new(SamplerStats::default()),
        }
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<SamplerStats> {
        self.stats.clone()
    }

    /// The configured interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Perform one tick
    ///
    /// Best effort: every failure becomes a [`TickOutcome::Skipped`].
    pub fn sample_once(&mut self) -> TickOutcome {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        let outcome = self.capture();
        match &outcome {
            TickOutcome::Captured(frame) => {
                self.stats.captured.fetch_add(1, Ordering::Relaxed);
                trace!(
                    "Captured frame #{} for task {} ({} bytes)",
                    frame.sequence,
                    frame.task_id,
                    frame.png.len()
                );
            }
            TickOutcome::Skipped(reason) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                debug!("Tick skipped for task {}: {:?}", self.task_id, reason);
            }
        }
        outcome
    }

    fn capture(&mut self) -> TickOutcome {
        if self.surface.ready_state() < ReadyState::HaveEnoughData {
            return TickOutcome::Skipped(SkipReason::NotReady);
        }

        let Some(frame) = self.surface.current_frame() else {
            return TickOutcome::Skipped(SkipReason::NoFrame);
        };

        let raster = match self.renderer.render(&frame) {
            Ok(raster) => raster,
            Err(e) => {
                trace!("Render failed: {}", e);
                return TickOutcome::Skipped(SkipReason::RenderFailed);
            }
        };

        let png = match self.renderer.encode(&raster) {
            Ok(png) if !png.is_empty() => png,
            Ok(_) => return TickOutcome::Skipped(SkipReason::EmptyEncode),
            Err(e) => {
                trace!("Encode failed: {}", e);
                return TickOutcome::Skipped(SkipReason::EmptyEncode);
            }
        };

        self.sequence += 1;
        TickOutcome::Captured(CapturedFrame {
            task_id: self.task_id.clone(),
            png: Bytes::from(png),
            captured_at: SystemTime::now(),
            sequence: self.sequence,
        })
    }

    /// Run the sampling loop until stopped
    ///
    /// The first tick fires one interval after the call. Missed ticks are
    /// skipped rather than bursted. Stop and track end are checked before
    /// every tick, so no tick fires once either has been observed.
    pub async fn run(
        mut self,
        frames: mpsc::UnboundedSender<CapturedFrame>,
        mut stop: watch::Receiver<bool>,
        mut ended: TrackEnded,
    ) -> SamplerExit {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Sampling task {} every {}ms",
            self.task_id,
            self.interval.as_millis()
        );

        let exit = loop {
            if *stop.borrow() {
                break SamplerExit::Stopped;
            }

            tokio::select! {
                biased;
                _ = stop.wait_for(|stopped| *stopped) => break SamplerExit::Stopped,
                _ = ended.wait() => break SamplerExit::TrackEnded,
                _ = ticker.tick() => {
                    if let TickOutcome::Captured(frame) = self.sample_once() {
                        if frames.send(frame).is_err() {
                            break SamplerExit::ConsumerGone;
                        }
                    }
                }
            }
        };

        info!(
            "Sampler for task {} exited ({:?}): {} ticks, {} captured, {} skipped",
            self.task_id,
            exit,
            self.stats.ticks(),
            self.stats.captured(),
            self.stats.skipped()
        );
        exit
    }
}
