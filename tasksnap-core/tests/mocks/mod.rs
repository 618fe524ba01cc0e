//! Mock infrastructure for testing
//!
//! Scripted capture sources, a controllable playback surface, a recording
//! screenshot store, and test frame builders.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use tasksnap_core::capture::{
    CaptureSource, MediaStream, PlaybackSurface, StreamInfo, TrackEnded, TrackEndedSender,
};
use tasksnap_core::error::{Result, SnapError};
use tasksnap_core::types::{PixelFormat, RawFrame, ReadyState, SourceKind, TaskId};
use tasksnap_core::upload::{ScreenshotStore, UploadAck};

/// Shorthand for a valid task id
pub fn task(id: &str) -> TaskId {
    TaskId::new(id).expect("valid task id")
}

/// Create a BGRx test frame with a solid color
pub fn create_test_frame(width: u32, height: u32, color: [u8; 3]) -> RawFrame {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..(width * height) {
        data.extend_from_slice(&[color[2], color[1], color[0], 0]);
    }
    RawFrame::packed(width, height, PixelFormat::Bgrx, data)
}

/// Create a BGRA test frame with a diagonal gradient
pub fn create_gradient_frame(width: u32, height: u32) -> RawFrame {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = ((x as f32 / width as f32) * 255.0) as u8;
            let g = ((y as f32 / height as f32) * 255.0) as u8;
            let b = (((x + y) as f32 / (width + height) as f32) * 255.0) as u8;
            data.extend_from_slice(&[b, g, r, 255]);
        }
    }
    RawFrame::packed(width, height, PixelFormat::Bgra, data)
}

/// Playback surface whose readiness and frame are set by the test
#[derive(Default)]
pub struct MockSurface {
    state: Mutex<ReadyState>,
    frame: Mutex<Option<RawFrame>>,
}

impl MockSurface {
    /// Surface that has negotiated a format but holds no frame yet
    pub fn loading() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ReadyState::HaveMetadata),
            frame: Mutex::new(None),
        })
    }

    /// Surface already holding a frame
    pub fn ready(frame: RawFrame) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ReadyState::HaveEnoughData),
            frame: Mutex::new(Some(frame)),
        })
    }

    /// Deliver a frame and mark the surface ready
    pub fn show(&self, frame: RawFrame) {
        *self.frame.lock() = Some(frame);
        *self.state.lock() = ReadyState::HaveEnoughData;
    }

    /// Force a readiness value without touching the frame
    pub fn set_state(&self, state: ReadyState) {
        *self.state.lock() = state;
    }
}

impl PlaybackSurface for MockSurface {
    fn ready_state(&self) -> ReadyState {
        *self.state.lock()
    }

    fn current_frame(&self) -> Option<RawFrame> {
        self.frame.lock().clone()
    }
}

/// What the next `acquire` call does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Grant,
    Deny,
    NoDisplay,
}

/// Capture source following a script, granting by default
pub struct MockCaptureSource {
    surface: Arc<MockSurface>,
    script: Mutex<VecDeque<Acquire>>,
    enders: Mutex<Vec<TrackEndedSender>>,
    /// Gates the next acquisitions wait on, in call order
    gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    calls: Mutex<usize>,
}

impl MockCaptureSource {
    pub fn new(surface: Arc<MockSurface>) -> Arc<Self> {
        Arc::new(Self {
            surface,
            script: Mutex::new(VecDeque::new()),
            enders: Mutex::new(Vec::new()),
            gates: Mutex::new(VecDeque::new()),
            calls: Mutex::new(0),
        })
    }

    /// Source whose every request is refused
    pub fn denying() -> Arc<Self> {
        let source = Self::new(MockSurface::loading());
        for _ in 0..8 {
            source.script.lock().push_back(Acquire::Deny);
        }
        source
    }

    /// Queue the outcome of the next acquisition
    pub fn then(&self, outcome: Acquire) {
        self.script.lock().push_back(outcome);
    }

    /// Keep the next acquisition waiting, as if the picker were open
    ///
    /// The request resolves with its scripted outcome once the returned
    /// sender fires or is dropped.
    pub fn hold(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().push_back(rx);
        tx
    }

    /// Number of acquisition attempts so far
    pub fn acquire_count(&self) -> usize {
        *self.calls.lock()
    }

    /// End the video track of the most recent stream
    pub fn end_track(&self) {
        if let Some(ender) = self.enders.lock().last() {
            ender.end();
        }
    }

    pub fn surface(&self) -> Arc<MockSurface> {
        self.surface.clone()
    }
}

#[async_trait]
impl CaptureSource for MockCaptureSource {
    async fn acquire(&self) -> Result<MediaStream> {
        *self.calls.lock() += 1;
        let outcome = self.script.lock().pop_front().unwrap_or(Acquire::Grant);
        let gate = self.gates.lock().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        match outcome {
            Acquire::Deny => Err(SnapError::denied("user cancelled the picker")),
            Acquire::NoDisplay => Err(SnapError::no_display("no streams offered")),
            Acquire::Grant => {
                let (ender, ended) = TrackEnded::channel();
                self.enders.lock().push(ender);
                let info = StreamInfo {
                    width: 64,
                    height: 48,
                    source_kind: SourceKind::Monitor,
                };
                Ok(MediaStream::new(self.surface.clone(), ended, info))
            }
        }
    }
}

/// One append seen by the recording store
#[derive(Debug, Clone)]
pub struct StoreCall {
    pub task_id: TaskId,
    pub bytes: usize,
    /// When the append started
    pub at: Instant,
    pub succeeded: bool,
}

/// Screenshot store that records appends, with scripted failures and latency
pub struct RecordingStore {
    calls: Mutex<Vec<StoreCall>>,
    completed: Mutex<Vec<StoreCall>>,
    fail_on: HashSet<usize>,
    latency: Duration,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Self::build(HashSet::new(), Duration::ZERO)
    }

    /// Fail the given 1-based append numbers with a server error
    pub fn failing_on(calls: &[usize]) -> Arc<Self> {
        Self::build(calls.iter().copied().collect(), Duration::ZERO)
    }

    /// Take `latency` to finish each append
    pub fn slow(latency: Duration) -> Arc<Self> {
        Self::build(HashSet::new(), latency)
    }

    fn build(fail_on: HashSet<usize>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            fail_on,
            latency,
        })
    }

    /// Every append attempt, in start order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    /// Appends that have returned, in completion order
    pub fn completed(&self) -> Vec<StoreCall> {
        self.completed.lock().clone()
    }
}

#[async_trait]
impl ScreenshotStore for RecordingStore {
    async fn append(&self, task_id: &TaskId, png: Bytes) -> Result<UploadAck> {
        let call = {
            let mut calls = self.calls.lock();
            let n = calls.len() + 1;
            let call = StoreCall {
                task_id: task_id.clone(),
                bytes: png.len(),
                at: Instant::now(),
                succeeded: !self.fail_on.contains(&n),
            };
            calls.push(call.clone());
            call
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.completed.lock().push(call.clone());

        if call.succeeded {
            Ok(UploadAck {
                task_id: task_id.clone(),
                bytes: png.len(),
                location: None,
            })
        } else {
            Err(SnapError::Server {
                status: 503,
                message: "storage unavailable".into(),
            })
        }
    }
}

/// Let spawned tasks run without advancing the clock much
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_frame_layout() {
        let frame = create_test_frame(4, 2, [10, 20, 30]);
        assert_eq!(frame.stride, 16);
        assert_eq!(frame.data.len(), 32);
        assert_eq!(&frame.data[..4], &[30, 20, 10, 0]);
        assert!(frame.is_complete());
    }

    #[test]
    fn test_gradient_frame_dimensions() {
        let frame = create_gradient_frame(64, 48);
        assert_eq!((frame.width, frame.height), (64, 48));
        assert_eq!(frame.format, PixelFormat::Bgra);
    }

    #[test]
    fn test_mock_surface_transitions() {
        let surface = MockSurface::loading();
        assert_eq!(surface.ready_state(), ReadyState::HaveMetadata);
        assert!(surface.current_frame().is_none());

        surface.show(create_test_frame(2, 2, [0, 0, 0]));
        assert_eq!(surface.ready_state(), ReadyState::HaveEnoughData);
        assert!(surface.current_frame().is_some());
    }
}
