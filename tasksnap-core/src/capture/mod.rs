//! Screen capture via xdg-desktop-portal and PipeWire
//!
//! This module handles:
//! - The `CaptureSource` capability used by the session controller
//! - Screencast session setup through the portal
//! - A PipeWire-backed playback surface holding the latest frame

pub mod portal;
pub mod stream;

pub use portal::PortalCapture;
pub use stream::PipeWireSurface;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::Result;
use crate::types::{RawFrame, ReadyState, SourceKind};

/// Something that can hand out a live screen-share stream
///
/// Acquisition may prompt the user. Failures are terminal for the attempt:
/// callers surface them and never retry on their own.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Request a capture stream from the host
    async fn acquire(&self) -> Result<MediaStream>;
}

/// The off-screen surface a stream plays into
pub trait PlaybackSurface: Send + Sync {
    /// How much data the surface currently holds
    fn ready_state(&self) -> ReadyState;

    /// The most recent frame, if any
    fn current_frame(&self) -> Option<RawFrame>;
}

/// Type of sources to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureType {
    /// Only monitors/displays
    #[default]
    Monitor,
    /// Only windows
    Window,
    /// Both monitors and windows
    Both,
}

impl std::str::FromStr for CaptureType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monitor" | "screen" => Ok(Self::Monitor),
            "window" => Ok(Self::Window),
            "both" | "any" => Ok(Self::Both),
            _ => Err(format!("Unknown capture source: {}", s)),
        }
    }
}

/// Information about an acquired stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    /// Stream width (0 if the host did not report it)
    pub width: u32,
    /// Stream height (0 if the host did not report it)
    pub height: u32,
    /// Type of source the user picked
    pub source_kind: SourceKind,
}

/// Fires once when the stream's video track ends
#[derive(Debug, Clone)]
pub struct TrackEnded {
    rx: watch::Receiver<bool>,
}

impl TrackEnded {
    /// Create a linked sender/receiver pair
    pub fn channel() -> (TrackEndedSender, Self) {
        let (tx, rx) = watch::channel(false);
        (TrackEndedSender { tx: Arc::new(tx) }, Self { rx })
    }

    /// Whether the track has already ended
    pub fn is_ended(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the track ends
    ///
    /// Also resolves if the producer side is dropped without signalling.
    pub async fn wait(&mut self) {
        // An Err means the sender is gone, which also ends the track.
        let _ = self.rx.wait_for(|ended| *ended).await;
    }
}

/// Producer side of [`TrackEnded`]
#[derive(Debug, Clone)]
pub struct TrackEndedSender {
    tx: Arc<watch::Sender<bool>>,
}

impl TrackEndedSender {
    /// Signal that the track ended; later calls are no-ops
    pub fn end(&self) {
        self.tx.send_if_modified(|ended| {
            if *ended {
                false
            } else {
                *ended = true;
                true
            }
        });
    }

    /// Whether the track has already been ended
    pub fn is_ended(&self) -> bool {
        *self.tx.borrow()
    }
}

/// A live screen-share stream owned by one capture session
pub struct MediaStream {
    surface: Arc<dyn PlaybackSurface>,
    ended: TrackEnded,
    info: StreamInfo,
}

impl MediaStream {
    /// Bundle a surface and its termination signal
    pub fn new(surface: Arc<dyn PlaybackSurface>, ended: TrackEnded, info: StreamInfo) -> Self {
        Self {
            surface,
            ended,
            info,
        }
    }

    /// The surface frames are sampled from
    pub fn surface(&self) -> Arc<dyn PlaybackSurface> {
        self.surface.clone()
    }

    /// Subscribe to the track-ended signal
    pub fn on_ended(&self) -> TrackEnded {
        self.ended.clone()
    }

    /// Stream information
    pub fn info(&self) -> StreamInfo {
        self.info
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("info", &self.info)
            .field("ended", &self.ended.is_ended())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_track_ended_fires_once() {
        let (tx, mut ended) = TrackEnded::channel();
        assert!(!ended.is_ended());

        tx.end();
        tx.end();
        ended.wait().await;
        assert!(ended.is_ended());
        assert!(tx.is_ended());
    }

    #[tokio::test]
    async fn test_track_ended_on_sender_drop() {
        let (tx, mut ended) = TrackEnded::channel();
        drop(tx);
        ended.wait().await;
    }

    #[test]
    fn test_capture_type_parse() {
        assert_eq!("window".parse::<CaptureType>(), Ok(CaptureType::Window));
        assert_eq!("Screen".parse::<CaptureType>(), Ok(CaptureType::Monitor));
        assert!("tab".parse::<CaptureType>().is_err());
    }
}
