//! xdg-desktop-portal screencast integration
//!
//! Uses ashpd to ask the user for a screen or window through the
//! ScreenCast portal, then hands the resulting PipeWire node to a
//! [`PipeWireSurface`].

use ashpd::desktop::screencast::{CursorMode as PortalCursorMode, Screencast, SourceType};
use ashpd::desktop::ResponseError;
use ashpd::{enumflags2::BitFlags, WindowIdentifier};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{CaptureSource, CaptureType, MediaStream, PipeWireSurface, StreamInfo};
use crate::config::CursorMode;
use crate::error::{Result, SnapError};
use crate::types::SourceKind;

/// Portal-based capture source
pub struct PortalCapture {
    /// Screencast portal proxy
    screencast: Screencast<'static>,
    /// Which sources the picker offers
    capture_type: CaptureType,
    /// Cursor handling in captured frames
    cursor_mode: CursorMode,
}

impl PortalCapture {
    /// Connect to the screencast portal
    pub async fn new(capture_type: CaptureType, cursor_mode: CursorMode) -> Result<Self> {
        let screencast = Screencast::new()
            .await
            .map_err(|e| SnapError::no_display(format!("ScreenCast portal unavailable: {}", e)))?;
        Ok(Self {
            screencast,
            capture_type,
            cursor_mode,
        })
    }

    fn source_types(&self) -> BitFlags<SourceType> {
        match self.capture_type {
            CaptureType::Monitor => SourceType::Monitor.into(),
            CaptureType::Window => SourceType::Window.into(),
            CaptureType::Both => SourceType::Monitor | SourceType::Window,
        }
    }

    fn portal_cursor(&self) -> PortalCursorMode {
        match self.cursor_mode {
            CursorMode::Hidden => PortalCursorMode::Hidden,
            CursorMode::Embedded => PortalCursorMode::Embedded,
            CursorMode::Metadata => PortalCursorMode::Metadata,
        }
    }
}

/// Translate a portal failure into the acquisition taxonomy
fn acquisition_error(err: ashpd::Error) -> SnapError {
    match err {
        ashpd::Error::Response(ResponseError::Cancelled) => {
            SnapError::denied("user cancelled the screen picker")
        }
        ashpd::Error::Response(ResponseError::Other) => {
            SnapError::denied("screen capture request was refused")
        }
        other => SnapError::no_display(other.to_string()),
    }
}

#[async_trait]
impl CaptureSource for PortalCapture {
    async fn acquire(&self) -> Result<MediaStream> {
        info!("Creating screencast session via portal");

        let session = self
            .screencast
            .create_session()
            .await
            .map_err(acquisition_error)?;

        let source_type = self.source_types();
        debug!("Requesting source selection: {:?}", source_type);

        // Triggers the portal dialog
        self.screencast
            .select_sources(
                &session,
                self.portal_cursor(),
                source_type,
                false,
                None,
                ashpd::desktop::PersistMode::DoNot,
            )
            .await
            .map_err(acquisition_error)?;

        let response = self
            .screencast
            .start(&session, None::<&WindowIdentifier>)
            .await
            .map_err(acquisition_error)?
            .response()
            .map_err(acquisition_error)?;

        let Some(stream) = response.streams().first() else {
            return Err(SnapError::no_display("portal returned no streams"));
        };

        let node_id = stream.pipe_wire_node_id();
        let source_kind = stream
            .source_type()
            .map(|st| {
                if st == SourceType::Window {
                    SourceKind::Window
                } else {
                    SourceKind::Monitor
                }
            })
            .unwrap_or(SourceKind::Monitor);
        let (width, height) = stream.size().unwrap_or_else(|| {
            warn!("Portal did not report a stream size");
            (0, 0)
        });

        let fd = self
            .screencast
            .open_pipe_wire_remote(&session)
            .await
            .map_err(acquisition_error)?;

        info!(
            "Screencast granted: {} node_id={} {}x{}",
            source_kind, node_id, width, height
        );

        let (surface, ended) = PipeWireSurface::start(fd, node_id)?;

        Ok(MediaStream::new(
            Arc::new(surface),
            ended,
            StreamInfo {
                width: width.max(0) as u32,
                height: height.max(0) as u32,
                source_kind,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_maps_to_denied() {
        let err = acquisition_error(ashpd::Error::Response(ResponseError::Cancelled));
        assert!(matches!(err, SnapError::AcquisitionDenied(_)));
        assert!(err.is_session_fatal());
    }

    #[tokio::test]
    #[ignore = "requires xdg-desktop-portal and user interaction"]
    async fn test_portal_acquire() {
        let portal = PortalCapture::new(CaptureType::Monitor, CursorMode::Embedded)
            .await
            .expect("portal");
        let stream = portal.acquire().await.expect("stream");
        assert!(!stream.on_ended().is_ended());
    }
}
