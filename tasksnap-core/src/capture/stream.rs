//! PipeWire-backed playback surface
//!
//! Connects to the PipeWire node handed out by the screencast portal and
//! keeps the most recent video frame in memory for the sampler to pick up.

use pipewire as pw;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::param::video::VideoFormat;
use pw::spa::pod::Pod;
use pw::spa::utils::{Direction, Fraction, Rectangle};
use pw::stream::{Stream, StreamFlags, StreamState};

use parking_lot::Mutex;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use super::{PlaybackSurface, TrackEnded, TrackEndedSender};
use crate::error::{Result, ResultExt, SnapError};
use crate::types::{PixelFormat, RawFrame, ReadyState};

/// Shared state between the PipeWire thread and the sampler
struct SharedState {
    /// Negotiated video format
    format: Mutex<Option<VideoInfo>>,
    /// Latest frame delivered by the stream
    latest: Mutex<Option<RawFrame>>,
    /// Frame counter
    frame_count: AtomicU64,
    /// Whether the stream is streaming
    running: AtomicBool,
    /// Track-ended signal
    ended: TrackEndedSender,
}

/// Parsed video format information
#[derive(Debug, Clone, Copy)]
struct VideoInfo {
    format: PixelFormat,
    width: u32,
    height: u32,
}

/// Map a SPA video format to the layouts the renderer understands
fn pixel_format(format: VideoFormat) -> Option<PixelFormat> {
    match format {
        VideoFormat::BGRx => Some(PixelFormat::Bgrx),
        VideoFormat::BGRA => Some(PixelFormat::Bgra),
        VideoFormat::RGBx => Some(PixelFormat::Rgbx),
        VideoFormat::RGBA => Some(PixelFormat::Rgba),
        VideoFormat::RGB => Some(PixelFormat::Rgb),
        VideoFormat::BGR => Some(PixelFormat::Bgr),
        _ => None,
    }
}

/// Playback surface fed by a PipeWire screencast stream
///
/// Owned by exactly one capture session. Dropping it stops the PipeWire
/// thread and ends the track.
pub struct PipeWireSurface {
    /// Thread handle for the PipeWire main loop
    pw_thread: Option<std::thread::JoinHandle<()>>,
    /// Channel to signal shutdown
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Shared state
    shared: Arc<SharedState>,
}

impl PipeWireSurface {
    /// Start receiving frames from a portal node
    ///
    /// # Arguments
    /// * `fd` - PipeWire remote file descriptor from the portal
    /// * `node_id` - PipeWire node ID to connect to
    pub fn start(fd: OwnedFd, node_id: u32) -> Result<(Self, TrackEnded)> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let (ended_tx, ended) = TrackEnded::channel();

        let shared = Arc::new(SharedState {
            format: Mutex::new(None),
            latest: Mutex::new(None),
            frame_count: AtomicU64::new(0),
            running: AtomicBool::new(false),
            ended: ended_tx,
        });

        let shared_clone = shared.clone();

        let pw_thread = std::thread::Builder::new()
            .name("tasksnap-pipewire".to_string())
            .spawn(move || {
                if let Err(e) = run_pipewire_loop(fd, node_id, shutdown_rx, shared_clone.clone())
                {
                    error!("PipeWire loop error: {}", e);
                }
                shared_clone.running.store(false, Ordering::SeqCst);
                shared_clone.ended.end();
            })
            .map_err(|e| SnapError::pipewire(format!("Failed to spawn PipeWire thread: {}", e)))?;

        Ok((
            Self {
                pw_thread: Some(pw_thread),
                shutdown_tx: Some(shutdown_tx),
                shared,
            },
            ended,
        ))
    }

    /// Check if the stream is still running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
            && self
                .pw_thread
                .as_ref()
                .map(|t| !t.is_finished())
                .unwrap_or(false)
    }

    /// Number of frames received so far
    pub fn frame_count(&self) -> u64 {
        self.shared.frame_count.load(Ordering::Relaxed)
    }

    /// Negotiated size, if known
    pub fn size(&self) -> Option<(u32, u32)> {
        self.shared.format.lock().map(|f| (f.width, f.height))
    }

    /// Stop the stream and wait for the PipeWire thread
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            debug!("Stopping PipeWire surface");
            let _ = tx.send(());
        }

        if let Some(thread) = self.pw_thread.take() {
            let _ = thread.join();
        }

        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.ended.end();
    }
}

impl PlaybackSurface for PipeWireSurface {
    fn ready_state(&self) -> ReadyState {
        let has_frame = self.shared.latest.lock().is_some();
        if has_frame && self.shared.running.load(Ordering::SeqCst) {
            ReadyState::HaveEnoughData
        } else if has_frame {
            ReadyState::HaveCurrentData
        } else if self.shared.format.lock().is_some() {
            ReadyState::HaveMetadata
        } else {
            ReadyState::HaveNothing
        }
    }

    fn current_frame(&self) -> Option<RawFrame> {
        self.shared.latest.lock().clone()
    }
}

impl Drop for PipeWireSurface {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run the PipeWire main loop (called from dedicated thread)
fn run_pipewire_loop(
    fd: OwnedFd,
    node_id: u32,
    shutdown_rx: mpsc::Receiver<()>,
    shared: Arc<SharedState>,
) -> Result<()> {
    pw::init();

    info!("Initializing PipeWire surface for node {}", node_id);

    let mainloop = pw::main_loop::MainLoop::new(None)
        .map_err(SnapError::from)
        .context("Failed to create main loop")?;

    let loop_ = mainloop.loop_();

    let context = pw::context::Context::new(&mainloop)
        .map_err(SnapError::from)
        .context("Failed to create context")?;

    // Connect using the portal's file descriptor
    let core = context
        .connect_fd(fd, None)
        .map_err(SnapError::from)
        .context("Failed to connect to PipeWire fd")?;

    struct UserData {
        format: Option<VideoInfo>,
        shared: Arc<SharedState>,
    }

    let user_data = UserData {
        format: None,
        shared: shared.clone(),
    };

    let stream = Stream::new(
        &core,
        "tasksnap-capture",
        pw::properties::properties! {
            *pw::keys::MEDIA_TYPE => "Video",
            *pw::keys::MEDIA_CATEGORY => "Capture",
            *pw::keys::MEDIA_ROLE => "Screen",
        },
    )
    .map_err(SnapError::from)
    .context("Failed to create stream")?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .state_changed(|_, user_data, old, new| {
            debug!("Stream state changed: {:?} -> {:?}", old, new);
            match new {
                StreamState::Streaming => {
                    info!("PipeWire stream is now streaming");
                    user_data.shared.running.store(true, Ordering::SeqCst);
                }
                StreamState::Error(msg) => {
                    error!("Capture stream error: {}", msg);
                    user_data.shared.running.store(false, Ordering::SeqCst);
                    user_data.shared.ended.end();
                }
                StreamState::Paused => {
                    // Source may be minimized or occluded
                    warn!("Stream paused - capture source may be minimized or hidden");
                    user_data.shared.running.store(false, Ordering::SeqCst);
                }
                StreamState::Unconnected => {
                    info!("Screen sharing stopped by the host");
                    user_data.shared.running.store(false, Ordering::SeqCst);
                    user_data.shared.ended.end();
                }
                _ => {}
            }
        })
        .param_changed(|_, user_data, id, param| {
            let Some(param) = param else { return };
            if id != pw::spa::param::ParamType::Format.as_raw() {
                return;
            }

            let (media_type, media_subtype) = match format_utils::parse_format(param) {
                Ok(v) => v,
                Err(_) => return,
            };

            if media_type != MediaType::Video || media_subtype != MediaSubtype::Raw {
                return;
            }

            let mut video_info = pw::spa::param::video::VideoInfoRaw::new();
            if video_info.parse(param).is_err() {
                warn!("Failed to parse video format");
                return;
            }

            let Some(format) = pixel_format(video_info.format()) else {
                warn!("Unsupported video format {:?}", video_info.format());
                return;
            };

            let info = VideoInfo {
                format,
                width: video_info.size().width,
                height: video_info.size().height,
            };

            info!(
                "Video format negotiated: {:?} {}x{}",
                info.format, info.width, info.height
            );

            user_data.format = Some(info);
            *user_data.shared.format.lock() = Some(info);
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                trace!("No buffer available");
                return;
            };

            let Some(format) = user_data.format else {
                trace!("No format yet, skipping frame");
                return;
            };

            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];

            let chunk_size = data.chunk().size() as usize;
            let chunk_stride = data.chunk().stride() as u32;

            if chunk_size == 0 {
                return;
            }

            if let Some(slice) = data.data() {
                let stride = if chunk_stride > 0 {
                    chunk_stride
                } else {
                    format.width.saturating_mul(format.format.bytes_per_pixel())
                };

                let frame = RawFrame {
                    width: format.width,
                    height: format.height,
                    stride,
                    format: format.format,
                    data: slice[..chunk_size.min(slice.len())].to_vec(),
                };

                *user_data.shared.latest.lock() = Some(frame);
                let count = user_data.shared.frame_count.fetch_add(1, Ordering::Relaxed);
                if count % 300 == 0 {
                    trace!("Received {} frames", count + 1);
                }
            }
        })
        .register()
        .map_err(SnapError::from)
        .context("Failed to register listener")?;

    // Only layouts the PNG renderer can convert
    let obj = pw::spa::pod::object!(
        pw::spa::utils::SpaTypes::ObjectParamFormat,
        pw::spa::param::ParamType::EnumFormat,
        pw::spa::pod::property!(
            pw::spa::param::format::FormatProperties::MediaType,
            Id,
            MediaType::Video
        ),
        pw::spa::pod::property!(
            pw::spa::param::format::FormatProperties::MediaSubtype,
            Id,
            MediaSubtype::Raw
        ),
        pw::spa::pod::property!(
            pw::spa::param::format::FormatProperties::VideoFormat,
            Choice,
            Enum,
            Id,
            VideoFormat::BGRx,
            VideoFormat::BGRx,
            VideoFormat::BGRA,
            VideoFormat::RGBx,
            VideoFormat::RGBA,
            VideoFormat::RGB,
            VideoFormat::BGR
        ),
        pw::spa::pod::property!(
            pw::spa::param::format::FormatProperties::VideoSize,
            Choice,
            Range,
            Rectangle,
            Rectangle {
                width: 1920,
                height: 1080
            },
            Rectangle {
                width: 1,
                height: 1
            },
            Rectangle {
                width: 8192,
                height: 8192
            }
        ),
        pw::spa::pod::property!(
            pw::spa::param::format::FormatProperties::VideoFramerate,
            Choice,
            Range,
            Fraction,
            Fraction { num: 30, denom: 1 },
            Fraction { num: 0, denom: 1 },
            Fraction { num: 240, denom: 1 }
        ),
    );

    let values: Vec<u8> = pw::spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &pw::spa::pod::Value::Object(obj),
    )
    .map_err(|e| SnapError::pipewire(format!("Failed to serialize format: {:?}", e)))?
    .0
    .into_inner();

    let pod = Pod::from_bytes(&values)
        .ok_or_else(|| SnapError::pipewire("Failed to create Pod from serialized format"))?;
    let mut params = [pod];

    stream
        .connect(
            Direction::Input,
            Some(node_id),
            StreamFlags::AUTOCONNECT | StreamFlags::MAP_BUFFERS,
            &mut params,
        )
        .map_err(SnapError::from)
        .context("Failed to connect stream")?;

    info!("PipeWire stream connected to node {}", node_id);

    let mainloop_weak = mainloop.downgrade();
    let _source = loop_.add_idle(true, move || {
        if shutdown_rx.try_recv().is_ok() {
            debug!("Shutdown signal received");
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    mainloop.run();

    info!("PipeWire main loop ended");
    shared.running.store(false, Ordering::SeqCst);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_mapping() {
        assert_eq!(pixel_format(VideoFormat::BGRx), Some(PixelFormat::Bgrx));
        assert_eq!(pixel_format(VideoFormat::RGB), Some(PixelFormat::Rgb));
        assert_eq!(pixel_format(VideoFormat::NV12), None);
    }
}
