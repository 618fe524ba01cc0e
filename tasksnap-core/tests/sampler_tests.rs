//! Integration tests for the frame sampler

mod mocks;

use mocks::{create_gradient_frame, create_test_frame, task, MockSurface};
use std::sync::Arc;
use std::time::Duration;
use tasksnap_core::capture::TrackEnded;
use tasksnap_core::render::PngRenderer;
use tasksnap_core::sampler::{FrameSampler, SamplerExit, SkipReason, TickOutcome};
use tasksnap_core::types::{PixelFormat, RawFrame, ReadyState};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

const INTERVAL: Duration = Duration::from_secs(5);

fn sampler(surface: Arc<MockSurface>) -> FrameSampler {
    FrameSampler::new(surface, Arc::new(PngRenderer::new()), task("task-1"), INTERVAL)
}

#[test]
fn test_not_ready_surface_skips() {
    let mut sampler = sampler(MockSurface::loading());
    assert!(matches!(
        sampler.sample_once(),
        TickOutcome::Skipped(SkipReason::NotReady)
    ));

    let stats = sampler.stats();
    assert_eq!(stats.ticks(), 1);
    assert_eq!(stats.skipped(), 1);
    assert_eq!(stats.captured(), 0);
}

#[test]
fn test_current_data_is_not_enough() {
    let surface = MockSurface::ready(create_test_frame(4, 4, [0, 0, 0]));
    surface.set_state(ReadyState::HaveCurrentData);
    let mut sampler = sampler(surface);

    assert!(matches!(
        sampler.sample_once(),
        TickOutcome::Skipped(SkipReason::NotReady)
    ));
}

#[test]
fn test_ready_without_frame_skips() {
    let surface = MockSurface::loading();
    surface.set_state(ReadyState::HaveEnoughData);
    let mut sampler = sampler(surface);

    assert!(matches!(
        sampler.sample_once(),
        TickOutcome::Skipped(SkipReason::NoFrame)
    ));
}

#[test]
fn test_truncated_frame_skips() {
    let broken = RawFrame::packed(16, 16, PixelFormat::Bgra, vec![0; 32]);
    let mut sampler = sampler(MockSurface::ready(broken));

    assert!(matches!(
        sampler.sample_once(),
        TickOutcome::Skipped(SkipReason::RenderFailed)
    ));
}

#[test]
fn test_ready_surface_captures_native_png() {
    let mut sampler = sampler(MockSurface::ready(create_gradient_frame(64, 48)));

    let frame = match sampler.sample_once() {
        TickOutcome::Captured(frame) => frame,
        other => panic!("expected a capture, got {:?}", other),
    };
    assert_eq!(frame.task_id, task("task-1"));
    assert_eq!(frame.sequence, 1);

    let decoded = image::load_from_memory(&frame.png).expect("valid PNG");
    assert_eq!((decoded.width(), decoded.height()), (64, 48));

    match sampler.sample_once() {
        TickOutcome::Captured(next) => assert_eq!(next.sequence, 2),
        other => panic!("expected a capture, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_run_ticks_on_interval() {
    let sampler = sampler(MockSurface::ready(create_test_frame(8, 8, [5, 5, 5])));
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = watch::channel(false);
    let (_ender, ended) = TrackEnded::channel();

    let t0 = Instant::now();
    let handle = tokio::spawn(sampler.run(frames_tx, stop_rx, ended));

    for expected in [5u64, 10, 15] {
        let frame = frames_rx.recv().await.expect("frame");
        let elapsed = Instant::now() - t0;
        assert!(
            elapsed >= Duration::from_secs(expected)
                && elapsed < Duration::from_secs(expected) + Duration::from_millis(50),
            "tick {} arrived at {:?}",
            frame.sequence,
            elapsed
        );
    }

    stop_tx.send_replace(true);
    assert_eq!(handle.await.unwrap(), SamplerExit::Stopped);
    assert!(frames_rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_first_tick_captures_nothing() {
    let sampler = sampler(MockSurface::ready(create_test_frame(8, 8, [5, 5, 5])));
    let stats = sampler.stats();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = watch::channel(false);
    let (_ender, ended) = TrackEnded::channel();

    let handle = tokio::spawn(sampler.run(frames_tx, stop_rx, ended));
    tokio::time::sleep(Duration::from_secs(3)).await;
    stop_tx.send_replace(true);

    assert_eq!(handle.await.unwrap(), SamplerExit::Stopped);
    assert!(frames_rx.recv().await.is_none());
    assert_eq!(stats.ticks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_track_end_exits_loop() {
    let sampler = sampler(MockSurface::ready(create_test_frame(8, 8, [5, 5, 5])));
    let stats = sampler.stats();
    let (frames_tx, _frames_rx) = mpsc::unbounded_channel();
    let (_stop_tx, stop_rx) = watch::channel(false);
    let (ender, ended) = TrackEnded::channel();

    let handle = tokio::spawn(sampler.run(frames_tx, stop_rx, ended));
    tokio::time::sleep(Duration::from_secs(7)).await;
    ender.end();

    assert_eq!(handle.await.unwrap(), SamplerExit::TrackEnded);
    assert_eq!(stats.ticks(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_consumer_exits_loop() {
    let sampler = sampler(MockSurface::ready(create_test_frame(8, 8, [5, 5, 5])));
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let (_stop_tx, stop_rx) = watch::channel(false);
    let (_ender, ended) = TrackEnded::channel();
    drop(frames_rx);

    let exit = sampler.run(frames_tx, stop_rx, ended).await;
    assert_eq!(exit, SamplerExit::ConsumerGone);
}

#[tokio::test(start_paused = true)]
async fn test_skipped_ticks_keep_schedule() {
    let surface = MockSurface::loading();
    let sampler = sampler(surface.clone());
    let stats = sampler.stats();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = watch::channel(false);
    let (_ender, ended) = TrackEnded::channel();

    let t0 = Instant::now();
    let handle = tokio::spawn(sampler.run(frames_tx, stop_rx, ended));

    tokio::time::sleep(Duration::from_secs(12)).await;
    surface.show(create_test_frame(8, 8, [1, 1, 1]));

    let frame = frames_rx.recv().await.expect("frame");
    assert_eq!(frame.sequence, 1);
    assert!(Instant::now() - t0 >= Duration::from_secs(15));
    assert_eq!(stats.skipped(), 2);

    stop_tx.send_replace(true);
    handle.await.unwrap();
}
