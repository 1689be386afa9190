#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use sleuth_core::clock::ManualClock;
use sleuth_core::{Anchor, Finding, FindingRef, Rect, RgbaImage, Severity};
use sleuth_overlay::{
    GlyphCache, OverlayConfig, OverlayEngine, Primitive, RedrawSink, checkerboard, render_region,
};

const WAIT: Duration = Duration::from_secs(2);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fast_config() -> OverlayConfig {
    OverlayConfig {
        tick_ms: 5,
        ..OverlayConfig::default()
    }
}

fn channel_engine() -> (OverlayEngine, Receiver<Rect>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let sink: Arc<dyn RedrawSink> = Arc::new(tx);
    (OverlayEngine::new(fast_config(), sink), rx)
}

fn copy_move() -> FindingRef {
    Finding::new(
        "Block at (50, 50) duplicates (10, 10)",
        Severity::Critical,
        Anchor::rectangle(54.0, 54.0, 8.0, 8.0),
    )
    .with_source(Anchor::rectangle(14.0, 14.0, 8.0, 8.0))
    .into_ref()
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Receive until a rectangle other than `previous` arrives.
fn next_different(rx: &Receiver<Rect>, previous: Rect) -> Rect {
    let deadline = Instant::now() + WAIT;
    loop {
        let rect = rx
            .recv_deadline(deadline)
            .expect("animation stopped requesting redraws");
        if rect != previous {
            return rect;
        }
    }
}

#[test]
fn selection_requests_redraws_of_dirty_rect() {
    init_logging();
    let (engine, rx) = channel_engine();
    let finding = copy_move();
    engine.set_active_finding(Some(Arc::clone(&finding)));

    let expected = Rect::new(5.0, 5.0, 58.0, 58.0);
    assert_eq!(engine.dirty_rect(), Some(expected));
    for _ in 0..3 {
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), expected);
    }
    assert!(engine.is_animating());
}

#[test]
fn switching_selection_moves_redraw_region() {
    init_logging();
    let (engine, rx) = channel_engine();
    let first = Finding::new("a", Severity::Warning, Anchor::point(10.0, 10.0)).into_ref();
    let second = Finding::new("b", Severity::Warning, Anchor::point(100.0, 100.0)).into_ref();

    engine.set_active_finding(Some(first));
    let a = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(a, Rect::new(5.0, 5.0, 10.0, 10.0));

    engine.set_active_finding(Some(second));
    assert_eq!(next_different(&rx, a), Rect::new(95.0, 95.0, 10.0, 10.0));
}

#[test]
fn clearing_selection_ends_animation() {
    init_logging();
    let (engine, rx) = channel_engine();
    engine.set_active_finding(Some(copy_move()));
    rx.recv_timeout(WAIT).unwrap();

    engine.set_active_finding(None);
    assert!(wait_until(|| !engine.is_animating()));
    while rx.try_recv().is_ok() {}
    assert_eq!(
        rx.recv_timeout(Duration::from_millis(50)),
        Err(RecvTimeoutError::Timeout)
    );
}

#[test]
fn hiding_stops_and_showing_resumes() {
    init_logging();
    let (engine, rx) = channel_engine();
    engine.set_active_finding(Some(copy_move()));
    rx.recv_timeout(WAIT).unwrap();

    engine.set_visible(false);
    assert!(!engine.is_animating());
    while rx.try_recv().is_ok() {}
    assert_eq!(
        rx.recv_timeout(Duration::from_millis(50)),
        Err(RecvTimeoutError::Timeout)
    );

    engine.set_visible(true);
    assert!(engine.is_animating());
    rx.recv_timeout(WAIT).unwrap();
}

#[test]
fn restarting_after_stop() {
    init_logging();
    let (engine, rx) = channel_engine();
    let finding = copy_move();
    engine.set_active_finding(Some(Arc::clone(&finding)));
    rx.recv_timeout(WAIT).unwrap();

    engine.stop();
    assert!(!engine.is_animating());
    assert!(engine.active_finding().is_some());

    engine.set_active_finding(Some(finding));
    assert!(engine.is_animating());
    rx.recv_timeout(WAIT).unwrap();
}

#[test]
fn dropping_engine_joins_animation() {
    init_logging();
    let (engine, rx) = channel_engine();
    engine.set_active_finding(Some(copy_move()));
    rx.recv_timeout(WAIT).unwrap();
    drop(engine);

    // The engine and its thread held the only senders.
    let deadline = Instant::now() + WAIT;
    loop {
        match rx.recv_deadline(deadline) {
            Ok(_) => {}
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => panic!("sink still alive"),
        }
    }
}

#[test]
fn pulse_is_driven_by_injected_clock() {
    let clock = Arc::new(ManualClock::new());
    let (engine, _rx) = channel_engine();
    let engine = engine.with_clock(clock.clone());
    engine.set_active_finding(Some(copy_move()));

    let fill_alpha = |engine: &OverlayEngine| {
        let frame = engine.frame().unwrap();
        frame
            .primitives
            .iter()
            .rev()
            .find_map(|p| match p {
                Primitive::Shape(shape) if shape.stroke.is_some() => shape.fill,
                _ => None,
            })
            .unwrap()
            .a
    };

    let low = fill_alpha(&engine);
    clock.advance(Duration::from_millis(500));
    let high = fill_alpha(&engine);
    clock.advance(Duration::from_millis(500));
    let low_again = fill_alpha(&engine);

    assert_eq!(low, 51);
    assert_eq!(high, 153);
    assert_eq!(low_again, low);
}

#[test]
fn glyph_cache_tolerates_concurrent_first_touch() {
    let cache = Arc::new(GlyphCache::new());
    let finding = copy_move();
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let finding = Arc::clone(&finding);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                cache.get(&finding)
            })
        })
        .collect();
    let glyphs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(glyphs.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(cache.len(), 1);
    assert!((1..=8).contains(&cache.render_count()));

    let before = cache.render_count();
    cache.get(&finding);
    assert_eq!(cache.render_count(), before);
}

#[test]
fn dirty_region_render_over_checkerboard() {
    let (engine, _rx) = channel_engine();
    engine.set_visible(false);
    let finding = copy_move();
    engine.set_active_finding(Some(finding));

    let base: RgbaImage = checkerboard(80, 80, 16);
    let frame = engine.frame().unwrap();
    let dirty = engine.dirty_rect().unwrap();
    let (tile, origin) = render_region(&base, &frame, dirty).unwrap();

    assert_eq!(origin, (5, 5));
    assert_eq!(tile.dimensions(), (58, 58));
    // Untouched corner of the tile keeps the backdrop.
    assert_eq!(tile.get_pixel(0, 57), base.get_pixel(5, 62));
    // Inside the primary extent the severity colour dominates.
    let (ox, oy) = origin;
    let inside = tile.get_pixel(56 - ox, 52 - oy);
    assert!(inside[0] > inside[2], "{inside:?}");
}
