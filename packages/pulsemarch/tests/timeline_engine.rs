//! End-to-end runs of the beat-locked engine against a recording backend.
//!
//! Run with: cargo test --test timeline_engine

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;
use pulsemarch::choreography;
use pulsemarch::musical_time::{Tempo, TickDetector};
use pulsemarch::playback::{PlaybackClock, SteppedClock};
use pulsemarch::scene_state::SceneState;
use pulsemarch::timeline::{DirtyGuard, Segment, Timeline};
use pulsemarch::uploader::RecordingBackend;
use pulsemarch::visualiser::{FrameOutcome, VisualiserConfig, VisualiserState};

const FRAME_MS: f64 = 16.0;

#[test]
fn one_tick_per_period_at_129_bpm() {
    let mut detector = TickDetector::new(Tempo::new(129.0));
    let mut edges = Vec::new();

    let mut elapsed = 0.0;
    while elapsed <= 465.0 {
        if detector.update(elapsed).on_tick {
            edges.push(elapsed);
        }
        elapsed += FRAME_MS;
    }

    assert_eq!(detector.clock().tick, 1);
    assert_eq!(edges.len(), 1);
    // The first downward crossing is a quarter period in
    assert_eq!(edges[0], 128.0);
}

#[test]
fn tick_never_decreases_and_edges_match_increments() {
    let mut detector = TickDetector::new(Tempo::new(129.0));
    let mut previous = 0;
    for frame in 0..2000 {
        let clock = *detector.update(frame as f64 * FRAME_MS);
        assert!(clock.tick >= previous);
        assert_eq!(clock.on_tick, clock.tick == previous + 1);
        previous = clock.tick;
    }
}

#[test]
fn subdivided_tempo_still_ticks_once_per_beat() {
    let mut plain = TickDetector::new(Tempo::new(129.0));
    let mut subdivided = TickDetector::new(Tempo::with_subdivision(129.0, 2.0));

    for frame in 0..500 {
        let elapsed = frame as f64 * FRAME_MS;
        assert_eq!(plain.update(elapsed).tick, subdivided.update(elapsed).tick);
    }
    // 8000ms at 129 bpm is 17.2 beats, the first at a quarter period
    assert_eq!(subdivided.clock().tick, 17);
}

#[test]
fn first_frame_uploads_everything_then_nothing_while_idle() {
    let config = VisualiserConfig::default();
    let scene = SceneState::new(Vec3::new(0.0, 100.0, -200.0), Vec3::ZERO, 800, 600);
    let timeline = Timeline::new(DirtyGuard::Diffed).with_segment(Segment::while_in_range(
        "hold",
        0,
        3,
        |_, _, _| {},
    ));
    let mut state = VisualiserState::new(config, timeline, scene);
    let mut backend = RecordingBackend::new();

    match state.update(0.0, &mut backend).unwrap() {
        FrameOutcome::Rendered { uploads, .. } => assert_eq!(uploads.count(), 3),
        other => panic!("unexpected outcome {:?}", other),
    }
    for frame in 1..50 {
        match state.update(frame as f64 * FRAME_MS, &mut backend).unwrap() {
            FrameOutcome::Rendered { uploads, .. } => assert!(!uploads.any()),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert_eq!(backend.uploads(), 3);
    assert_eq!(backend.draws, 50);
}

#[test]
fn segments_run_in_order_and_timeline_completes() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut timeline = Timeline::new(DirtyGuard::Explicit);
    for (name, start, end) in [("a", 0, 5), ("b", 6, 10), ("c", 11, 11)] {
        let seen = Rc::clone(&seen);
        timeline.push(Segment::while_in_range(name, start, end, move |clock, _, _| {
            let mut seen = seen.borrow_mut();
            if seen.last() != Some(&(name, clock.tick)) {
                seen.push((name, clock.tick));
            }
        }));
    }

    let config = VisualiserConfig::default();
    let scene = SceneState::new(Vec3::new(0.0, 100.0, -200.0), Vec3::ZERO, 800, 600);
    let mut state = VisualiserState::new(config, timeline, scene);
    let mut backend = RecordingBackend::new();
    let clock = SteppedClock::new(FRAME_MS);

    while state.update(clock.elapsed_ms(), &mut backend).unwrap() != FrameOutcome::Complete {
        clock.tick();
        assert!(clock.elapsed_ms() < 60_000.0, "timeline never completed");
    }

    assert_eq!(state.clock().tick, 12);
    let seen = seen.borrow();
    assert_eq!(seen.len(), 12);
    for (tick, (name, at)) in seen.iter().enumerate() {
        assert_eq!(*at, tick as u32);
        let expected = match tick {
            0..=5 => "a",
            6..=10 => "b",
            _ => "c",
        };
        assert_eq!(*name, expected);
    }
}

#[test]
fn bundled_show_plays_to_completion() {
    let config = VisualiserConfig::default();
    let mut state = VisualiserState::with_demo(config.clone());
    let mut backend = RecordingBackend::new();
    let clock = SteppedClock::new(config.frame_step_ms());

    loop {
        match state.update(clock.elapsed_ms(), &mut backend).unwrap() {
            FrameOutcome::Rendered { .. } => {}
            FrameOutcome::Complete => break,
        }
        clock.tick();
        assert!(clock.elapsed_ms() < 120_000.0, "show never completed");
    }

    let last_tick = choreography::demo_timeline(config.tempo(), config.dirty_guard)
        .last_tick()
        .unwrap();
    assert_eq!(state.clock().tick, last_tick + 1);
    assert_eq!(backend.draws as u64, state.frames());

    // The camera moves on most frames; beat-only segments leave it alone
    assert!(backend.camera_uploads > backend.draws / 2);
    assert!(backend.camera_uploads < backend.draws);
    assert!(backend.object_uploads > 1);
    assert!(backend.object_uploads <= backend.draws);

    let objects = backend.objects.unwrap();
    assert_eq!(objects.count as usize, state.scene().spheres.len());
}

#[test]
fn double_speed_finishes_in_half_the_frames() {
    let run = |speed: f64| {
        let config = VisualiserConfig {
            playback_speed: speed,
            ..Default::default()
        };
        let mut state = VisualiserState::with_demo(config.clone());
        let mut backend = RecordingBackend::new();
        let clock = SteppedClock::new(config.frame_step_ms());
        while state.update(clock.elapsed_ms(), &mut backend).unwrap() != FrameOutcome::Complete {
            clock.tick();
        }
        state.frames()
    };

    let normal = run(1.0);
    let fast = run(2.0);
    assert!(fast * 2 >= normal - 2 && fast * 2 <= normal + 2, "{} vs {}", fast, normal);
}
