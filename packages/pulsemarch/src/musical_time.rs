//! Beat-locked time: the periodic beat signal and the tick detector.
//!
//! Elapsed playback time is turned into a smooth oscillation with one cycle
//! per beat subdivision. The [`TickDetector`] watches that oscillation and
//! counts its falling zero-crossings, producing the discrete beat tick the
//! timeline is keyed on.

use std::f64::consts::TAU;

/// Default tempo of the bundled track.
pub const DEFAULT_BPM: f64 = 129.0;

/// Milliseconds in one minute.
const MS_PER_MINUTE: f64 = 60_000.0;

/// Tempo parameters for the periodic beat signal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tempo {
    /// Tempo in beats per minute.
    pub bpm: f64,

    /// Number of signal cycles per beat (1 = one cycle per beat).
    pub subdivision: f64,
}

impl Tempo {
    /// Create a tempo with one cycle per beat.
    ///
    /// Panics if `bpm` is not strictly positive.
    pub fn new(bpm: f64) -> Self {
        Self::with_subdivision(bpm, 1.0)
    }

    /// Create a tempo with `subdivision` cycles per beat.
    ///
    /// Panics if `bpm` or `subdivision` is not strictly positive.
    pub fn with_subdivision(bpm: f64, subdivision: f64) -> Self {
        assert!(bpm > 0.0, "tempo requires a positive bpm, got {}", bpm);
        assert!(
            subdivision > 0.0,
            "tempo requires a positive subdivision, got {}",
            subdivision
        );
        Self { bpm, subdivision }
    }

    /// Length of one signal cycle in milliseconds.
    pub fn period_ms(&self) -> f64 {
        period_ms(self.bpm, self.subdivision)
    }

    /// Sample the periodic signal at `elapsed_ms`.
    pub fn signal_at(&self, elapsed_ms: f64) -> f64 {
        periodic_signal(elapsed_ms, self.bpm, self.subdivision)
    }

    /// Convert a duration in beats to milliseconds.
    pub fn beats_to_ms(&self, beats: f64) -> f64 {
        beats * MS_PER_MINUTE / self.bpm
    }

    /// Convert a duration in milliseconds to beats.
    pub fn ms_to_beats(&self, ms: f64) -> f64 {
        ms * self.bpm / MS_PER_MINUTE
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

/// Length of one cycle of the periodic signal in milliseconds.
pub fn period_ms(bpm: f64, subdivision: f64) -> f64 {
    MS_PER_MINUTE / (bpm * subdivision)
}

/// Normalized beat oscillation: `0.5 * cos(2π * elapsed / period) + 0.5`.
///
/// The angle is reduced modulo the period first, so the result stays exact
/// for very long sessions instead of feeding huge arguments to `cos`.
///
/// Panics if `bpm` or `subdivision` is not strictly positive.
pub fn periodic_signal(elapsed_ms: f64, bpm: f64, subdivision: f64) -> f64 {
    assert!(bpm > 0.0, "periodic signal requires a positive bpm, got {}", bpm);
    assert!(
        subdivision > 0.0,
        "periodic signal requires a positive subdivision, got {}",
        subdivision
    );

    let period = period_ms(bpm, subdivision);
    let cycle_fraction = elapsed_ms.rem_euclid(period) / period;
    let value = 0.5 * (TAU * cycle_fraction).cos() + 0.5;
    value.clamp(0.0, 1.0)
}

/// Beat clock state, advanced once per admitted frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimelineClock {
    /// Number of beats detected so far. Never decreases.
    pub tick: u32,

    /// True only on the frame where `tick` was incremented.
    pub on_tick: bool,

    /// Centered signal value for this frame, in `[-0.5, 0.5]`.
    pub phase: f64,

    /// Centered signal value of the previous frame.
    pub previous_phase: f64,

    /// Elapsed playback time sampled for this frame.
    pub elapsed_ms: f64,
}

impl TimelineClock {
    /// Clock positioned at `tick`, with the edge flag set as given.
    ///
    /// Handy for driving a timeline directly without a detector.
    pub fn at_tick(tick: u32, on_tick: bool) -> Self {
        Self {
            tick,
            on_tick,
            ..Default::default()
        }
    }
}

/// Counts falling zero-crossings of the centered beat signal.
///
/// The detector always samples one cycle per beat, so a tempo's
/// subdivision never changes the tick rate. A crossing is only seen when two consecutive samples straddle it, so
/// frames admitted less often than twice per cycle can skip a beat.
#[derive(Clone, Debug)]
pub struct TickDetector {
    tempo: Tempo,
    clock: TimelineClock,
}

impl TickDetector {
    pub fn new(tempo: Tempo) -> Self {
        Self {
            tempo,
            // previous_phase starts at 0.0, which can never satisfy `> 0`
            clock: TimelineClock::default(),
        }
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn clock(&self) -> &TimelineClock {
        &self.clock
    }

    /// Sample the signal at `elapsed_ms` and update the tick and edge flag.
    pub fn update(&mut self, elapsed_ms: f64) -> &TimelineClock {
        let centered = periodic_signal(elapsed_ms, self.tempo.bpm, 1.0) - 0.5;
        let previous = self.clock.phase;

        let on_tick = previous > 0.0 && centered < 0.0;
        if on_tick {
            self.clock.tick += 1;
            log::debug!("tick {} at {:.1}ms", self.clock.tick, elapsed_ms);
        }

        self.clock.on_tick = on_tick;
        self.clock.previous_phase = previous;
        self.clock.phase = centered;
        self.clock.elapsed_ms = elapsed_ms;

        &self.clock
    }

    /// Return to tick 0 with no pending edge.
    pub fn reset(&mut self) {
        self.clock = TimelineClock::default();
    }
}
