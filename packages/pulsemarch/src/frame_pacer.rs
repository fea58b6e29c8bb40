//! Target-rate admission gate for the main loop.
//!
//! A frame is admitted once at least `1000 / fps` whole milliseconds have
//! passed since the previous admitted frame. Between admissions the loop
//! either spins or sleeps, depending on the [`PacingPolicy`].
//!
//! The pacer runs on unscaled wall time. Playback speed changes how far the
//! music moves per frame, never how many frames are drawn per second.

use std::time::Duration;

use serde::Deserialize;

use crate::playback::PlaybackClock;

/// How the loop waits between admitted frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PacingPolicy {
    /// Poll the clock continuously.
    Busy,
    /// Sleep until the next frame is due.
    #[default]
    Sleep,
}

/// Admission gate.
#[derive(Clone, Debug)]
pub struct FramePacer {
    interval_ms: u64,
    policy: PacingPolicy,
    last_admitted: Option<f64>,
    admitted: u64,
}

impl FramePacer {
    /// Panics if `target_fps` is zero.
    pub fn new(target_fps: u32, policy: PacingPolicy) -> Self {
        assert!(target_fps > 0, "target fps must be positive");
        Self {
            interval_ms: 1000 / target_fps as u64,
            policy,
            last_admitted: None,
            admitted: 0,
        }
    }

    /// Minimum time between admitted frames.
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn policy(&self) -> PacingPolicy {
        self.policy
    }

    /// Number of frames admitted so far.
    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    /// Timestamp of the last admitted frame.
    pub fn last_admitted(&self) -> Option<f64> {
        self.last_admitted
    }

    /// Admit a frame at `now_ms` if the interval has passed.
    ///
    /// The first call always admits. A clock that goes backwards never
    /// admits until it catches up again.
    pub fn admit(&mut self, now_ms: f64) -> bool {
        let due = match self.last_admitted {
            None => true,
            Some(last) => now_ms - last >= self.interval_ms as f64,
        };
        if due {
            self.last_admitted = Some(now_ms);
            self.admitted += 1;
        }
        due
    }

    /// Time left until the next frame is due, zero if it is due now.
    pub fn time_until_due(&self, now_ms: f64) -> Duration {
        match self.last_admitted {
            None => Duration::ZERO,
            Some(last) => {
                let remaining = last + self.interval_ms as f64 - now_ms;
                Duration::from_secs_f64(remaining.max(0.0) / 1000.0)
            }
        }
    }

    /// Block until a frame is admitted and return its wall-clock timestamp.
    ///
    /// `wall_clock` must run at real time (`WallClock::new(1.0)`), otherwise
    /// the target rate is scaled along with it.
    pub fn wait_for_frame(&mut self, wall_clock: &dyn PlaybackClock) -> f64 {
        loop {
            let now = wall_clock.elapsed_ms();
            if self.admit(now) {
                return now;
            }
            match self.policy {
                PacingPolicy::Busy => std::hint::spin_loop(),
                PacingPolicy::Sleep => {
                    let nap = self.time_until_due(now);
                    if nap.is_zero() {
                        std::thread::yield_now();
                    } else {
                        std::thread::sleep(nap);
                    }
                }
            }
        }
    }
}
