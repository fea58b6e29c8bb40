//! Sources of elapsed playback time.
//!
//! The engine never reads a clock directly; it asks a [`PlaybackClock`].
//! With music playing the clock follows the sink's reported position,
//! otherwise it follows the wall clock scaled by the playback speed. Offline rendering and tests use
//! a [`SteppedClock`] that only moves when told to.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Elapsed playback time in milliseconds.
pub trait PlaybackClock {
    fn elapsed_ms(&self) -> f64;
}

/// Wall-clock time since construction, multiplied by the playback speed.
#[derive(Clone, Copy, Debug)]
pub struct WallClock {
    start: Instant,
    speed: f64,
}

impl WallClock {
    /// Panics if `speed` is not strictly positive.
    pub fn new(speed: f64) -> Self {
        assert!(speed > 0.0, "playback speed must be positive, got {}", speed);
        Self {
            start: Instant::now(),
            speed,
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }
}

impl PlaybackClock for WallClock {
    fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0 * self.speed
    }
}

/// Manually advanced clock.
///
/// Interior mutability lets a caller holding only `&dyn PlaybackClock` (the
/// frame pacer's busy loop, for instance) still see the time move when the
/// owner advances it.
#[derive(Clone, Debug, Default)]
pub struct SteppedClock {
    now_ms: Cell<f64>,
    step_ms: f64,
}

impl SteppedClock {
    /// Clock at 0 that moves `step_ms` per [`tick`](Self::tick).
    pub fn new(step_ms: f64) -> Self {
        Self {
            now_ms: Cell::new(0.0),
            step_ms,
        }
    }

    pub fn step_ms(&self) -> f64 {
        self.step_ms
    }

    /// Advance by one step and return the new time.
    pub fn tick(&self) -> f64 {
        self.advance(self.step_ms)
    }

    /// Advance by `ms` and return the new time.
    pub fn advance(&self, ms: f64) -> f64 {
        let now = self.now_ms.get() + ms;
        self.now_ms.set(now);
        now
    }
}

impl PlaybackClock for SteppedClock {
    fn elapsed_ms(&self) -> f64 {
        self.now_ms.get()
    }
}

/// Position in the track, in milliseconds, from the time a sink has spent
/// playing it.
///
/// The sink counts output time, so a track sped up by 2 has covered twice
/// the reported duration.
#[cfg_attr(not(feature = "audio"), allow(dead_code))]
pub(crate) fn track_position_ms(played: Duration, speed: f64) -> f64 {
    played.as_secs_f64() * 1000.0 * speed
}

#[cfg(feature = "audio")]
pub use audio::AudioTrack;

#[cfg(feature = "audio")]
mod audio {
    use std::fs::File;
    use std::io::BufReader;
    use std::path::Path;

    use anyhow::Context;
    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

    use super::{track_position_ms, PlaybackClock};

    /// A music track playing on the default output device.
    ///
    /// Elapsed time is the sink's own playback position, so device latency
    /// and underruns hold the beat grid back together with the music.
    pub struct AudioTrack {
        // The stream must outlive the sink or playback stops
        _stream: OutputStream,
        _handle: OutputStreamHandle,
        sink: Sink,
        speed: f64,
    }

    impl AudioTrack {
        /// Decode `path` and start playing it at `speed`.
        pub fn play(path: &Path, speed: f64) -> anyhow::Result<Self> {
            let file = File::open(path)
                .with_context(|| format!("Failed to open music file {}", path.display()))?;
            let source = Decoder::new(BufReader::new(file))
                .with_context(|| format!("Failed to decode {}", path.display()))?;

            let (stream, handle) =
                OutputStream::try_default().context("No audio output device available")?;
            let sink = Sink::try_new(&handle).context("Failed to create audio sink")?;
            sink.set_speed(speed as f32);
            sink.append(source);

            log::info!("Playing {} at {}x", path.display(), speed);

            Ok(Self {
                _stream: stream,
                _handle: handle,
                sink,
                speed,
            })
        }

        /// True once the whole track has been played.
        pub fn finished(&self) -> bool {
            self.sink.empty()
        }

        pub fn stop(&self) {
            self.sink.stop();
        }
    }

    impl PlaybackClock for AudioTrack {
        fn elapsed_ms(&self) -> f64 {
            track_position_ms(self.sink.get_pos(), self.speed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stepped_clock() {
        let clock = SteppedClock::new(16.0);
        assert_eq!(clock.elapsed_ms(), 0.0);
        assert_eq!(clock.tick(), 16.0);
        assert_eq!(clock.advance(4.0), 20.0);
        assert_eq!(clock.elapsed_ms(), 20.0);
    }

    #[test]
    fn test_wall_clock_is_monotonic() {
        let clock = WallClock::new(2.0);
        let a = clock.elapsed_ms();
        let b = clock.elapsed_ms();
        assert!(a >= 0.0);
        assert!(b >= a);
    }

    #[test]
    fn test_track_position_follows_speed() {
        let played = Duration::from_millis(1500);
        assert_eq!(track_position_ms(played, 1.0), 1500.0);
        assert_eq!(track_position_ms(played, 2.0), 3000.0);
        assert_eq!(track_position_ms(Duration::ZERO, 0.5), 0.0);
    }

    #[test]
    #[should_panic(expected = "must be positive")]
    fn test_zero_speed_is_fatal() {
        WallClock::new(0.0);
    }
}
