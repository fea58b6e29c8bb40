//! Performance profiling for the render loop.
//!
//! This module provides:
//! - A runtime toggle, off by default
//! - `timed()` for measuring a closure
//! - [`FrameStats`], which reports effective frame rate and average draw
//!   time every [`REPORT_INTERVAL`] frames
//!
//! Everything is a no-op unless enabled with `set_profiling_enabled(true)`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Global flag to enable/disable performance profiling.
static PROFILING_ENABLED: AtomicBool = AtomicBool::new(false);

/// How often to report frame statistics (every N frames).
pub const REPORT_INTERVAL: u64 = 300; // ~5 seconds at 60fps

/// Check if profiling is currently enabled.
pub fn is_profiling_enabled() -> bool {
    PROFILING_ENABLED.load(Ordering::Relaxed)
}

/// Enable or disable performance profiling.
pub fn set_profiling_enabled(enabled: bool) {
    PROFILING_ENABLED.store(enabled, Ordering::Relaxed);
    if enabled {
        log::info!("Performance profiling ENABLED");
    } else {
        log::info!("Performance profiling DISABLED");
    }
}

/// Execute a closure and return its result with the time it took in ms.
/// The time is zero when profiling is disabled.
pub fn timed<T, F: FnOnce() -> T>(label: &str, f: F) -> (T, f64) {
    if is_profiling_enabled() {
        let start = Instant::now();
        let result = f();
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        log::trace!("[PERF] {}: {:.2}ms", label, elapsed_ms);
        (result, elapsed_ms)
    } else {
        (f(), 0.0)
    }
}

/// One periodic report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameReport {
    /// Frames counted since the loop started.
    pub frame: u64,
    /// Admitted frames per second of wall time over the window.
    pub fps: f64,
    /// Mean draw time over the window.
    pub mean_draw_ms: f64,
}

/// Rolling frame statistics.
#[derive(Debug, Default)]
pub struct FrameStats {
    frames: u64,
    window_start_ms: Option<f64>,
    window_draw_ms: f64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Count a frame admitted at `now_ms` whose draw took `draw_ms`.
    ///
    /// Every [`REPORT_INTERVAL`] frames the window is closed, logged when
    /// profiling is enabled, and returned.
    pub fn record(&mut self, now_ms: f64, draw_ms: f64) -> Option<FrameReport> {
        self.frames += 1;
        let start = *self.window_start_ms.get_or_insert(now_ms);
        self.window_draw_ms += draw_ms;

        if self.frames % REPORT_INTERVAL != 0 {
            return None;
        }

        let span_ms = now_ms - start;
        let report = FrameReport {
            frame: self.frames,
            // The first frame of a window opens it, so it spans N-1 intervals
            fps: if span_ms > 0.0 {
                (REPORT_INTERVAL - 1) as f64 * 1000.0 / span_ms
            } else {
                0.0
            },
            mean_draw_ms: self.window_draw_ms / REPORT_INTERVAL as f64,
        };
        self.window_start_ms = None;
        self.window_draw_ms = 0.0;

        if is_profiling_enabled() {
            log::info!(
                "[PERF] Frame {}: {:.1} fps, draw {:.2}ms",
                report.frame,
                report.fps,
                report.mean_draw_ms
            );
        }
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_every_interval() {
        let mut stats = FrameStats::new();
        let mut reports = Vec::new();
        for i in 0..(2 * REPORT_INTERVAL) {
            if let Some(report) = stats.record(i as f64 * 16.0, 2.0) {
                reports.push(report);
            }
        }
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].frame, REPORT_INTERVAL);
        assert!((reports[0].fps - 62.5).abs() < 1e-9);
        assert!((reports[1].mean_draw_ms - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_timed_returns_result() {
        let (value, _) = timed("add", || 2 + 2);
        assert_eq!(value, 4);
    }
}
