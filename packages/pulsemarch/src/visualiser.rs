use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::choreography;
use crate::frame_pacer::PacingPolicy;
use crate::musical_time::{Tempo, TickDetector, TimelineClock, DEFAULT_BPM};
use crate::scene_state::SceneState;
use crate::timeline::{DirtyGuard, DispatchOutcome, Timeline};
use crate::uploader::{RenderBackend, SceneUploader, UploadReport};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisualiserConfig {
    pub bpm: f64,
    pub playback_speed: f64,
    pub target_fps: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub pacing: PacingPolicy,
    pub dirty_guard: DirtyGuard,
}

impl Default for VisualiserConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            playback_speed: 1.0,
            target_fps: 60,
            viewport_width: 800,
            viewport_height: 600,
            pacing: PacingPolicy::default(),
            dirty_guard: DirtyGuard::default(),
        }
    }
}

impl VisualiserConfig {
    /// Read a JSON config file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Reject values the engine would treat as contract violations.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.bpm.is_finite() && self.bpm > 0.0) {
            bail!("bpm must be a positive number, got {}", self.bpm);
        }
        if !(self.playback_speed.is_finite() && self.playback_speed > 0.0) {
            bail!("playbackSpeed must be a positive number, got {}", self.playback_speed);
        }
        if self.target_fps == 0 {
            bail!("targetFps must be at least 1");
        }
        if self.viewport_width == 0 || self.viewport_height == 0 {
            bail!(
                "viewport must not be empty, got {}x{}",
                self.viewport_width,
                self.viewport_height
            );
        }
        Ok(())
    }

    /// Beat tempo for tick detection and beat arithmetic. One cycle per beat.
    pub fn tempo(&self) -> Tempo {
        Tempo::new(self.bpm)
    }

    /// Playback time covered by one admitted frame at the target rate.
    pub fn frame_step_ms(&self) -> f64 {
        (1000 / self.target_fps) as f64 * self.playback_speed
    }
}

/// What one call to [`VisualiserState::update`] did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FrameOutcome {
    Rendered {
        clock: TimelineClock,
        uploads: UploadReport,
    },
    /// The timeline has run out; nothing was drawn.
    Complete,
}

/// Runs the beat-synchronised scene one admitted frame at a time.
pub struct VisualiserState {
    pub config: VisualiserConfig,
    detector: TickDetector,
    timeline: Timeline,
    scene: SceneState,
    uploader: SceneUploader,
    frames: u64,
    complete: bool,
}

impl VisualiserState {
    pub fn new(config: VisualiserConfig, timeline: Timeline, scene: SceneState) -> Self {
        Self {
            detector: TickDetector::new(config.tempo()),
            config,
            timeline,
            scene,
            uploader: SceneUploader::new(),
            frames: 0,
            complete: false,
        }
    }

    /// The bundled scene and timeline.
    pub fn with_demo(config: VisualiserConfig) -> Self {
        let scene = choreography::initial_scene(config.viewport_width, config.viewport_height);
        let timeline = choreography::demo_timeline(config.tempo(), config.dirty_guard);
        Self::new(config, timeline, scene)
    }

    pub fn clock(&self) -> &TimelineClock {
        self.detector.clock()
    }

    pub fn scene(&self) -> &SceneState {
        &self.scene
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Frames drawn so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Follow a viewport resize. The camera is re-uploaded on the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.viewport_width = width;
        self.config.viewport_height = height;
        self.scene.set_viewport(width, height);
    }

    /// Advance to `elapsed_ms` and draw one frame.
    ///
    /// Order within a frame: tick detection, timeline dispatch, camera frame
    /// rebuild, dirty uploads, draw. Once the timeline completes every later
    /// call returns [`FrameOutcome::Complete`] without touching the backend.
    pub fn update(&mut self, elapsed_ms: f64, backend: &mut dyn RenderBackend) -> anyhow::Result<FrameOutcome> {
        if self.complete {
            return Ok(FrameOutcome::Complete);
        }

        let clock = *self.detector.update(elapsed_ms);

        if self.timeline.dispatch(&clock, elapsed_ms, &mut self.scene) == DispatchOutcome::Complete {
            self.complete = true;
            return Ok(FrameOutcome::Complete);
        }

        self.scene.refresh_camera_frame();
        let uploads = self.uploader.flush(&mut self.scene, backend);
        backend.draw()?;
        self.frames += 1;

        Ok(FrameOutcome::Rendered { clock, uploads })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::Segment;
    use crate::uploader::RecordingBackend;
    use glam::Vec3;

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: VisualiserConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, VisualiserConfig::default());
        assert_eq!(config.bpm, 129.0);
        assert_eq!(config.pacing, PacingPolicy::Sleep);
        assert_eq!(config.dirty_guard, DirtyGuard::Diffed);
    }

    #[test]
    fn test_config_camel_case_fields() {
        let json = r#"{ "bpm": 90, "playbackSpeed": 2.0, "targetFps": 30, "pacing": "busy", "dirtyGuard": "explicit" }"#;
        let config: VisualiserConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.bpm, 90.0);
        assert_eq!(config.playback_speed, 2.0);
        assert_eq!(config.target_fps, 30);
        assert_eq!(config.pacing, PacingPolicy::Busy);
        assert_eq!(config.dirty_guard, DirtyGuard::Explicit);
        assert_eq!(config.viewport_width, 800);
    }

    #[test]
    fn test_validate() {
        assert!(VisualiserConfig::default().validate().is_ok());

        let bad = [
            VisualiserConfig { bpm: 0.0, ..Default::default() },
            VisualiserConfig { bpm: f64::NAN, ..Default::default() },
            VisualiserConfig { playback_speed: 0.0, ..Default::default() },
            VisualiserConfig { target_fps: 0, ..Default::default() },
            VisualiserConfig { viewport_height: 0, ..Default::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }

    #[test]
    fn test_one_tick_per_beat_whatever_the_config_file_says() {
        // Older config files may still carry a subdivision; it has no effect
        let config: VisualiserConfig = serde_json::from_str(r#"{ "subdivision": 2.0 }"#).unwrap();
        let scene = SceneState::new(Vec3::new(0.0, 100.0, -200.0), Vec3::ZERO, 800, 600);
        let timeline = Timeline::new(DirtyGuard::Diffed)
            .with_segment(Segment::while_in_range("hold", 0, 10, |_, _, _| {}));
        let mut state = VisualiserState::new(config, timeline, scene);
        let mut backend = RecordingBackend::new();

        let mut elapsed = 0.0;
        while elapsed <= 465.0 {
            state.update(elapsed, &mut backend).unwrap();
            elapsed += 16.0;
        }
        assert_eq!(state.clock().tick, 1);
    }

    #[test]
    fn test_frame_step() {
        assert_eq!(VisualiserConfig::default().frame_step_ms(), 16.0);
        let fast = VisualiserConfig { playback_speed: 2.0, ..Default::default() };
        assert_eq!(fast.frame_step_ms(), 32.0);
    }

    fn short_state() -> VisualiserState {
        let config = VisualiserConfig::default();
        let scene = SceneState::new(Vec3::new(0.0, 100.0, -200.0), Vec3::ZERO, 800, 600);
        let timeline = Timeline::new(DirtyGuard::Explicit).with_segment(Segment::while_in_range(
            "drift",
            0,
            1,
            |_, elapsed_ms, scene| {
                scene.move_camera(Vec3::new(0.0, 100.0, -200.0 - elapsed_ms as f32), Vec3::ZERO);
            },
        ));
        VisualiserState::new(config, timeline, scene)
    }

    #[test]
    fn test_update_draws_until_complete() {
        let mut state = short_state();
        let mut backend = RecordingBackend::new();

        let mut elapsed = 0.0;
        let mut rendered = 0;
        loop {
            match state.update(elapsed, &mut backend).unwrap() {
                FrameOutcome::Rendered { .. } => rendered += 1,
                FrameOutcome::Complete => break,
            }
            elapsed += 16.0;
            assert!(elapsed < 10_000.0, "timeline never completed");
        }

        assert!(state.is_complete());
        assert_eq!(backend.draws, rendered);
        assert_eq!(state.frames(), rendered as u64);
        assert_eq!(state.clock().tick, 2);

        // Terminal: further updates do nothing
        assert_eq!(state.update(elapsed + 16.0, &mut backend).unwrap(), FrameOutcome::Complete);
        assert_eq!(backend.draws, rendered);
    }

    #[test]
    fn test_camera_uploaded_with_fresh_frame() {
        let mut state = short_state();
        let mut backend = RecordingBackend::new();
        state.update(0.0, &mut backend).unwrap();
        state.update(16.0, &mut backend).unwrap();

        let expected = state.scene().camera_uniforms();
        assert_eq!(backend.camera, Some(expected));
        assert_eq!(expected.origin[2], -216.0);
        assert_eq!(backend.camera_uploads, 2);
        assert_eq!(backend.object_uploads, 1);
    }

    #[test]
    fn test_resize_reuploads_camera() {
        let mut state = short_state();
        let mut backend = RecordingBackend::new();
        state.update(0.0, &mut backend).unwrap();
        state.resize(1280, 720);
        match state.update(16.0, &mut backend).unwrap() {
            FrameOutcome::Rendered { uploads, .. } => assert!(uploads.camera),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(backend.camera.map(|c| c.resolution), Some([1280.0, 720.0]));
    }
}
