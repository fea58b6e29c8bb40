//! Pushes dirty scene categories to the render backend.
//!
//! The first flush after construction sends every category regardless of the
//! dirty flags, so the backend never draws with uninitialised uniforms. After
//! that only flagged categories are sent, and the flags are cleared once the
//! upload is done.

use crate::camera::CameraUniforms;
use crate::lighting::LightingUniforms;
use crate::scene_state::{ObjectUniforms, SceneState};

/// Destination for scene uniforms.
///
/// Implemented by the GPU renderer and by [`RecordingBackend`] for headless
/// runs.
pub trait RenderBackend {
    fn upload_camera(&mut self, uniforms: &CameraUniforms);
    fn upload_objects(&mut self, uniforms: &ObjectUniforms);
    fn upload_lights(&mut self, uniforms: &LightingUniforms);

    /// Draw one frame with the uniforms uploaded so far.
    fn draw(&mut self) -> anyhow::Result<()>;
}

/// Which categories a flush sent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub camera: bool,
    pub objects: bool,
    pub lights: bool,
}

impl UploadReport {
    pub fn any(&self) -> bool {
        self.camera || self.objects || self.lights
    }

    /// Number of categories sent.
    pub fn count(&self) -> usize {
        [self.camera, self.objects, self.lights]
            .iter()
            .filter(|sent| **sent)
            .count()
    }
}

/// Tracks the forced first upload.
#[derive(Debug)]
pub struct SceneUploader {
    first_frame: bool,
}

impl SceneUploader {
    pub fn new() -> Self {
        Self { first_frame: true }
    }

    /// True until the first flush.
    pub fn is_first_frame(&self) -> bool {
        self.first_frame
    }

    /// Send the next flush as if every category were dirty.
    pub fn force_full_upload(&mut self) {
        self.first_frame = true;
    }

    /// Upload the dirty categories of `scene` and clear its flags.
    pub fn flush(&mut self, scene: &mut SceneState, backend: &mut dyn RenderBackend) -> UploadReport {
        let force = std::mem::replace(&mut self.first_frame, false);
        let report = UploadReport {
            camera: force || scene.dirty.camera,
            objects: force || scene.dirty.objects,
            lights: force || scene.dirty.lights,
        };

        if report.camera {
            backend.upload_camera(&scene.camera_uniforms());
        }
        if report.objects {
            backend.upload_objects(&scene.object_uniforms());
        }
        if report.lights {
            backend.upload_lights(&scene.lighting_uniforms());
        }

        if force {
            log::debug!("uploaded full scene ({} spheres, {} lights)", scene.spheres.len(), scene.lights.len());
        } else if report.any() {
            log::trace!("uploaded {:?}", report);
        }

        scene.dirty.clear();
        report
    }
}

impl Default for SceneUploader {
    fn default() -> Self {
        Self::new()
    }
}

/// Backend that keeps the last uniforms and counts calls.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub camera: Option<CameraUniforms>,
    pub objects: Option<ObjectUniforms>,
    pub lights: Option<LightingUniforms>,
    pub camera_uploads: usize,
    pub object_uploads: usize,
    pub light_uploads: usize,
    pub draws: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total uploads across all categories.
    pub fn uploads(&self) -> usize {
        self.camera_uploads + self.object_uploads + self.light_uploads
    }
}

impl RenderBackend for RecordingBackend {
    fn upload_camera(&mut self, uniforms: &CameraUniforms) {
        self.camera = Some(*uniforms);
        self.camera_uploads += 1;
    }

    fn upload_objects(&mut self, uniforms: &ObjectUniforms) {
        self.objects = Some(*uniforms);
        self.object_uploads += 1;
    }

    fn upload_lights(&mut self, uniforms: &LightingUniforms) {
        self.lights = Some(*uniforms);
        self.light_uploads += 1;
    }

    fn draw(&mut self) -> anyhow::Result<()> {
        self.draws += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::Light;
    use glam::Vec3;

    fn scene() -> SceneState {
        let mut scene = SceneState::new(Vec3::new(0.0, 100.0, -200.0), Vec3::ZERO, 800, 600);
        scene.lights.push(Light::new(Vec3::new(0.0, 200.0, 0.0), 1.0));
        scene
    }

    #[test]
    fn test_first_flush_sends_everything() {
        let mut scene = scene();
        let mut uploader = SceneUploader::new();
        let mut backend = RecordingBackend::new();

        assert!(!scene.dirty.any());
        let report = uploader.flush(&mut scene, &mut backend);
        assert_eq!(report.count(), 3);
        assert_eq!(backend.uploads(), 3);
        assert_eq!(backend.lights.map(|l| l.count), Some(1));
        assert!(!uploader.is_first_frame());
    }

    #[test]
    fn test_clean_scene_sends_nothing() {
        let mut scene = scene();
        let mut uploader = SceneUploader::new();
        let mut backend = RecordingBackend::new();
        uploader.flush(&mut scene, &mut backend);

        for _ in 0..5 {
            assert!(!uploader.flush(&mut scene, &mut backend).any());
        }
        assert_eq!(backend.uploads(), 3);
    }

    #[test]
    fn test_only_dirty_categories_are_sent() {
        let mut scene = scene();
        let mut uploader = SceneUploader::new();
        let mut backend = RecordingBackend::new();
        uploader.flush(&mut scene, &mut backend);

        scene.ambient = 0.2;
        scene.dirty.lights = true;
        let report = uploader.flush(&mut scene, &mut backend);
        assert_eq!(
            report,
            UploadReport {
                camera: false,
                objects: false,
                lights: true
            }
        );
        assert_eq!(backend.light_uploads, 2);
        assert_eq!(backend.camera_uploads, 1);
        assert_eq!(backend.lights.map(|l| l.ambient), Some(0.2));
        assert!(!scene.dirty.any());
    }

    #[test]
    fn test_forced_upload_after_reset() {
        let mut scene = scene();
        let mut uploader = SceneUploader::new();
        let mut backend = RecordingBackend::new();
        uploader.flush(&mut scene, &mut backend);

        uploader.force_full_upload();
        assert_eq!(uploader.flush(&mut scene, &mut backend).count(), 3);
        assert_eq!(backend.uploads(), 6);
    }
}
