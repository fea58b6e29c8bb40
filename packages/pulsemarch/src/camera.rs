//! Look-at camera and its orthonormal frame.
//!
//! The timeline only authors `origin` and `target`. Everything the ray
//! tracer needs (forward/up/right basis and focal length) is derived here.
//!
//! Basis construction picks its auxiliary axis from the shape of the view
//! direction, so looking straight up or down never produces a zero-length
//! cross product.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Vertical field of view in degrees, shared with the ray generation shader.
pub const FOV_Y_DEGREES: f32 = 45.0;

/// Sign applied to the focal length.
///
/// The bundled shader builds primary rays as `focal * normal + x * u + y * v`
/// and expects a positive focal length (rays leave through the image plane
/// in front of the camera). Changing this requires changing the shader too.
pub const FOCAL_SIGN: f32 = 1.0;

/// Closest the camera may sit to its target before the view direction
/// is considered undefined.
const MIN_LOOK_DISTANCE: f32 = 1e-6;

/// Orthonormal camera basis plus focal length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraFrame {
    pub forward: Vec3,
    pub up: Vec3,
    pub right: Vec3,
    pub focal_length: f32,
}

/// Focal length in pixels for a viewport `viewport_width` pixels wide.
pub fn focal_length(viewport_width: u32) -> f32 {
    let half_fov = (FOV_Y_DEGREES * 0.5).to_radians();
    FOCAL_SIGN * viewport_width as f32 / (2.0 * half_fov.tan())
}

/// Build the camera basis looking from `origin` towards `target`.
///
/// Panics if `origin` and `target` coincide.
pub fn build_camera_frame(origin: Vec3, target: Vec3, viewport_width: u32) -> CameraFrame {
    let view = target - origin;
    assert!(
        view.length() > MIN_LOOK_DISTANCE,
        "camera origin {:?} and target {:?} coincide, view direction is undefined",
        origin,
        target
    );

    let forward = view.normalize();

    // Equivalent to |forward.y / forward.z| > 1 without dividing by zero.
    let (up, right) = if forward.y.abs() > forward.z.abs() {
        let right = Vec3::X.cross(forward).normalize();
        let up = forward.cross(right).normalize();
        (up, right)
    } else {
        let up = forward.cross(Vec3::Y).normalize();
        let right = up.cross(forward).normalize();
        (up, right)
    };

    // Re-derive forward from the other two to cancel drift
    let forward = right.cross(up).normalize();

    CameraFrame {
        forward,
        up,
        right,
        focal_length: focal_length(viewport_width),
    }
}

/// Authored look-at pair plus the frame derived from it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub origin: Vec3,
    pub target: Vec3,
    frame: CameraFrame,
}

impl Camera {
    /// Create a camera and derive its initial frame.
    pub fn new(origin: Vec3, target: Vec3, viewport_width: u32) -> Self {
        Self {
            origin,
            target,
            frame: build_camera_frame(origin, target, viewport_width),
        }
    }

    /// Point the camera at `target` from `origin`.
    ///
    /// The derived frame is stale until [`Camera::rebuild_frame`] runs.
    pub fn look_at(&mut self, origin: Vec3, target: Vec3) {
        self.origin = origin;
        self.target = target;
    }

    /// Recompute forward/up/right/focal from the current look-at pair.
    pub fn rebuild_frame(&mut self, viewport_width: u32) {
        self.frame = build_camera_frame(self.origin, self.target, viewport_width);
    }

    pub fn frame(&self) -> &CameraFrame {
        &self.frame
    }

    pub fn forward(&self) -> Vec3 {
        self.frame.forward
    }

    pub fn up(&self) -> Vec3 {
        self.frame.up
    }

    pub fn right(&self) -> Vec3 {
        self.frame.right
    }

    pub fn focal_length(&self) -> f32 {
        self.frame.focal_length
    }

    /// Pack the camera for the render backend.
    pub fn to_uniforms(&self, viewport_width: u32, viewport_height: u32) -> CameraUniforms {
        let f = &self.frame;
        CameraUniforms {
            origin: self.origin.extend(1.0).to_array(),
            normal: f.forward.extend(0.0).to_array(),
            u: f.up.extend(0.0).to_array(),
            v: f.right.extend(0.0).to_array(),
            resolution: [viewport_width as f32, viewport_height as f32],
            focal: f.focal_length,
            _padding: 0.0,
        }
    }
}

/// Camera uniforms as laid out in the ray tracing shader.
///
/// `normal` is the forward axis; `u` and `v` carry `up` and `right`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraUniforms {
    /// Camera position (w = 1).
    pub origin: [f32; 4],
    pub normal: [f32; 4],
    pub u: [f32; 4],
    pub v: [f32; 4],
    /// Viewport size in pixels.
    pub resolution: [f32; 2],
    pub focal: f32,
    pub _padding: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn assert_orthonormal(frame: &CameraFrame) {
        assert!((frame.forward.length() - 1.0).abs() < EPS);
        assert!((frame.up.length() - 1.0).abs() < EPS);
        assert!((frame.right.length() - 1.0).abs() < EPS);
        assert!(frame.forward.dot(frame.up).abs() < EPS);
        assert!(frame.forward.dot(frame.right).abs() < EPS);
        assert!(frame.up.dot(frame.right).abs() < EPS);
    }

    /// right x up points along forward for every frame.
    fn handedness(frame: &CameraFrame) -> f32 {
        frame.right.cross(frame.up).dot(frame.forward)
    }

    #[test]
    fn test_default_view_is_orthonormal() {
        let frame = build_camera_frame(Vec3::new(0.0, 100.0, -200.0), Vec3::ZERO, 800);
        assert_orthonormal(&frame);

        let expected = Vec3::new(0.0, -100.0, 200.0).normalize();
        assert!((frame.forward - expected).length() < EPS);
    }

    #[test]
    fn test_frame_is_deterministic() {
        let origin = Vec3::new(13.0, -7.5, 42.0);
        let target = Vec3::new(-3.0, 2.0, 0.5);
        let a = build_camera_frame(origin, target, 800);
        let b = build_camera_frame(origin, target, 800);
        assert_eq!(a, b);
    }

    #[test]
    fn test_looking_straight_down_uses_x_axis() {
        let frame = build_camera_frame(Vec3::new(0.0, 500.0, 0.0), Vec3::ZERO, 800);
        assert_orthonormal(&frame);
        assert!((frame.forward - Vec3::NEG_Y).length() < EPS);
        assert!(frame.right.y.abs() < EPS);
    }

    #[test]
    fn test_looking_along_x_axis() {
        // forward.y and forward.z are both zero here
        let frame = build_camera_frame(Vec3::new(-10.0, 0.0, 0.0), Vec3::ZERO, 800);
        assert_orthonormal(&frame);
        assert!((frame.forward - Vec3::X).length() < EPS);
    }

    #[test]
    fn test_handedness_is_stable_across_branch_switch() {
        // Sweep the view direction through |y| == |z| where the auxiliary axis changes
        let target = Vec3::ZERO;
        let mut previous_sign = None;
        for i in 0..=200 {
            let angle = (i as f32 / 200.0) * std::f32::consts::PI * 0.5;
            let origin = Vec3::new(3.0, 100.0 * angle.sin(), -100.0 * angle.cos() - 1.0);
            let frame = build_camera_frame(origin, target, 800);
            assert_orthonormal(&frame);
            let sign = handedness(&frame).signum();
            assert!(sign > 0.0);
            if let Some(prev) = previous_sign {
                assert_eq!(prev, sign);
            }
            previous_sign = Some(sign);
        }
    }

    #[test]
    fn test_focal_length_for_800px() {
        // tan(22.5°) = sqrt(2) - 1
        let expected = 800.0 / (2.0 * 0.414_213_56);
        assert!((focal_length(800) - expected).abs() < 1e-2);
        assert!(focal_length(800) > 0.0);
    }

    #[test]
    #[should_panic(expected = "coincide")]
    fn test_identical_origin_and_target_is_fatal() {
        build_camera_frame(Vec3::ONE, Vec3::ONE, 800);
    }

    #[test]
    fn test_look_at_then_rebuild() {
        let mut camera = Camera::new(Vec3::new(0.0, 100.0, -200.0), Vec3::ZERO, 800);
        let before = *camera.frame();
        camera.look_at(Vec3::new(200.0, 0.0, 0.0), Vec3::ZERO);
        assert_eq!(*camera.frame(), before);
        camera.rebuild_frame(800);
        assert!((camera.forward() - Vec3::NEG_X).length() < EPS);
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<CameraUniforms>(), 80);

        let camera = Camera::new(Vec3::new(0.0, 100.0, -200.0), Vec3::ZERO, 800);
        let uniforms = camera.to_uniforms(800, 600);
        assert_eq!(uniforms.origin, [0.0, 100.0, -200.0, 1.0]);
        assert_eq!(uniforms.resolution, [800.0, 600.0]);
        assert_eq!(uniforms.focal, camera.focal_length());
    }
}
