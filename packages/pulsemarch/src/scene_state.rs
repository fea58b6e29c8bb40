//! Authoritative scene state: spheres, lights, camera, and dirty flags.
//!
//! Spheres and lights live in fixed-capacity slot arrays. A slot's index is
//! its identity; timeline actions overwrite slots and grow or shrink the
//! active count, nothing is ever freed. Going past capacity means a scene
//! was authored beyond what the shader can hold and is treated as a bug.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::camera::{Camera, CameraUniforms};
use crate::lighting::{Light, LightingUniforms, DEFAULT_AMBIENT, MAX_LIGHTS};
use crate::material::SurfaceMaterial;

/// Maximum number of spheres the shader accepts.
pub const MAX_SPHERES: usize = 100;

// ============================================================================
// Slot arrays
// ============================================================================

/// Fixed-capacity ordered sequence with an active prefix.
///
/// Slots past the active count keep their contents, so shrinking and
/// growing again brings old entries back unless they were overwritten.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotArray<T, const N: usize> {
    slots: [T; N],
    active: usize,
}

impl<T: Copy + Default, const N: usize> SlotArray<T, N> {
    pub fn new() -> Self {
        Self {
            slots: [T::default(); N],
            active: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Number of active slots.
    pub fn len(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// The active slots.
    pub fn active(&self) -> &[T] {
        &self.slots[..self.active]
    }

    pub fn active_mut(&mut self) -> &mut [T] {
        &mut self.slots[..self.active]
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.active().get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.active_mut().get_mut(index)
    }

    /// Overwrite slot `index`, which may lie past the active count.
    ///
    /// Panics if `index` is outside the capacity.
    pub fn set(&mut self, index: usize, value: T) {
        assert!(index < N, "slot {} is outside the capacity of {}", index, N);
        self.slots[index] = value;
    }

    /// Write `value` into the first inactive slot and activate it.
    ///
    /// Panics when every slot is already active.
    pub fn push(&mut self, value: T) -> usize {
        assert!(self.active < N, "all {} slots are already active", N);
        let index = self.active;
        self.slots[index] = value;
        self.active += 1;
        index
    }

    /// Change the number of active slots.
    ///
    /// Panics if `count` exceeds the capacity.
    pub fn set_len(&mut self, count: usize) {
        assert!(count <= N, "active count {} exceeds the capacity of {}", count, N);
        self.active = count;
    }

    /// Replace the active slots with `values`.
    pub fn replace_all(&mut self, values: &[T]) {
        self.set_len(values.len());
        self.slots[..values.len()].copy_from_slice(values);
    }
}

impl<T: Copy + Default, const N: usize> Default for SlotArray<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Spheres
// ============================================================================

/// A shaded sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
    pub color: Vec3,
    pub material: SurfaceMaterial,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32, color: Vec3, material: SurfaceMaterial) -> Self {
        Self {
            center,
            radius,
            color,
            material,
        }
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 1.0, Vec3::ONE, SurfaceMaterial::default())
    }
}

pub type SphereSlots = SlotArray<Sphere, MAX_SPHERES>;
pub type LightSlots = SlotArray<Light, MAX_LIGHTS>;

/// GPU-ready object uniforms.
///
/// `colors` and `attr` are vec3 data padded to vec4 for uniform array stride.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectUniforms {
    /// Number of active spheres (`objNb`).
    pub count: u32,
    pub _padding: [u32; 3],
    /// Center and radius (`spheres`).
    pub spheres: [[f32; 4]; MAX_SPHERES],
    pub colors: [[f32; 4]; MAX_SPHERES],
    /// Diffuse, specular, shininess (`attr`).
    pub attr: [[f32; 4]; MAX_SPHERES],
}

impl ObjectUniforms {
    pub fn pack(spheres: &[Sphere]) -> Self {
        assert!(
            spheres.len() <= MAX_SPHERES,
            "{} spheres exceed the capacity of {}",
            spheres.len(),
            MAX_SPHERES
        );

        let mut uniforms = Self::zeroed();
        uniforms.count = spheres.len() as u32;
        for (i, sphere) in spheres.iter().enumerate() {
            uniforms.spheres[i] = sphere.center.extend(sphere.radius).to_array();
            uniforms.colors[i] = sphere.color.extend(0.0).to_array();
            uniforms.attr[i] = sphere.material.to_array();
        }
        uniforms
    }
}

// ============================================================================
// Dirty flags
// ============================================================================

/// Categories that must be re-sent to the render backend this frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    pub camera: bool,
    pub objects: bool,
    pub lights: bool,
}

impl DirtyFlags {
    pub fn all() -> Self {
        Self {
            camera: true,
            objects: true,
            lights: true,
        }
    }

    pub fn any(&self) -> bool {
        self.camera || self.objects || self.lights
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// Scene state
// ============================================================================

/// Everything the renderer needs to draw one frame.
#[derive(Clone, Debug)]
pub struct SceneState {
    pub spheres: SphereSlots,
    pub lights: LightSlots,
    pub ambient: f32,
    pub camera: Camera,
    pub dirty: DirtyFlags,
    viewport: (u32, u32),
}

impl SceneState {
    /// Empty scene with the camera at `origin` looking at `target`.
    pub fn new(origin: Vec3, target: Vec3, viewport_width: u32, viewport_height: u32) -> Self {
        Self {
            spheres: SphereSlots::new(),
            lights: LightSlots::new(),
            ambient: DEFAULT_AMBIENT,
            camera: Camera::new(origin, target, viewport_width),
            dirty: DirtyFlags::default(),
            viewport: (viewport_width, viewport_height),
        }
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Change the viewport size. The focal length depends on the width,
    /// so the camera is marked dirty.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if self.viewport != (width, height) {
            self.viewport = (width, height);
            self.dirty.camera = true;
        }
    }

    /// Move the camera and mark it dirty.
    pub fn move_camera(&mut self, origin: Vec3, target: Vec3) {
        self.camera.look_at(origin, target);
        self.dirty.camera = true;
    }

    /// Put light `index` at the camera origin and mark lights dirty.
    ///
    /// Call after every camera move for lights that follow the camera.
    pub fn attach_light_to_camera(&mut self, index: usize) {
        let origin = self.camera.origin;
        match self.lights.get_mut(index) {
            Some(light) => light.position = origin,
            None => panic!(
                "light {} is not active ({} active lights)",
                index,
                self.lights.len()
            ),
        }
        self.dirty.lights = true;
    }

    /// Rebuild the camera frame if the camera is dirty.
    ///
    /// Returns true if the frame was rebuilt.
    pub fn refresh_camera_frame(&mut self) -> bool {
        if self.dirty.camera {
            self.camera.rebuild_frame(self.viewport.0);
            true
        } else {
            false
        }
    }

    pub fn camera_uniforms(&self) -> CameraUniforms {
        self.camera.to_uniforms(self.viewport.0, self.viewport.1)
    }

    pub fn object_uniforms(&self) -> ObjectUniforms {
        ObjectUniforms::pack(self.spheres.active())
    }

    pub fn lighting_uniforms(&self) -> LightingUniforms {
        LightingUniforms::pack(self.ambient, self.lights.active())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> SceneState {
        SceneState::new(Vec3::new(0.0, 100.0, -200.0), Vec3::ZERO, 800, 600)
    }

    #[test]
    fn test_slots_push_and_shrink() {
        let mut slots: SlotArray<u32, 4> = SlotArray::new();
        assert!(slots.is_empty());
        assert_eq!(slots.push(7), 0);
        assert_eq!(slots.push(8), 1);
        assert_eq!(slots.active(), &[7, 8]);

        slots.set_len(1);
        assert_eq!(slots.active(), &[7]);
        assert_eq!(slots.get(1), None);

        // Growing again brings the old slot back
        slots.set_len(2);
        assert_eq!(slots.active(), &[7, 8]);
    }

    #[test]
    fn test_slots_set_past_active() {
        let mut slots: SlotArray<u32, 4> = SlotArray::new();
        slots.set(3, 9);
        assert_eq!(slots.len(), 0);
        slots.set_len(4);
        assert_eq!(slots.active(), &[0, 0, 0, 9]);
    }

    #[test]
    #[should_panic(expected = "already active")]
    fn test_slots_overflow_is_fatal() {
        let mut slots: SlotArray<u32, 2> = SlotArray::new();
        slots.push(1);
        slots.push(2);
        slots.push(3);
    }

    #[test]
    #[should_panic(expected = "exceeds the capacity")]
    fn test_sphere_count_overflow_is_fatal() {
        let mut scene = scene();
        scene.spheres.set_len(MAX_SPHERES + 1);
    }

    #[test]
    fn test_new_scene_is_clean() {
        let scene = scene();
        assert!(!scene.dirty.any());
        assert_eq!(scene.spheres.capacity(), 100);
        assert_eq!(scene.lights.capacity(), 10);
    }

    #[test]
    fn test_move_camera_flags_only_camera() {
        let mut scene = scene();
        scene.move_camera(Vec3::new(0.0, 100.0, -300.0), Vec3::ZERO);
        assert_eq!(
            scene.dirty,
            DirtyFlags {
                camera: true,
                objects: false,
                lights: false
            }
        );
    }

    #[test]
    fn test_light_follows_camera() {
        let mut scene = scene();
        scene.lights.push(Light::new(Vec3::new(0.0, 200.0, 0.0), 1.0));
        scene.move_camera(Vec3::new(10.0, 20.0, 30.0), Vec3::ZERO);
        scene.attach_light_to_camera(0);
        assert_eq!(scene.lights.active()[0].position, Vec3::new(10.0, 20.0, 30.0));
        assert!(scene.dirty.camera && scene.dirty.lights);
    }

    #[test]
    fn test_refresh_only_when_dirty() {
        let mut scene = scene();
        scene.camera.look_at(Vec3::new(300.0, 0.0, 0.0), Vec3::ZERO);
        assert!(!scene.refresh_camera_frame());

        scene.dirty.camera = true;
        assert!(scene.refresh_camera_frame());
        assert!((scene.camera.forward() - Vec3::NEG_X).length() < 1e-5);
    }

    #[test]
    fn test_resize_marks_camera() {
        let mut scene = scene();
        scene.set_viewport(800, 600);
        assert!(!scene.dirty.camera);
        scene.set_viewport(1024, 768);
        assert!(scene.dirty.camera);
        assert_eq!(scene.camera_uniforms().resolution, [1024.0, 768.0]);
    }

    #[test]
    fn test_object_uniforms() {
        let mut scene = scene();
        scene.spheres.push(Sphere::new(
            Vec3::new(-100.0, 0.0, 0.0),
            60.0,
            Vec3::new(0.0, 1.0, 0.0),
            SurfaceMaterial::SATIN,
        ));
        let uniforms = scene.object_uniforms();
        assert_eq!(std::mem::size_of::<ObjectUniforms>(), 16 + 3 * 16 * MAX_SPHERES);
        assert_eq!(uniforms.count, 1);
        assert_eq!(uniforms.spheres[0], [-100.0, 0.0, 0.0, 60.0]);
        assert_eq!(uniforms.colors[0], [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(uniforms.attr[0], [0.5, 0.5, 8.0, 0.0]);
    }
}
