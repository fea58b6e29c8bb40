//! Point lights and the ambient term.
//!
//! Lighting is a flat list of point lights (position + intensity) plus one
//! ambient level. Both are uploaded together as the `lights` category.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Maximum number of point lights the shader accepts.
pub const MAX_LIGHTS: usize = 10;

/// Default ambient light level.
pub const DEFAULT_AMBIENT: f32 = 0.5;

/// A point light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub intensity: f32,
}

impl Light {
    pub fn new(position: Vec3, intensity: f32) -> Self {
        Self {
            position,
            intensity,
        }
    }

    /// Packed as `(x, y, z, intensity)`.
    pub fn to_array(&self) -> [f32; 4] {
        self.position.extend(self.intensity).to_array()
    }
}

impl Default for Light {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 1.0)
    }
}

/// GPU-ready lighting uniforms.
///
/// Scalars come first so the light array starts on a 16-byte boundary.
/// Total size: 16 + 10 * 16 = 176 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct LightingUniforms {
    /// Ambient light level (`ambientLight`).
    pub ambient: f32,

    /// Number of active lights (`lNb`).
    pub count: u32,

    pub _padding: [u32; 2],

    /// Active lights as `(x, y, z, intensity)`; entries past `count` are zero.
    pub lights: [[f32; 4]; MAX_LIGHTS],
}

impl LightingUniforms {
    /// Pack `ambient` and the active `lights`.
    ///
    /// Panics if more than [`MAX_LIGHTS`] lights are given.
    pub fn pack(ambient: f32, lights: &[Light]) -> Self {
        assert!(
            lights.len() <= MAX_LIGHTS,
            "{} lights exceed the capacity of {}",
            lights.len(),
            MAX_LIGHTS
        );

        let mut uniforms = Self::zeroed();
        uniforms.ambient = ambient;
        uniforms.count = lights.len() as u32;
        for (slot, light) in uniforms.lights.iter_mut().zip(lights) {
            *slot = light.to_array();
        }
        uniforms
    }
}

impl Default for LightingUniforms {
    fn default() -> Self {
        Self::pack(DEFAULT_AMBIENT, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniforms_size() {
        assert_eq!(std::mem::size_of::<LightingUniforms>(), 176);
    }

    #[test]
    fn test_pack_lights() {
        let lights = [
            Light::new(Vec3::new(0.0, 200.0, 0.0), 1.0),
            Light::new(Vec3::new(-200.0, 0.0, 0.0), 0.5),
        ];
        let uniforms = LightingUniforms::pack(0.25, &lights);
        assert_eq!(uniforms.count, 2);
        assert_eq!(uniforms.ambient, 0.25);
        assert_eq!(uniforms.lights[0], [0.0, 200.0, 0.0, 1.0]);
        assert_eq!(uniforms.lights[1], [-200.0, 0.0, 0.0, 0.5]);
        assert_eq!(uniforms.lights[2], [0.0; 4]);
    }

    #[test]
    #[should_panic(expected = "exceed the capacity")]
    fn test_pack_too_many_lights() {
        let lights = vec![Light::default(); MAX_LIGHTS + 1];
        LightingUniforms::pack(0.5, &lights);
    }
}
