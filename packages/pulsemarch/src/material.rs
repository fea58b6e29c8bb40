//! Surface response parameters for spheres.
//!
//! The ray tracer shades with a Phong model: `diffuse` and `specular` weight
//! the two lobes, `shininess` is the specular exponent. The triple is sent
//! to the shader as the per-object `attr` vector.

/// Phong surface material.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceMaterial {
    pub diffuse: f32,
    pub specular: f32,
    pub shininess: f32,
}

impl SurfaceMaterial {
    pub const fn new(diffuse: f32, specular: f32, shininess: f32) -> Self {
        Self {
            diffuse,
            specular,
            shininess,
        }
    }

    /// Even split between diffuse and specular.
    pub const SATIN: Self = Self::new(0.5, 0.5, 8.0);

    /// Mostly specular with a tight highlight.
    pub const GLOSS: Self = Self::new(0.3, 0.7, 16.0);

    /// Pure specular, no diffuse term.
    pub const CHROME: Self = Self::new(0.0, 1.0, 8.0);

    /// Diffuse only.
    pub const MATTE: Self = Self::new(1.0, 0.0, 1.0);

    /// Packed as the shader's `attr` entry (w unused).
    pub fn to_array(&self) -> [f32; 4] {
        [self.diffuse, self.specular, self.shininess, 0.0]
    }
}

impl Default for SurfaceMaterial {
    fn default() -> Self {
        Self::SATIN
    }
}
