//! Blur parameter domain: radius and strength with their documented ranges.

/// Inclusive radius domain, in per-side sample taps.
pub const RADIUS_MIN: f32 = 0.0;
pub const RADIUS_MAX: f32 = 10.0;

/// Inclusive strength domain, the Gaussian falloff coefficient.
pub const STRENGTH_MIN: f32 = 0.01;
pub const STRENGTH_MAX: f32 = 1.0;

/// Blur parameters, independent of image identity. They persist across image
/// reloads. Values are clamped to their domains on every write; out-of-range
/// input is never forwarded to the GPU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurParams {
    radius: f32,
    strength: f32,
}

impl BlurParams {
    pub fn new(radius: f32, strength: f32) -> Self {
        Self {
            radius: radius.clamp(RADIUS_MIN, RADIUS_MAX),
            strength: strength.clamp(STRENGTH_MIN, STRENGTH_MAX),
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }

    /// Set the radius, clamped to [0, 10]. Returns the stored value.
    pub fn set_radius(&mut self, radius: f32) -> f32 {
        self.radius = radius.clamp(RADIUS_MIN, RADIUS_MAX);
        self.radius
    }

    /// Set the strength, clamped to [0.01, 1.0]. Returns the stored value.
    pub fn set_strength(&mut self, strength: f32) -> f32 {
        self.strength = strength.clamp(STRENGTH_MIN, STRENGTH_MAX);
        self.strength
    }
}

impl Default for BlurParams {
    fn default() -> Self {
        Self::new(RADIUS_MIN, STRENGTH_MIN)
    }
}
