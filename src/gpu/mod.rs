//! GPU rendering module using wgpu
//!
//! Owns the device/surface context and the separable two-pass blur
//! pipeline together with its shader, geometry, texture, and render-target
//! resources.

pub mod blur;
pub mod context;
pub mod geometry;
pub mod shader;
pub mod target;
pub mod texture;

pub use blur::{BlurPipeline, BlurUniforms, PassTarget, pass_plan};
pub use context::GpuContext;
pub use shader::{REQUIRED_UNIFORMS, ShaderProgram, UniformTable, validate_sources};
pub use texture::{FilterPolicy, TextureSlot, TextureStore};
