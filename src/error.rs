//! Error taxonomy for pipeline construction, image loading, and export.

use std::path::PathBuf;

/// Errors surfaced by the GPU pipeline and its collaborators.
///
/// Construction-time failures (`NoAdapter`, `Device`, `SurfaceCreate`,
/// `ShaderCompile`, `MissingUniforms`) are fatal to the pipeline instance.
/// Everything else is recoverable: the caller logs it and keeps going with
/// the previous state.
#[derive(Debug, thiserror::Error)]
pub enum BlurError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("failed to request GPU device: {0}")]
    Device(String),

    #[error("failed to create rendering surface: {0}")]
    SurfaceCreate(String),

    /// A shader stage failed WGSL validation. `log` carries the full
    /// compiler diagnostics with line numbers.
    #[error("{stage} shader failed to compile:\n{log}")]
    ShaderCompile { stage: &'static str, log: String },

    /// The shader sources validated but do not declare every uniform the
    /// pipeline writes. This is a configuration error in the shader assets,
    /// not a runtime fault.
    #[error("shader uniform block is missing required members: {0:?}")]
    MissingUniforms(Vec<String>),

    #[error("failed to decode image {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to acquire surface frame")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("failed to read rendered frame back from the GPU")]
    Readback,

    #[error("cannot export before an image has been loaded")]
    NotReady,

    #[error("failed to write exported image {path:?}")]
    Export {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("event loop error: {0}")]
    EventLoop(String),
}
