//! Offscreen render target: a framebuffer with one swappable color attachment.

use super::texture::ProvisionedTexture;

/// The offscreen destination for the first blur pass. Holds at most one
/// color-attachment view; the attachment is swapped whenever the
/// intermediate texture is re-provisioned so it can never point at a texture
/// with stale dimensions.
pub struct RenderTarget {
    attachment: Option<wgpu::TextureView>,
}

impl RenderTarget {
    pub fn new() -> Self {
        Self { attachment: None }
    }

    /// Attach `texture` as the color attachment, replacing any previous one.
    pub fn attach(&mut self, texture: &ProvisionedTexture) {
        self.attachment = Some(texture.attachment_view());
    }

    /// The current color-attachment view, if one is attached.
    pub fn view(&self) -> Option<&wgpu::TextureView> {
        self.attachment.as_ref()
    }
}

impl Default for RenderTarget {
    fn default() -> Self {
        Self::new()
    }
}
