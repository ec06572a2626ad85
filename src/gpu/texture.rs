//! Texture provisioning for the two pipeline slots (source + intermediate).
//!
//! The filtering policy mirrors classic GL constraints: only textures with
//! power-of-two dimensions on both axes are guaranteed to support mipmapping
//! and repeat addressing on every backend, so anything else falls back to
//! clamp-to-edge with linear filtering.

use super::context::GpuContext;
use crate::math::is_power_of_two;

/// The two logical texture slots the pipeline owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSlot {
    /// Holds the uploaded image.
    Source,
    /// Ping-pong render target between the two blur passes.
    Intermediate,
}

/// Filtering mode chosen per provisioned texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPolicy {
    /// Full mip chain, generated at provision time. Power-of-two sizes only.
    Mipmapped,
    /// Clamp-to-edge addressing with linear min/mag filtering.
    ClampLinear,
}

impl FilterPolicy {
    pub fn for_size(width: u32, height: u32) -> Self {
        if is_power_of_two(width) && is_power_of_two(height) {
            FilterPolicy::Mipmapped
        } else {
            FilterPolicy::ClampLinear
        }
    }
}

/// Mip levels for a full chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// A texture currently provisioned into a slot.
pub struct ProvisionedTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    policy: FilterPolicy,
    size: (u32, u32),
}

impl ProvisionedTexture {
    /// View over the full mip chain, for sampling.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Single-mip view of level 0, for use as a color attachment.
    pub fn attachment_view(&self) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Attachment View"),
            base_mip_level: 0,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }

    pub fn policy(&self) -> FilterPolicy {
        self.policy
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

/// Owns the pipeline's two texture slots and the samplers matching each
/// filtering policy. Slots are re-provisioned on every image load; a slot's
/// previous views (and any bind group built from them) are invalid after
/// provisioning and must not be used for further draws.
pub struct TextureStore {
    source: Option<ProvisionedTexture>,
    intermediate: Option<ProvisionedTexture>,
    sampler_mipmap: wgpu::Sampler,
    sampler_clamp: wgpu::Sampler,
    mip_generator: MipmapGenerator,
    // The intermediate doubles as a render target for the first pass, so it
    // carries the surface format; the source keeps the upload format.
    intermediate_format: wgpu::TextureFormat,
}

const SOURCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

impl TextureStore {
    pub fn new(ctx: &GpuContext) -> Self {
        let device = &ctx.device;

        let sampler_mipmap = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mipmap Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let sampler_clamp = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Clamp Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let mip_generator = MipmapGenerator::new(device, SOURCE_FORMAT);

        Self {
            source: None,
            intermediate: None,
            sampler_mipmap,
            sampler_clamp,
            mip_generator,
            intermediate_format: ctx.format(),
        }
    }

    /// (Re)provision a slot. `Some(pixels)` uploads tightly packed RGBA8
    /// rows and, for power-of-two sizes, regenerates the mip chain; `None`
    /// allocates an empty texture of the given size.
    pub fn provision(
        &mut self,
        ctx: &GpuContext,
        slot: TextureSlot,
        pixels: Option<&[u8]>,
        width: u32,
        height: u32,
    ) {
        let policy = FilterPolicy::for_size(width, height);
        let mips = match policy {
            FilterPolicy::Mipmapped => mip_level_count(width, height),
            FilterPolicy::ClampLinear => 1,
        };

        let (format, usage) = match slot {
            TextureSlot::Source => {
                let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
                if policy == FilterPolicy::Mipmapped {
                    // Mip levels are filled by rendering into them.
                    usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
                }
                (SOURCE_FORMAT, usage)
            }
            TextureSlot::Intermediate => (
                self.intermediate_format,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            ),
        };

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(match slot {
                TextureSlot::Source => "Source Texture",
                TextureSlot::Intermediate => "Intermediate Texture",
            }),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mips,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });

        if let Some(data) = pixels {
            debug_assert_eq!(data.len(), (width * height * 4) as usize);
            ctx.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * 4),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );

            if policy == FilterPolicy::Mipmapped {
                self.mip_generator.generate(ctx, &texture);
            }
        }

        let view = texture.create_view(&Default::default());
        let provisioned = ProvisionedTexture {
            texture,
            view,
            policy,
            size: (width, height),
        };

        match slot {
            TextureSlot::Source => self.source = Some(provisioned),
            TextureSlot::Intermediate => self.intermediate = Some(provisioned),
        }
    }

    pub fn get(&self, slot: TextureSlot) -> Option<&ProvisionedTexture> {
        match slot {
            TextureSlot::Source => self.source.as_ref(),
            TextureSlot::Intermediate => self.intermediate.as_ref(),
        }
    }

    /// Sampler matching a texture's filtering policy.
    pub fn sampler_for(&self, policy: FilterPolicy) -> &wgpu::Sampler {
        match policy {
            FilterPolicy::Mipmapped => &self.sampler_mipmap,
            FilterPolicy::ClampLinear => &self.sampler_clamp,
        }
    }
}

/// Fills mip levels 1..n by rendering each from the level above with a
/// fullscreen triangle.
struct MipmapGenerator {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl MipmapGenerator {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mipmap Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/mipmap_blit.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mipmap Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mipmap Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Mipmap Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mipmap Blit Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            pipeline,
            bind_group_layout,
            sampler,
        }
    }

    fn generate(&self, ctx: &GpuContext, texture: &wgpu::Texture) {
        let mip_count = texture.mip_level_count();
        if mip_count < 2 {
            return;
        }

        let views: Vec<wgpu::TextureView> = (0..mip_count)
            .map(|level| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Mip Level View"),
                    base_mip_level: level,
                    mip_level_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Mipmap Encoder"),
            });

        for level in 1..mip_count as usize {
            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Mipmap Bind Group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&views[level - 1]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mipmap Blit Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &views[level],
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        ctx.queue.submit(std::iter::once(encoder.finish()));
    }
}
