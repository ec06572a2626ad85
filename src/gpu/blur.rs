//! Separable two-pass blur pipeline.
//!
//! A 2D Gaussian-style blur of radius r costs O(r^2) samples per pixel done
//! directly; splitting it into a horizontal pass followed by a vertical pass
//! costs O(r) + O(r). Pass 1 draws the source texture into the intermediate
//! render target with a horizontal direction; pass 2 draws the intermediate
//! onto the drawable surface with a vertical direction.
//!
//! The pipeline exclusively owns every GPU handle it uses (program, quad,
//! textures, render target, uniform buffer); nothing else mutates them.

use std::path::PathBuf;

use super::context::GpuContext;
use super::geometry::GeometryBuffer;
use super::shader::ShaderProgram;
use super::target::RenderTarget;
use super::texture::{TextureSlot, TextureStore};
use crate::decode::{DecodedImage, Decoder};
use crate::error::BlurError;
use crate::math;
use crate::params::BlurParams;

/// Shader assets compiled into the binary.
pub const VERTEX_SHADER: &str = include_str!("shaders/blur_vs.wgsl");
pub const FRAGMENT_SHADER: &str = include_str!("shaders/blur_fs.wgsl");

/// CPU mirror of the shader uniform block. Field order and padding match
/// WGSL uniform layout; tests verify the offsets against the reflected
/// uniform table.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlurUniforms {
    pub matrix: [f32; 16],
    pub resolution: [f32; 2],
    pub direction: [f32; 2],
    pub radius: f32,
    pub strength: f32,
    pub flip: u32,
    pub _pad: u32,
}

const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Where a pass draws to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    /// The owned render target (intermediate texture).
    Offscreen,
    /// The drawable surface (or an export texture standing in for it).
    Surface,
}

/// One draw of the two-pass sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassDesc {
    pub target: PassTarget,
    pub input: TextureSlot,
    pub direction: [f32; 2],
    pub flip: u32,
}

/// The draw sequence for one render: empty until an image is installed,
/// then exactly horizontal-into-offscreen followed by vertical-onto-surface.
pub fn pass_plan(ready: bool) -> Vec<PassDesc> {
    if !ready {
        return Vec::new();
    }
    vec![
        PassDesc {
            target: PassTarget::Offscreen,
            input: TextureSlot::Source,
            direction: [1.0, 0.0],
            flip: 0,
        },
        PassDesc {
            target: PassTarget::Surface,
            input: TextureSlot::Intermediate,
            direction: [0.0, 1.0],
            flip: 1,
        },
    ]
}

struct PassBindGroups {
    /// Samples the source texture (pass 1).
    horizontal: wgpu::BindGroup,
    /// Samples the intermediate texture (pass 2).
    vertical: wgpu::BindGroup,
}

/// Orchestrates the two-pass blur. See module docs.
pub struct BlurPipeline {
    program: ShaderProgram,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    geometry: GeometryBuffer,
    textures: TextureStore,
    target: RenderTarget,
    uniform_buffer: wgpu::Buffer,
    uniforms: BlurUniforms,
    params: BlurParams,
    bind_groups: Option<PassBindGroups>,
    decoder: Decoder,
    ready: bool,
}

impl BlurPipeline {
    /// Build the pipeline. Shader validation failure is fatal: no partial
    /// pipeline is usable, so nothing is constructed.
    pub fn new(
        ctx: &GpuContext,
        vertex_src: &str,
        fragment_src: &str,
        params: BlurParams,
    ) -> Result<Self, BlurError> {
        let device = &ctx.device;

        let program = ShaderProgram::new(device, vertex_src, fragment_src)?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blur Bind Group Layout"),
            entries: &[
                // uniform block
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // sampled texture
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blur Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Blur Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &program.vertex,
                entry_point: Some("vs_main"),
                buffers: &[GeometryBuffer::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.fragment,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.format(),
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Blur Uniform Buffer"),
            size: std::mem::size_of::<BlurUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniforms = BlurUniforms {
            matrix: IDENTITY,
            resolution: [1.0, 1.0],
            direction: [1.0, 0.0],
            radius: params.radius(),
            strength: params.strength(),
            flip: 0,
            _pad: 0,
        };
        ctx.queue
            .write_buffer(&uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        Ok(Self {
            program,
            pipeline,
            bind_group_layout,
            geometry: GeometryBuffer::new(device),
            textures: TextureStore::new(ctx),
            target: RenderTarget::new(),
            uniform_buffer,
            uniforms,
            params,
            bind_groups: None,
            decoder: Decoder::new(),
            ready: false,
        })
    }

    /// True once the first image has been installed.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn params(&self) -> BlurParams {
        self.params
    }

    /// Dimensions of the most recently installed image.
    pub fn image_size(&self) -> Option<(u32, u32)> {
        self.textures.get(TextureSlot::Source).map(|t| t.size())
    }

    /// Begin decoding `path` in the background. Supersedes any decode still
    /// in flight; call [`complete_loads`](Self::complete_loads) from the
    /// event loop to install the result.
    pub fn load_image(&mut self, path: PathBuf) {
        self.decoder.request(path);
    }

    /// Install the newest finished decode, if any. On success the surface is
    /// resized to the image, both texture slots are re-provisioned, the
    /// projection and resolution uniforms are recomputed, and one render is
    /// issued; the new dimensions are returned so the host can resize its
    /// window. A decode failure is returned without touching current state.
    pub fn complete_loads(
        &mut self,
        ctx: &mut GpuContext,
    ) -> Option<Result<(u32, u32), BlurError>> {
        let decoded = match self.decoder.poll()? {
            Ok(image) => image,
            Err(e) => return Some(Err(e)),
        };
        Some(Ok(self.install_image(ctx, &decoded)))
    }

    fn install_image(&mut self, ctx: &mut GpuContext, image: &DecodedImage) -> (u32, u32) {
        let (width, height) = (image.width, image.height);

        ctx.resize((width, height));

        self.textures.provision(
            ctx,
            TextureSlot::Source,
            Some(&image.pixels),
            width,
            height,
        );
        self.textures
            .provision(ctx, TextureSlot::Intermediate, None, width, height);

        // The attachment must never outlive the texture it was created from.
        let intermediate = self
            .textures
            .get(TextureSlot::Intermediate)
            .expect("intermediate texture was just provisioned");
        self.target.attach(intermediate);

        self.uniforms.matrix = math::pixel_projection(width, height);
        self.uniforms.resolution = [width as f32, height as f32];
        let table = &self.program.uniforms;
        table.write(
            &ctx.queue,
            &self.uniform_buffer,
            "matrix",
            bytemuck::bytes_of(&self.uniforms.matrix),
        );
        table.write(
            &ctx.queue,
            &self.uniform_buffer,
            "resolution",
            bytemuck::bytes_of(&self.uniforms.resolution),
        );

        self.rebuild_bind_groups(ctx);
        self.ready = true;

        if let Err(e) = self.render(ctx) {
            log::error!("initial render after image load failed: {e}");
        }

        (width, height)
    }

    fn rebuild_bind_groups(&mut self, ctx: &GpuContext) {
        let (Some(source), Some(intermediate)) = (
            self.textures.get(TextureSlot::Source),
            self.textures.get(TextureSlot::Intermediate),
        ) else {
            return;
        };

        let make = |label, texture: &super::texture::ProvisionedTexture| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(texture.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(
                            self.textures.sampler_for(texture.policy()),
                        ),
                    },
                ],
            })
        };

        self.bind_groups = Some(PassBindGroups {
            horizontal: make("Horizontal Pass Bind Group", source),
            vertical: make("Vertical Pass Bind Group", intermediate),
        });
    }

    /// Set the blur radius, clamped to its domain, and update the uniform.
    /// Does not render; the caller sequences `render` explicitly.
    pub fn set_radius(&mut self, ctx: &GpuContext, radius: f32) -> f32 {
        let stored = self.params.set_radius(radius);
        self.uniforms.radius = stored;
        self.program.uniforms.write(
            &ctx.queue,
            &self.uniform_buffer,
            "radius",
            bytemuck::bytes_of(&stored),
        );
        stored
    }

    /// Set the blur strength, clamped to its domain, and update the uniform.
    /// Does not render.
    pub fn set_strength(&mut self, ctx: &GpuContext, strength: f32) -> f32 {
        let stored = self.params.set_strength(strength);
        self.uniforms.strength = stored;
        self.program.uniforms.write(
            &ctx.queue,
            &self.uniform_buffer,
            "strength",
            bytemuck::bytes_of(&stored),
        );
        stored
    }

    /// Render the current image to the surface: a no-op before the first
    /// image, exactly two draws after.
    pub fn render(&self, ctx: &GpuContext) -> Result<(), BlurError> {
        if !self.ready {
            return Ok(());
        }

        let frame = ctx.surface.get_current_texture()?;
        let surface_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.encode_passes(ctx, &surface_view);
        frame.present();
        Ok(())
    }

    /// Run the pass sequence with the final pass aimed at `final_view`.
    /// Each pass writes its direction/flip uniforms and submits its own
    /// encoder so the draw observes the values set for it.
    fn encode_passes(&self, ctx: &GpuContext, final_view: &wgpu::TextureView) {
        let Some(bind_groups) = &self.bind_groups else {
            return;
        };

        for pass in pass_plan(self.ready) {
            let table = &self.program.uniforms;
            table.write(
                &ctx.queue,
                &self.uniform_buffer,
                "direction",
                bytemuck::bytes_of(&pass.direction),
            );
            table.write(
                &ctx.queue,
                &self.uniform_buffer,
                "flip",
                bytemuck::bytes_of(&pass.flip),
            );

            let view = match pass.target {
                PassTarget::Offscreen => match self.target.view() {
                    Some(view) => view,
                    None => return,
                },
                PassTarget::Surface => final_view,
            };
            let bind_group = match pass.input {
                TextureSlot::Source => &bind_groups.horizontal,
                TextureSlot::Intermediate => &bind_groups.vertical,
            };

            let mut encoder = ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Blur Pass Encoder"),
                });
            {
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Blur Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
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
                render_pass.set_pipeline(&self.pipeline);
                render_pass.set_bind_group(0, bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.geometry.slice());
                render_pass.draw(0..GeometryBuffer::vertex_count(), 0..1);
            }
            ctx.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Render the current state into an offscreen texture and read it back
    /// as RGBA8. Output dimensions always equal the most recently loaded
    /// image's dimensions.
    pub fn export_frame(&self, ctx: &GpuContext) -> Result<image::RgbaImage, BlurError> {
        if !self.ready {
            return Err(BlurError::NotReady);
        }
        let (width, height) = self
            .image_size()
            .ok_or(BlurError::NotReady)?;

        let format = ctx.format();
        let export_texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Export Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let export_view = export_texture.create_view(&Default::default());

        self.encode_passes(ctx, &export_view);

        let unpadded_bytes_per_row = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = (unpadded_bytes_per_row + align - 1) / align * align;

        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Export Staging Buffer"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Export Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &export_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = ctx.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| BlurError::Readback)?
            .map_err(|_| BlurError::Readback)?;

        let mut pixels = {
            let data = slice.get_mapped_range();
            unpad_rows(&data, width, height, padded_bytes_per_row as usize)
        };
        staging.unmap();

        if is_bgra(format) {
            bgra_to_rgba(&mut pixels);
        }

        image::RgbaImage::from_raw(width, height, pixels).ok_or(BlurError::Readback)
    }
}

fn is_bgra(format: wgpu::TextureFormat) -> bool {
    matches!(
        format,
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
    )
}

/// Strip the copy-alignment padding from a read-back buffer.
pub(crate) fn unpad_rows(
    data: &[u8],
    width: u32,
    height: u32,
    padded_bytes_per_row: usize,
) -> Vec<u8> {
    let unpadded = (width * 4) as usize;
    let mut pixels = Vec::with_capacity(unpadded * height as usize);
    for row in 0..height as usize {
        let start = row * padded_bytes_per_row;
        pixels.extend_from_slice(&data[start..start + unpadded]);
    }
    pixels
}

/// Swap the blue and red channels in place.
pub(crate) fn bgra_to_rgba(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}
