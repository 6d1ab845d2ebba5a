use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use super::channels::{self, TextureResources};
use super::context::{AdapterProfile, GpuContext, GpuPowerPreference};
use super::pipeline::{self, SceneLayout, ShaderPipeline};
use super::{DrawCall, GpuBackend, MeshId, ProgramId, TextureId};
use crate::geometry::Geometry;
use crate::textures::DecodedTexture;
use crate::uniforms::{SceneBlock, TransformBlock};
use crate::validate::ValidatedProgram;

/// Offscreen render target settings.
#[derive(Clone, Debug)]
pub struct HeadlessOptions {
    pub width: u32,
    pub height: u32,
    pub power: GpuPowerPreference,
    pub max_anisotropy: u16,
    pub clear_color: [f64; 4],
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            power: GpuPowerPreference::default(),
            max_anisotropy: 16,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

struct MeshBuffers {
    vertices: wgpu::Buffer,
    indices: Option<wgpu::Buffer>,
    count: u32,
}

struct RenderTarget {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

/// [`GpuBackend`] rendering into an offscreen texture that can be read back.
pub struct WgpuBackend {
    context: GpuContext,
    options: HeadlessOptions,
    scene_layout: SceneLayout,
    scene_buffer: wgpu::Buffer,
    transform_buffer: wgpu::Buffer,
    scene_bind_group: wgpu::BindGroup,
    target: RenderTarget,
    next_id: u64,
    textures: HashMap<TextureId, TextureResources>,
    programs: HashMap<ProgramId, ShaderPipeline>,
    meshes: HashMap<MeshId, MeshBuffers>,
}

impl WgpuBackend {
    pub fn new(options: HeadlessOptions) -> Result<Self> {
        let context = GpuContext::new(options.power, options.width, options.height)?;
        let device = &context.device;

        let scene_layout = SceneLayout::new(device);
        let scene_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("scene uniforms"),
            contents: bytemuck::bytes_of(&SceneBlock::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let transform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("texture transforms"),
            contents: bytemuck::bytes_of(&TransformBlock::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let scene_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene bind group"),
            layout: &scene_layout.uniform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: scene_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: transform_buffer.as_entire_binding(),
                },
            ],
        });
        let target = create_target(&context, options.width.max(1), options.height.max(1));

        Ok(Self {
            context,
            options,
            scene_layout,
            scene_buffer,
            transform_buffer,
            scene_bind_group,
            target,
            next_id: 0,
            textures: HashMap::new(),
            programs: HashMap::new(),
            meshes: HashMap::new(),
        })
    }

    pub fn adapter(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    pub fn size(&self) -> (u32, u32) {
        (self.options.width.max(1), self.options.height.max(1))
    }

    /// Copies the last rendered frame back to the CPU.
    pub fn read_pixels(&self) -> Result<image::RgbaImage> {
        let (width, height) = self.size();
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let device = &self.context.device;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback buffer"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| anyhow!("device poll failed: {err}"))?;
        rx.recv()
            .context("readback callback never fired")?
            .map_err(|err| anyhow!("failed to map readback buffer: {err}"))?;

        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks_exact(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();

        image::RgbaImage::from_raw(width, height, pixels)
            .context("readback produced a truncated image")
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

fn create_target(context: &GpuContext, width: u32, height: u32) -> RenderTarget {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let color = context.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen color"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: context.target_format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let depth = context.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen depth"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: context.depth_format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    RenderTarget {
        color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
        depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
        color,
    }
}

impl GpuBackend for WgpuBackend {
    fn create_texture(&mut self, texture: &DecodedTexture) -> Result<TextureId> {
        let resources = channels::create_resources(
            &self.context.device,
            &self.context.queue,
            texture,
            self.options.max_anisotropy,
        )?;
        let id = TextureId(self.next_id());
        self.textures.insert(id, resources);
        Ok(id)
    }

    fn dispose_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id).is_none() {
            tracing::warn!(?id, "dispose of unknown texture");
        }
    }

    fn create_program(&mut self, program: &ValidatedProgram) -> Result<ProgramId> {
        let pipeline = ShaderPipeline::new(
            &self.context.device,
            &self.scene_layout,
            program,
            self.context.target_format,
            self.context.depth_format,
        )?;
        let id = ProgramId(self.next_id());
        self.programs.insert(id, pipeline);
        Ok(id)
    }

    fn dispose_program(&mut self, id: ProgramId) {
        if self.programs.remove(&id).is_none() {
            tracing::warn!(?id, "dispose of unknown program");
        }
    }

    fn upload_mesh(&mut self, geometry: &Geometry) -> Result<MeshId> {
        let device = &self.context.device;
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh vertices"),
            contents: bytemuck::cast_slice(&geometry.interleaved()),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = (!geometry.indices.is_empty()).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh indices"),
                contents: bytemuck::cast_slice(&geometry.indices),
                usage: wgpu::BufferUsages::INDEX,
            })
        });
        let id = MeshId(self.next_id());
        self.meshes.insert(
            id,
            MeshBuffers {
                vertices,
                indices,
                count: geometry.draw_count(),
            },
        );
        Ok(id)
    }

    fn dispose_mesh(&mut self, id: MeshId) {
        self.meshes.remove(&id);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        let program = self
            .programs
            .get(&call.program)
            .with_context(|| format!("draw with unknown program {:?}", call.program))?;
        let mesh = self
            .meshes
            .get(&call.mesh)
            .with_context(|| format!("draw with unknown mesh {:?}", call.mesh))?;

        let live = call.uniforms.layout();
        if live != program.layout {
            tracing::debug!("program layout lags texture set; skipping frame");
            return Ok(());
        }
        let mut resources = Vec::with_capacity(live.bindings().len());
        for (slot, kind) in live.bindings() {
            let resource = call
                .uniforms
                .sampler(*slot)
                .and_then(|id| self.textures.get(&id));
            match resource {
                Some(resource) if resource.kind == *kind => resources.push(resource),
                Some(_) => bail!("texture bound to {slot} has the wrong dimension"),
                None => bail!("no resident texture for {slot}"),
            }
        }

        let device = &self.context.device;
        let texture_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("texture bind group"),
            layout: &program.texture_layout,
            entries: &pipeline::texture_entries(&live, &resources),
        });

        let queue = &self.context.queue;
        queue.write_buffer(&self.scene_buffer, 0, bytemuck::bytes_of(call.scene));
        queue.write_buffer(&self.transform_buffer, 0, bytemuck::bytes_of(call.transforms));

        let [r, g, b, a] = self.options.clear_color;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &self.scene_bind_group, &[]);
            pass.set_bind_group(1, &texture_bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.vertices.slice(..));
            match &mesh.indices {
                Some(indices) => {
                    pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..mesh.count, 0, 0..1);
                }
                None => pass.draw(0..mesh.count, 0..1),
            }
        }
        queue.submit(Some(encoder.finish()));
        Ok(())
    }
}
