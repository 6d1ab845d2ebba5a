use std::borrow::Cow;

use anyhow::{anyhow, Result};
use wgpu::naga::ShaderStage;

use crate::compile::{slot_bindings, WrappedShader};
use crate::geometry::Vertex;
use crate::uniforms::ProgramLayout;
use crate::validate::ValidatedProgram;

use super::channels::{view_dimension, TextureResources};

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

/// Bind group layout shared by every program: scene block and texture transforms.
pub(crate) struct SceneLayout {
    pub uniform_layout: wgpu::BindGroupLayout,
}

impl SceneLayout {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene uniform layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
                uniform_entry(1, wgpu::ShaderStages::FRAGMENT),
            ],
        });
        Self { uniform_layout }
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// A linked program: render pipeline plus the texture layout it was built for.
pub(crate) struct ShaderPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub texture_layout: wgpu::BindGroupLayout,
    pub layout: ProgramLayout,
}

impl ShaderPipeline {
    pub fn new(
        device: &wgpu::Device,
        scene: &SceneLayout,
        program: &ValidatedProgram,
        target_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = shader_module(device, &program.vertex, ShaderStage::Vertex);
        let fragment_module = shader_module(device, &program.fragment, ShaderStage::Fragment);

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture layout"),
            entries: &texture_layout_entries(&program.layout),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene pipeline layout"),
            bind_group_layouts: &[&scene.uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("scene pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRIBUTES,
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(anyhow!("pipeline creation failed: {err}"));
        }

        Ok(Self {
            pipeline,
            texture_layout,
            layout: program.layout.clone(),
        })
    }
}

fn shader_module(
    device: &wgpu::Device,
    shader: &WrappedShader,
    stage: ShaderStage,
) -> wgpu::ShaderModule {
    let label = match stage {
        ShaderStage::Vertex => "scene vertex",
        _ => "scene fragment",
    };
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(shader.source.clone()),
            stage,
            defines: &[],
        },
    })
}

pub(crate) fn texture_layout_entries(layout: &ProgramLayout) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(layout.bindings().len() * 2);
    for (slot, kind) in layout.bindings() {
        let (texture, sampler) = slot_bindings(*slot);
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: texture,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: view_dimension(*kind),
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: sampler,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

/// Bind group entries for the resources backing `layout`, in layout order.
pub(crate) fn texture_entries<'a>(
    layout: &ProgramLayout,
    resources: &[&'a TextureResources],
) -> Vec<wgpu::BindGroupEntry<'a>> {
    let mut entries = Vec::with_capacity(resources.len() * 2);
    for ((slot, _), resource) in layout.bindings().iter().zip(resources) {
        let (texture, sampler) = slot_bindings(*slot);
        entries.push(wgpu::BindGroupEntry {
            binding: texture,
            resource: wgpu::BindingResource::TextureView(&resource.view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: sampler,
            resource: wgpu::BindingResource::Sampler(&resource.sampler),
        });
    }
    entries
}
