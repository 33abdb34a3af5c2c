// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Render pipelines for the full-screen passes.

use crate::images::render_pass::Effect;
use crate::imp::wgpu::sampler;
use crate::imp::wgpu::texture::FORMAT;
use wgpu::{
    BindGroupLayoutEntry, BindingType, ColorTargetState, ColorWrites, MultisampleState,
    PolygonMode, PrimitiveState, PrimitiveTopology, RenderPipelineDescriptor, SamplerBindingType,
    ShaderStages, TextureSampleType, TextureViewDimension,
};

/// One pipeline per [Effect], sharing a layout, shader module and sampler.
#[derive(Debug)]
pub(super) struct EffectPipelines {
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    copy: wgpu::RenderPipeline,
    grayscale: wgpu::RenderPipeline,
}

impl EffectPipelines {
    pub(super) fn new(device: &wgpu::Device) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("full_screen"),
            source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Borrowed(include_str!(
                "full_screen.wgsl"
            ))),
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("full_screen"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("full_screen"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let copy = pipeline(device, &layout, &module, "fs_copy");
        let grayscale = pipeline(device, &layout, &module, "fs_grayscale");
        logwise::trace_sync!("Created effect pipelines");
        EffectPipelines {
            bind_group_layout,
            sampler: sampler::nearest(device),
            copy,
            grayscale,
        }
    }

    pub(super) fn pipeline(&self, effect: Effect) -> &wgpu::RenderPipeline {
        match effect {
            Effect::Copy => &self.copy,
            Effect::Grayscale => &self.grayscale,
        }
    }

    pub(super) fn bind_group(
        &self,
        device: &wgpu::Device,
        source: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("full_screen"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }
}

fn pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    fragment_entry: &str,
) -> wgpu::RenderPipeline {
    let primitive_state = PrimitiveState {
        topology: PrimitiveTopology::TriangleList,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: None,
        unclipped_depth: false,
        polygon_mode: PolygonMode::Fill,
        conservative: false,
    };
    let multisample_state = MultisampleState {
        count: 1,
        mask: !0,
        alpha_to_coverage_enabled: false,
    };
    let color_target_state = ColorTargetState {
        format: FORMAT,
        blend: None,
        write_mask: ColorWrites::ALL,
    };
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(fragment_entry),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        primitive: primitive_state,
        depth_stencil: None,
        multisample: multisample_state,
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(fragment_entry),
            compilation_options: Default::default(),
            targets: &[Some(color_target_state)],
        }),
        multiview: None,
        cache: None,
    })
}
