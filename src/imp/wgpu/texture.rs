// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Textures and framebuffers for the wgpu backend.

use crate::bindings::visible_to::TextureConfig;
use crate::imp::{Error, FramebufferStatus, StagingLayout};

pub(super) const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// An RGBA8 texture.  Always sampleable and copyable in both directions.
#[derive(Debug)]
pub struct WgpuTexture {
    pub(super) texture: wgpu::Texture,
    pub(super) view: wgpu::TextureView,
    width: u32,
    height: u32,
    render_target: bool,
    debug_name: String,
}

impl WgpuTexture {
    pub(super) fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        config: &TextureConfig<'_>,
        initial: &[u8],
    ) -> Result<Self, Error> {
        if config.width == 0 || config.height == 0 {
            return Err(Error::ZeroSized(config.debug_name.to_string()));
        }
        let max = device.limits().max_texture_dimension_2d;
        if config.width > max || config.height > max {
            return Err(Error::Allocation {
                debug_name: config.debug_name.to_string(),
                byte_len: config.byte_len(),
            });
        }
        if !initial.is_empty() && initial.len() != config.byte_len() {
            return Err(Error::SizeMismatch {
                expected: config.byte_len(),
                actual: initial.len(),
            });
        }
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        if config.render_target {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let texture = device.create_texture(&texture_descriptor(config, usage));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let texture = WgpuTexture {
            texture,
            view,
            width: config.width,
            height: config.height,
            render_target: config.render_target,
            debug_name: config.debug_name.to_string(),
        };
        if !initial.is_empty() {
            texture.write(queue, initial)?;
        }
        Ok(texture)
    }

    /// Queues a write of tightly packed `pixels`.  Lands before the next submission.
    pub(super) fn write(&self, queue: &wgpu::Queue, pixels: &[u8]) -> Result<(), Error> {
        let expected = self.width as usize * self.height as usize * 4;
        if pixels.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        queue.write_texture(
            copy_destination(&self.texture),
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            self.extent(),
        );
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub(super) fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }

    /// Whether a staging buffer laid out as `layout` covers this texture exactly.
    pub(super) fn matches(&self, layout: &StagingLayout) -> bool {
        (self.width, self.height) == (layout.width, layout.height)
    }
}

fn texture_descriptor<'a>(
    config: &TextureConfig<'a>,
    usage: wgpu::TextureUsages,
) -> wgpu::TextureDescriptor<'a> {
    wgpu::TextureDescriptor {
        label: Some(config.debug_name),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage,
        view_formats: &[],
    }
}

pub(super) fn copy_destination(texture: &wgpu::Texture) -> wgpu::TexelCopyTextureInfo<'_> {
    wgpu::TexelCopyTextureInfo {
        texture,
        mip_level: 0,
        origin: wgpu::Origin3d::ZERO,
        aspect: wgpu::TextureAspect::All,
    }
}

/// A color attachment.  Shares the texture with the [WgpuTexture] it was made from.
#[derive(Debug)]
pub struct WgpuFramebuffer {
    pub(super) texture: wgpu::Texture,
    pub(super) view: wgpu::TextureView,
    width: u32,
    height: u32,
    renderable: bool,
}

impl WgpuFramebuffer {
    pub(super) fn new(color: &WgpuTexture) -> Self {
        WgpuFramebuffer {
            texture: color.texture.clone(),
            view: color.view.clone(),
            width: color.width,
            height: color.height,
            renderable: color.render_target,
        }
    }

    pub(super) fn status(&self) -> FramebufferStatus {
        if self.width == 0 || self.height == 0 {
            FramebufferStatus::ZeroSized
        } else if !self.renderable {
            FramebufferStatus::NotRenderable
        } else {
            FramebufferStatus::Complete
        }
    }

    pub(super) fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(super) fn extent_3d(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}
