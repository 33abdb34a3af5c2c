// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The wgpu backend.

Commands recorded during a frame go into one encoder, submitted by
[TransferDevice::end_frame].  Staging buffers used by the GPU in a frame are armed for mapping
right after that submission; a background thread polls the device so their callbacks fire
without the render thread waiting.  See [buffer] for the mapping state machine.
*/

mod bound_device;
pub mod buffer;
mod entry_point;
mod pipeline;
mod sampler;
pub mod texture;
mod unbound_device;

pub use bound_device::BoundDevice;
pub use buffer::WgpuStagingBuffer;
pub use entry_point::EntryPoint;
pub use texture::{WgpuFramebuffer, WgpuTexture};
pub use unbound_device::UnboundDevice;

use crate::bindings::buffer_access::MapType;
use crate::bindings::visible_to::TextureConfig;
use crate::images::render_pass::PassDescriptor;
use crate::imp::{Error, FramebufferStatus, MapError, StagingLayout, TransferDevice};
use buffer::PendingMap;
use pipeline::EffectPipelines;
use std::sync::Mutex;
use std::sync::mpsc;

/// A [TransferDevice] on a real GPU.
#[derive(Debug)]
pub struct WgpuDevice {
    bound: BoundDevice,
    pipelines: EffectPipelines,
    encoder: Mutex<Option<wgpu::CommandEncoder>>,
    maps_after_submit: Mutex<Vec<PendingMap>>,
}

impl WgpuDevice {
    /// Picks an adapter and opens a device on it.
    pub async fn new() -> Result<Self, Error> {
        let entry_point = EntryPoint::new();
        let unbound = UnboundDevice::pick(&entry_point).await?;
        let bound = BoundDevice::bind(unbound).await?;
        Ok(Self::with_bound_device(bound))
    }

    pub fn with_bound_device(bound: BoundDevice) -> Self {
        let pipelines = EffectPipelines::new(bound.device());
        WgpuDevice {
            bound,
            pipelines,
            encoder: Mutex::new(None),
            maps_after_submit: Mutex::new(Vec::new()),
        }
    }

    pub fn bound_device(&self) -> &BoundDevice {
        &self.bound
    }

    fn record<R>(&self, f: impl FnOnce(&mut wgpu::CommandEncoder) -> R) -> R {
        let mut encoder = self.encoder.lock().unwrap();
        let encoder = encoder.get_or_insert_with(|| {
            self.bound
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("pixel_transfer frame"),
                })
        });
        f(encoder)
    }

    /// Submits recorded work, then arms the staging buffers it used.
    fn submit(&self) {
        let encoder = self.encoder.lock().unwrap().take();
        let commands = encoder.map(|e| e.finish());
        self.bound.queue().submit(commands);
        let pending = std::mem::take(&mut *self.maps_after_submit.lock().unwrap());
        if pending.is_empty() {
            return;
        }
        for map in pending {
            map.arm();
        }
        self.bound.set_needs_poll();
    }
}

impl TransferDevice for WgpuDevice {
    type Buffer = WgpuStagingBuffer;
    type Texture = WgpuTexture;
    type Framebuffer = WgpuFramebuffer;

    fn staging_layout(&self, width: u32, height: u32) -> StagingLayout {
        StagingLayout::aligned(width, height, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
    }

    fn create_staging_buffer(
        &self,
        map_type: MapType,
        layout: &StagingLayout,
        debug_name: &str,
    ) -> Result<Self::Buffer, Error> {
        WgpuStagingBuffer::new(self.bound.device(), map_type, layout, debug_name)
    }

    fn delete_staging_buffer(&self, buffer: Self::Buffer) {
        //wgpu keeps the allocation alive until in-flight work is done
        drop(buffer);
    }

    fn create_texture(
        &self,
        config: &TextureConfig<'_>,
        initial: &[u8],
    ) -> Result<Self::Texture, Error> {
        WgpuTexture::new(self.bound.device(), self.bound.queue(), config, initial)
    }

    fn delete_texture(&self, texture: Self::Texture) {
        drop(texture);
    }

    fn write_texture(&self, texture: &Self::Texture, pixels: &[u8]) -> Result<(), Error> {
        texture.write(self.bound.queue(), pixels)
    }

    fn create_framebuffer(&self, color: &Self::Texture) -> Result<Self::Framebuffer, Error> {
        Ok(WgpuFramebuffer::new(color))
    }

    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer) {
        drop(framebuffer);
    }

    fn framebuffer_status(&self, framebuffer: &Self::Framebuffer) -> FramebufferStatus {
        framebuffer.status()
    }

    fn framebuffer_extent(&self, framebuffer: &Self::Framebuffer) -> (u32, u32) {
        framebuffer.extent()
    }

    fn copy_staging_to_texture(
        &self,
        buffer: &Self::Buffer,
        layout: &StagingLayout,
        texture: &Self::Texture,
    ) -> Result<(), MapError> {
        if buffer.map_type() != MapType::Write {
            return Err(MapError::Failed(format!(
                "{name} can't source a texture update",
                name = buffer.debug_name()
            )));
        }
        if !texture.matches(layout) {
            return Err(MapError::Failed(format!(
                "{name} is {w}x{h}, staging is {sw}x{sh}",
                name = texture.debug_name(),
                w = texture.width(),
                h = texture.height(),
                sw = layout.width,
                sh = layout.height
            )));
        }
        buffer.release_to_gpu()?;
        self.record(|encoder| {
            encoder.copy_buffer_to_texture(
                wgpu::TexelCopyBufferInfo {
                    buffer: buffer.buffer(),
                    layout: texel_layout(layout),
                },
                texture::copy_destination(&texture.texture),
                texture.extent(),
            );
        });
        self.maps_after_submit
            .lock()
            .unwrap()
            .push(buffer.pending_map());
        Ok(())
    }

    fn write_staging<F: FnOnce(&mut [u8])>(
        &self,
        buffer: &Self::Buffer,
        write: F,
    ) -> Result<(), MapError> {
        buffer.write(|| self.bound.poll_now(), write)
    }

    fn read_framebuffer_to_staging(
        &self,
        framebuffer: &Self::Framebuffer,
        buffer: &Self::Buffer,
        layout: &StagingLayout,
    ) -> Result<(), MapError> {
        if buffer.map_type() != MapType::Read {
            return Err(MapError::Failed(format!(
                "{name} can't receive a framebuffer read",
                name = buffer.debug_name()
            )));
        }
        if framebuffer.extent() != (layout.width, layout.height) {
            return Err(MapError::Failed(format!(
                "framebuffer is {w}x{h}, staging is {sw}x{sh}",
                w = framebuffer.extent().0,
                h = framebuffer.extent().1,
                sw = layout.width,
                sh = layout.height
            )));
        }
        buffer.release_to_gpu()?;
        self.record(|encoder| {
            encoder.copy_texture_to_buffer(
                texture::copy_destination(&framebuffer.texture),
                wgpu::TexelCopyBufferInfo {
                    buffer: buffer.buffer(),
                    layout: texel_layout(layout),
                },
                framebuffer.extent_3d(),
            );
        });
        self.maps_after_submit
            .lock()
            .unwrap()
            .push(buffer.pending_map());
        Ok(())
    }

    fn read_staging<F: FnOnce(&[u8])>(
        &self,
        buffer: &Self::Buffer,
        read: F,
    ) -> Result<(), MapError> {
        buffer.read(|| self.bound.poll_now(), read)
    }

    fn read_pixels_blocking(
        &self,
        framebuffer: &Self::Framebuffer,
        dst: &mut [u8],
    ) -> Result<(), MapError> {
        let (width, height) = framebuffer.extent();
        let layout = self.staging_layout(width, height);
        if dst.len() != layout.tight_byte_len() {
            return Err(MapError::Failed(format!(
                "expected {expected} bytes, got {actual}",
                expected = layout.tight_byte_len(),
                actual = dst.len()
            )));
        }
        let readback = self.bound.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("read_pixels_blocking"),
            size: layout.byte_len() as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.record(|encoder| {
            encoder.copy_texture_to_buffer(
                texture::copy_destination(&framebuffer.texture),
                wgpu::TexelCopyBufferInfo {
                    buffer: &readback,
                    layout: texel_layout(&layout),
                },
                framebuffer.extent_3d(),
            );
        });
        self.submit();

        let (sender, receiver) = mpsc::channel();
        readback
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
        self.bound.poll_wait();
        receiver
            .recv()
            .map_err(|e| MapError::Failed(e.to_string()))?
            .map_err(|e| MapError::Failed(e.to_string()))?;
        let copied = {
            let view = readback.slice(..).get_mapped_range();
            layout.copy_rows_out(&view, dst)
        };
        readback.unmap();
        copied
    }

    fn draw(&self, pass: &PassDescriptor<'_, Self>) {
        let status = pass.target.status();
        if !status.is_complete() {
            logwise::warn_sync!(
                "Skipping pass {name}: target is {status}",
                name = logwise::privacy::LogIt(&pass.name),
                status = logwise::privacy::LogIt(&status)
            );
            return;
        }
        let device = self.bound.device();
        let bind_group = self.pipelines.bind_group(device, &pass.source.view);
        self.record(|encoder| {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(pass.name),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &pass.target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(self.pipelines.pipeline(pass.effect));
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        });
    }

    fn end_frame(&self) {
        self.submit();
    }
}

fn texel_layout(layout: &StagingLayout) -> wgpu::TexelCopyBufferLayout {
    wgpu::TexelCopyBufferLayout {
        offset: 0,
        bytes_per_row: Some(layout.bytes_per_row),
        rows_per_image: Some(layout.height),
    }
}
