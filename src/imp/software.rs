// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A CPU implementation of [TransferDevice].

Resources live in plain `Vec<u8>`s keyed by GL-style integer names.  GPU work executes
immediately when it is recorded, but a staging buffer named by a recorded command stays
*busy* until [TransferDevice::end_frame].  Mapping a busy buffer still succeeds (the data is
there) and is counted as a stall, which is what a driver would do by blocking.  Tests use the
stall counter and the [JournalEntry] log to check that the ping-pong never waits on itself.

The device also takes injected faults: failing maps, failing allocations and incomplete
framebuffers.
*/

use crate::bindings::buffer_access::MapType;
use crate::bindings::visible_to::TextureConfig;
use crate::images::render_pass::{Effect, PassDescriptor};
use crate::imp::{Error, FramebufferStatus, MapError, StagingLayout, TransferDevice};
use crate::pixel_formats::Unorm4;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug)]
pub struct SoftwareBuffer {
    name: u32,
}

impl SoftwareBuffer {
    pub fn name(&self) -> u32 {
        self.name
    }
}

#[derive(Debug)]
pub struct SoftwareTexture {
    name: u32,
}

impl SoftwareTexture {
    pub fn name(&self) -> u32 {
        self.name
    }
}

#[derive(Debug)]
pub struct SoftwareFramebuffer {
    name: u32,
}

/// Kind of operation recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JournalOp {
    /// GPU: texture update sourcing from an upload buffer.
    TextureFromStaging,
    /// CPU: mapped write into an upload buffer.
    StagingWrite,
    /// GPU: framebuffer read into a download buffer.
    FramebufferToStaging,
    /// CPU: mapped read of a download buffer.
    StagingRead,
}

impl JournalOp {
    pub fn is_gpu(self) -> bool {
        matches!(
            self,
            JournalOp::TextureFromStaging | JournalOp::FramebufferToStaging
        )
    }
}

/// One staging buffer access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JournalEntry {
    /// Number of [TransferDevice::end_frame] calls before the access.
    pub frame: u64,
    pub op: JournalOp,
    pub buffer: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Maps of a buffer with GPU work still pending on it.
    pub stalls: u64,
    /// Successful maps.
    pub maps: u64,
    pub failed_maps: u64,
    /// Deletes of names that were never created or already deleted.
    pub invalid_deletes: u64,
    pub live_buffers: usize,
    pub live_textures: usize,
    pub live_framebuffers: usize,
    pub frames: u64,
    pub draws: u64,
}

#[derive(Debug)]
struct BufferStorage {
    map_type: MapType,
    bytes: Vec<u8>,
    busy: bool,
    debug_name: String,
}

#[derive(Debug)]
struct TextureStorage {
    width: u32,
    height: u32,
    render_target: bool,
    pixels: Vec<u8>,
}

#[derive(Debug)]
struct FramebufferStorage {
    color: u32,
}

#[derive(Debug, Default)]
struct Faults {
    failing_maps: u32,
    allocations_before_failure: Option<u32>,
    incomplete_framebuffers: bool,
}

#[derive(Debug, Default)]
struct State {
    next_name: u32,
    buffers: HashMap<u32, BufferStorage>,
    textures: HashMap<u32, TextureStorage>,
    framebuffers: HashMap<u32, FramebufferStorage>,
    frame: u64,
    faults: Faults,
    stats: DeviceStats,
    journal: Vec<JournalEntry>,
}

impl State {
    fn gen_name(&mut self) -> u32 {
        //0 is never a valid name
        self.next_name += 1;
        self.next_name
    }

    fn record(&mut self, op: JournalOp, buffer: u32) {
        let frame = self.frame;
        self.journal.push(JournalEntry { frame, op, buffer });
    }

    /// Shared prologue of both map directions.
    fn begin_map(&mut self, name: u32, expected: MapType) -> Result<(), MapError> {
        if self.faults.failing_maps > 0 {
            self.faults.failing_maps -= 1;
            self.stats.failed_maps += 1;
            return Err(MapError::Failed("injected map failure".to_string()));
        }
        let Some(buffer) = self.buffers.get(&name) else {
            self.stats.failed_maps += 1;
            return Err(MapError::Failed(format!("no buffer named {name}")));
        };
        if buffer.map_type != expected {
            self.stats.failed_maps += 1;
            return Err(MapError::Failed(format!(
                "{} is not mappable for {:?}",
                buffer.debug_name, expected
            )));
        }
        if buffer.busy {
            self.stats.stalls += 1;
            logwise::warn_sync!(
                "Mapping {name} while the GPU still uses it",
                name = logwise::privacy::LogIt(&buffer.debug_name)
            );
        }
        self.stats.maps += 1;
        Ok(())
    }

    fn framebuffer_status(&self, name: u32) -> FramebufferStatus {
        if self.faults.incomplete_framebuffers {
            return FramebufferStatus::MissingAttachment;
        }
        let Some(fb) = self.framebuffers.get(&name) else {
            return FramebufferStatus::MissingAttachment;
        };
        match self.textures.get(&fb.color) {
            None => FramebufferStatus::MissingAttachment,
            Some(t) if !t.render_target => FramebufferStatus::NotRenderable,
            Some(t) if t.width == 0 || t.height == 0 => FramebufferStatus::ZeroSized,
            Some(_) => FramebufferStatus::Complete,
        }
    }

    fn color_attachment(&self, framebuffer: u32) -> Option<&TextureStorage> {
        let fb = self.framebuffers.get(&framebuffer)?;
        self.textures.get(&fb.color)
    }
}

/**
A [TransferDevice] with no GPU behind it.

```
use pixel_transfer::imp::{SoftwareDevice, TransferDevice};
use pixel_transfer::bindings::buffer_access::MapType;

let device = SoftwareDevice::new();
let layout = device.staging_layout(4, 4);
let buffer = device.create_staging_buffer(MapType::Write, &layout, "demo").unwrap();
device.write_staging(&buffer, |bytes| bytes.fill(1)).unwrap();
device.delete_staging_buffer(buffer);
assert_eq!(device.stats().live_buffers, 0);
```
*/
#[derive(Debug, Default)]
pub struct SoftwareDevice {
    state: Mutex<State>,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` map calls fail.
    pub fn inject_map_failures(&self, count: u32) {
        self.state.lock().unwrap().faults.failing_maps = count;
    }

    /// After `count` more successful staging allocations, allocations fail.
    pub fn inject_allocation_failure_after(&self, count: u32) {
        self.state.lock().unwrap().faults.allocations_before_failure = Some(count);
    }

    pub fn clear_allocation_failure(&self) {
        self.state.lock().unwrap().faults.allocations_before_failure = None;
    }

    /// Every framebuffer reports as incomplete while set.
    pub fn force_incomplete_framebuffers(&self, incomplete: bool) {
        self.state.lock().unwrap().faults.incomplete_framebuffers = incomplete;
    }

    pub fn stats(&self) -> DeviceStats {
        let state = self.state.lock().unwrap();
        DeviceStats {
            live_buffers: state.buffers.len(),
            live_textures: state.textures.len(),
            live_framebuffers: state.framebuffers.len(),
            frames: state.frame,
            ..state.stats
        }
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.state.lock().unwrap().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state.lock().unwrap().journal.clear();
    }

    /// Contents of a texture, tightly packed.
    pub fn texture_pixels(&self, texture: &SoftwareTexture) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        state
            .textures
            .get(&texture.name)
            .map(|t| t.pixels.clone())
            .unwrap_or_default()
    }

    /// Contents of a framebuffer's color attachment, tightly packed.
    pub fn framebuffer_pixels(&self, framebuffer: &SoftwareFramebuffer) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        state
            .color_attachment(framebuffer.name)
            .map(|t| t.pixels.clone())
            .unwrap_or_default()
    }

    /// Replaces a framebuffer's color attachment as if something had rendered into it.
    pub fn fill_framebuffer(&self, framebuffer: &SoftwareFramebuffer, pixel: Unorm4) {
        let mut state = self.state.lock().unwrap();
        let Some(color) = state.framebuffers.get(&framebuffer.name).map(|f| f.color) else {
            return;
        };
        if let Some(texture) = state.textures.get_mut(&color) {
            for px in texture.pixels.chunks_exact_mut(4) {
                px.copy_from_slice(&pixel.to_bytes());
            }
        }
    }
}

fn sample_pass(src: &TextureStorage, dst: &mut TextureStorage, effect: Effect) {
    let (sw, sh) = (src.width as usize, src.height as usize);
    let (dw, dh) = (dst.width as usize, dst.height as usize);
    for y in 0..dh {
        let sy = y * sh / dh;
        for x in 0..dw {
            let sx = x * sw / dw;
            let s = (sy * sw + sx) * 4;
            let texel = Unorm4::from_bytes([
                src.pixels[s],
                src.pixels[s + 1],
                src.pixels[s + 2],
                src.pixels[s + 3],
            ]);
            let out = match effect {
                Effect::Copy => texel,
                Effect::Grayscale => texel.grayscale(),
            };
            let d = (y * dw + x) * 4;
            dst.pixels[d..d + 4].copy_from_slice(&out.to_bytes());
        }
    }
}

impl TransferDevice for SoftwareDevice {
    type Buffer = SoftwareBuffer;
    type Texture = SoftwareTexture;
    type Framebuffer = SoftwareFramebuffer;

    fn staging_layout(&self, width: u32, height: u32) -> StagingLayout {
        StagingLayout::tight(width, height)
    }

    fn create_staging_buffer(
        &self,
        map_type: MapType,
        layout: &StagingLayout,
        debug_name: &str,
    ) -> Result<Self::Buffer, Error> {
        let mut state = self.state.lock().unwrap();
        if layout.byte_len() == 0 {
            return Err(Error::ZeroSized(debug_name.to_string()));
        }
        match state.faults.allocations_before_failure {
            Some(0) => {
                return Err(Error::Allocation {
                    debug_name: debug_name.to_string(),
                    byte_len: layout.byte_len(),
                });
            }
            Some(n) => state.faults.allocations_before_failure = Some(n - 1),
            None => {}
        }
        let name = state.gen_name();
        state.buffers.insert(
            name,
            BufferStorage {
                map_type,
                bytes: vec![0; layout.byte_len()],
                busy: false,
                debug_name: debug_name.to_string(),
            },
        );
        Ok(SoftwareBuffer { name })
    }

    fn delete_staging_buffer(&self, buffer: Self::Buffer) {
        let mut state = self.state.lock().unwrap();
        if state.buffers.remove(&buffer.name).is_none() {
            state.stats.invalid_deletes += 1;
            logwise::warn_sync!("Deleting unknown buffer {name}", name = buffer.name);
        }
    }

    fn create_texture(
        &self,
        config: &TextureConfig<'_>,
        initial: &[u8],
    ) -> Result<Self::Texture, Error> {
        if config.width == 0 || config.height == 0 {
            return Err(Error::ZeroSized(config.debug_name.to_string()));
        }
        let pixels = if initial.is_empty() {
            vec![0; config.byte_len()]
        } else if initial.len() == config.byte_len() {
            initial.to_vec()
        } else {
            return Err(Error::SizeMismatch {
                expected: config.byte_len(),
                actual: initial.len(),
            });
        };
        let mut state = self.state.lock().unwrap();
        let name = state.gen_name();
        state.textures.insert(
            name,
            TextureStorage {
                width: config.width,
                height: config.height,
                render_target: config.render_target,
                pixels,
            },
        );
        Ok(SoftwareTexture { name })
    }

    fn delete_texture(&self, texture: Self::Texture) {
        let mut state = self.state.lock().unwrap();
        if state.textures.remove(&texture.name).is_none() {
            state.stats.invalid_deletes += 1;
            logwise::warn_sync!("Deleting unknown texture {name}", name = texture.name);
        }
    }

    fn write_texture(&self, texture: &Self::Texture, pixels: &[u8]) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        let Some(storage) = state.textures.get_mut(&texture.name) else {
            return Err(Error::Unknown(format!("texture {}", texture.name)));
        };
        if storage.pixels.len() != pixels.len() {
            return Err(Error::SizeMismatch {
                expected: storage.pixels.len(),
                actual: pixels.len(),
            });
        }
        storage.pixels.copy_from_slice(pixels);
        Ok(())
    }

    fn create_framebuffer(&self, color: &Self::Texture) -> Result<Self::Framebuffer, Error> {
        let mut state = self.state.lock().unwrap();
        let name = state.gen_name();
        state
            .framebuffers
            .insert(name, FramebufferStorage { color: color.name });
        Ok(SoftwareFramebuffer { name })
    }

    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer) {
        let mut state = self.state.lock().unwrap();
        if state.framebuffers.remove(&framebuffer.name).is_none() {
            state.stats.invalid_deletes += 1;
        }
    }

    fn framebuffer_status(&self, framebuffer: &Self::Framebuffer) -> FramebufferStatus {
        self.state.lock().unwrap().framebuffer_status(framebuffer.name)
    }

    fn framebuffer_extent(&self, framebuffer: &Self::Framebuffer) -> (u32, u32) {
        let state = self.state.lock().unwrap();
        state
            .color_attachment(framebuffer.name)
            .map(|t| (t.width, t.height))
            .unwrap_or((0, 0))
    }

    fn copy_staging_to_texture(
        &self,
        buffer: &Self::Buffer,
        layout: &StagingLayout,
        texture: &Self::Texture,
    ) -> Result<(), MapError> {
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        let Some(src) = state.buffers.get_mut(&buffer.name) else {
            return Err(MapError::Failed(format!("no buffer named {}", buffer.name)));
        };
        let Some(dst) = state.textures.get_mut(&texture.name) else {
            return Err(MapError::Failed(format!("no texture named {}", texture.name)));
        };
        if (dst.width, dst.height) != (layout.width, layout.height) {
            return Err(MapError::Failed(format!(
                "texture is {}x{}, staging is {}x{}",
                dst.width, dst.height, layout.width, layout.height
            )));
        }
        layout.copy_rows_out(&src.bytes, &mut dst.pixels)?;
        src.busy = true;
        state.record(JournalOp::TextureFromStaging, buffer.name);
        Ok(())
    }

    fn write_staging<F: FnOnce(&mut [u8])>(
        &self,
        buffer: &Self::Buffer,
        write: F,
    ) -> Result<(), MapError> {
        let mut state = self.state.lock().unwrap();
        state.begin_map(buffer.name, MapType::Write)?;
        let storage = state
            .buffers
            .get_mut(&buffer.name)
            .ok_or(MapError::Failed("buffer vanished".to_string()))?;
        //invalidated: previous contents are gone
        storage.bytes.fill(0);
        write(&mut storage.bytes);
        state.record(JournalOp::StagingWrite, buffer.name);
        Ok(())
    }

    fn read_framebuffer_to_staging(
        &self,
        framebuffer: &Self::Framebuffer,
        buffer: &Self::Buffer,
        layout: &StagingLayout,
    ) -> Result<(), MapError> {
        let mut state = self.state.lock().unwrap();
        let status = state.framebuffer_status(framebuffer.name);
        if !status.is_complete() {
            return Err(MapError::Failed(format!("framebuffer is {status:?}")));
        }
        let state = &mut *state;
        let Some(color) = state.framebuffers.get(&framebuffer.name).map(|f| f.color) else {
            return Err(MapError::Failed("framebuffer vanished".to_string()));
        };
        let Some(src) = state.textures.get(&color) else {
            return Err(MapError::Failed("attachment vanished".to_string()));
        };
        let Some(dst) = state.buffers.get_mut(&buffer.name) else {
            return Err(MapError::Failed(format!("no buffer named {}", buffer.name)));
        };
        if (src.width, src.height) != (layout.width, layout.height) {
            return Err(MapError::Failed(format!(
                "framebuffer is {}x{}, staging is {}x{}",
                src.width, src.height, layout.width, layout.height
            )));
        }
        layout.copy_rows_in(&src.pixels, &mut dst.bytes)?;
        dst.busy = true;
        state.record(JournalOp::FramebufferToStaging, buffer.name);
        Ok(())
    }

    fn read_staging<F: FnOnce(&[u8])>(
        &self,
        buffer: &Self::Buffer,
        read: F,
    ) -> Result<(), MapError> {
        let mut state = self.state.lock().unwrap();
        state.begin_map(buffer.name, MapType::Read)?;
        state.record(JournalOp::StagingRead, buffer.name);
        let storage = state
            .buffers
            .get(&buffer.name)
            .ok_or(MapError::Failed("buffer vanished".to_string()))?;
        read(&storage.bytes);
        Ok(())
    }

    fn read_pixels_blocking(
        &self,
        framebuffer: &Self::Framebuffer,
        dst: &mut [u8],
    ) -> Result<(), MapError> {
        let state = self.state.lock().unwrap();
        let status = state.framebuffer_status(framebuffer.name);
        if !status.is_complete() {
            return Err(MapError::Failed(format!("framebuffer is {status:?}")));
        }
        let src = state
            .color_attachment(framebuffer.name)
            .ok_or(MapError::Failed("attachment vanished".to_string()))?;
        if src.pixels.len() != dst.len() {
            return Err(MapError::Failed(format!(
                "expected {} bytes, destination holds {}",
                src.pixels.len(),
                dst.len()
            )));
        }
        dst.copy_from_slice(&src.pixels);
        Ok(())
    }

    fn draw(&self, pass: &PassDescriptor<'_, Self>) {
        let mut state = self.state.lock().unwrap();
        let status = state.framebuffer_status(pass.target.name);
        if !status.is_complete() {
            logwise::warn_sync!(
                "Skipping pass {name}: target is {status}",
                name = logwise::privacy::LogIt(&pass.name),
                status = logwise::privacy::LogIt(&status)
            );
            return;
        }
        let Some(color) = state.framebuffers.get(&pass.target.name).map(|f| f.color) else {
            return;
        };
        let Some(src) = state.textures.get(&pass.source.name) else {
            logwise::warn_sync!(
                "Skipping pass {name}: no source texture",
                name = logwise::privacy::LogIt(&pass.name)
            );
            return;
        };
        //the source may be the target's own attachment
        let src = TextureStorage {
            width: src.width,
            height: src.height,
            render_target: src.render_target,
            pixels: src.pixels.clone(),
        };
        if let Some(dst) = state.textures.get_mut(&color) {
            sample_pass(&src, dst, pass.effect);
        }
        state.stats.draws += 1;
    }

    fn end_frame(&self) {
        let mut state = self.state.lock().unwrap();
        for buffer in state.buffers.values_mut() {
            buffer.busy = false;
        }
        state.frame += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Unorm4 = Unorm4 {
        r: 255,
        g: 0,
        b: 0,
        a: 255,
    };

    #[test]
    fn busy_until_end_frame() {
        let device = SoftwareDevice::new();
        let layout = device.staging_layout(2, 2);
        let buffer = device
            .create_staging_buffer(MapType::Write, &layout, "upload")
            .unwrap();
        let texture = device
            .create_texture(&TextureConfig::new(2, 2, "tex"), &[])
            .unwrap();
        device
            .copy_staging_to_texture(&buffer, &layout, &texture)
            .unwrap();
        device.write_staging(&buffer, |_| {}).unwrap();
        assert_eq!(device.stats().stalls, 1);

        device
            .copy_staging_to_texture(&buffer, &layout, &texture)
            .unwrap();
        device.end_frame();
        device.write_staging(&buffer, |_| {}).unwrap();
        assert_eq!(device.stats().stalls, 1);
    }

    #[test]
    fn injected_map_failures_are_counted() {
        let device = SoftwareDevice::new();
        let layout = device.staging_layout(1, 1);
        let buffer = device
            .create_staging_buffer(MapType::Read, &layout, "download")
            .unwrap();
        device.inject_map_failures(2);
        assert!(device.read_staging(&buffer, |_| {}).is_err());
        assert!(device.read_staging(&buffer, |_| {}).is_err());
        assert!(device.read_staging(&buffer, |_| {}).is_ok());
        let stats = device.stats();
        assert_eq!(stats.failed_maps, 2);
        assert_eq!(stats.maps, 1);
    }

    #[test]
    fn wrong_direction_fails() {
        let device = SoftwareDevice::new();
        let layout = device.staging_layout(1, 1);
        let buffer = device
            .create_staging_buffer(MapType::Read, &layout, "download")
            .unwrap();
        let err = device.write_staging(&buffer, |_| {}).unwrap_err();
        assert!(matches!(err, MapError::Failed(_)));
    }

    #[test]
    fn allocation_failure_after_n() {
        let device = SoftwareDevice::new();
        let layout = device.staging_layout(1, 1);
        device.inject_allocation_failure_after(1);
        let ok = device.create_staging_buffer(MapType::Write, &layout, "a");
        assert!(ok.is_ok());
        let err = device.create_staging_buffer(MapType::Write, &layout, "b");
        assert!(matches!(err, Err(Error::Allocation { .. })));
    }

    #[test]
    fn double_delete_is_counted_not_fatal() {
        let device = SoftwareDevice::new();
        let layout = device.staging_layout(1, 1);
        let buffer = device
            .create_staging_buffer(MapType::Write, &layout, "a")
            .unwrap();
        let name = buffer.name();
        device.delete_staging_buffer(buffer);
        device.delete_staging_buffer(SoftwareBuffer { name });
        assert_eq!(device.stats().invalid_deletes, 1);
    }

    #[test]
    fn grayscale_pass_keeps_alpha_and_orientation() {
        let device = SoftwareDevice::new();
        let mut initial = vec![0u8; 2 * 2 * 4];
        //top-left red, everything else transparent black
        initial[..4].copy_from_slice(&RED.to_bytes());
        let source = device
            .create_texture(&TextureConfig::new(2, 2, "src"), &initial)
            .unwrap();
        let target = device
            .create_texture(&TextureConfig::new(2, 2, "dst").render_target(), &[])
            .unwrap();
        let fb = device.create_framebuffer(&target).unwrap();
        device.draw(&PassDescriptor::new("gray", &source, &fb, Effect::Grayscale));
        let out = device.framebuffer_pixels(&fb);
        assert_eq!(&out[..4], &[76, 76, 76, 255]);
        assert_eq!(&out[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn non_render_target_is_incomplete() {
        let device = SoftwareDevice::new();
        let texture = device
            .create_texture(&TextureConfig::new(2, 2, "plain"), &[])
            .unwrap();
        let fb = device.create_framebuffer(&texture).unwrap();
        assert_eq!(device.framebuffer_status(&fb), FramebufferStatus::NotRenderable);
        device.fill_framebuffer(&fb, RED);
        let mut dst = vec![0; 16];
        assert!(device.read_pixels_blocking(&fb, &mut dst).is_err());
    }
}
