// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Backend seam.
//!
//! Everything above this module talks to the GPU through [TransferDevice].  Two backends
//! ship with the crate: [software], which runs on the CPU and is what the tests drive, and
//! (with the `backend_wgpu` feature) a wgpu backend.

use crate::bindings::buffer_access::MapType;
use crate::bindings::visible_to::TextureConfig;
use crate::images::render_pass::PassDescriptor;
use std::fmt::Debug;

pub mod software;

#[cfg(feature = "backend_wgpu")]
pub mod wgpu;

pub use software::SoftwareDevice;

#[cfg(feature = "backend_wgpu")]
pub use self::wgpu::WgpuDevice;

/// Errors creating GPU resources.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Can't allocate {debug_name} ({byte_len} bytes)")]
    Allocation { debug_name: String, byte_len: usize },
    #[error("{0} has zero size")]
    ZeroSized(String),
    #[error("Expected {expected} bytes of pixel data, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("Texture {0} was not created as a render target")]
    NotRenderable(String),
    #[error("No such resource: {0}")]
    Unknown(String),
    #[cfg(feature = "backend_wgpu")]
    #[error("No such adapter")]
    NoSuchAdapter,
    #[cfg(feature = "backend_wgpu")]
    #[error("{0}")]
    RequestDevice(#[from] ::wgpu::RequestDeviceError),
}

/// A per-frame transfer that did not happen.  Always recoverable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// The GPU has not released the buffer yet.
    #[error("Buffer is busy")]
    Busy,
    /// The mapping call itself failed (out of memory, wrong access, lost device...).
    #[error("Mapping failed: {0}")]
    Failed(String),
}

/// Result of a framebuffer completeness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    MissingAttachment,
    NotRenderable,
    ZeroSized,
}

impl FramebufferStatus {
    pub const fn is_complete(self) -> bool {
        matches!(self, FramebufferStatus::Complete)
    }
}

/**
Memory layout of one staging buffer.

Backends may require a row pitch larger than `width * 4`; pixel buffers on the CPU side are
always tightly packed, so copies in and out go row by row.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingLayout {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

impl StagingLayout {
    /// A layout with no row padding.
    pub const fn tight(width: u32, height: u32) -> Self {
        StagingLayout {
            width,
            height,
            bytes_per_row: width * 4,
        }
    }

    /// A layout whose rows are padded up to a multiple of `alignment`.
    pub const fn aligned(width: u32, height: u32, alignment: u32) -> Self {
        let unaligned = width * 4;
        let bytes_per_row = unaligned.div_ceil(alignment) * alignment;
        StagingLayout {
            width,
            height,
            bytes_per_row,
        }
    }

    pub const fn tight_bytes_per_row(&self) -> usize {
        self.width as usize * 4
    }

    /// Bytes of staging memory, padding included.
    pub const fn byte_len(&self) -> usize {
        self.bytes_per_row as usize * self.height as usize
    }

    /// Bytes of tightly packed pixel data.
    pub const fn tight_byte_len(&self) -> usize {
        self.tight_bytes_per_row() * self.height as usize
    }

    /// Copies tightly packed rows from `src` into (possibly padded) staging memory.
    pub fn copy_rows_in(&self, src: &[u8], staging: &mut [u8]) -> Result<(), MapError> {
        self.check_lengths(src.len(), staging.len())?;
        let row = self.tight_bytes_per_row();
        if row == self.bytes_per_row as usize {
            staging[..src.len()].copy_from_slice(src);
            return Ok(());
        }
        for (y, src_row) in src.chunks_exact(row).enumerate() {
            let offset = y * self.bytes_per_row as usize;
            staging[offset..offset + row].copy_from_slice(src_row);
        }
        Ok(())
    }

    /// Copies (possibly padded) staging memory into tightly packed rows in `dst`.
    pub fn copy_rows_out(&self, staging: &[u8], dst: &mut [u8]) -> Result<(), MapError> {
        self.check_lengths(dst.len(), staging.len())?;
        let row = self.tight_bytes_per_row();
        if row == self.bytes_per_row as usize {
            dst.copy_from_slice(&staging[..dst.len()]);
            return Ok(());
        }
        for (y, dst_row) in dst.chunks_exact_mut(row).enumerate() {
            let offset = y * self.bytes_per_row as usize;
            dst_row.copy_from_slice(&staging[offset..offset + row]);
        }
        Ok(())
    }

    fn check_lengths(&self, tight: usize, staging: usize) -> Result<(), MapError> {
        if tight != self.tight_byte_len() {
            return Err(MapError::Failed(format!(
                "expected {expected} bytes of pixels, got {tight}",
                expected = self.tight_byte_len()
            )));
        }
        if staging < self.byte_len() {
            return Err(MapError::Failed(format!(
                "staging memory is {staging} bytes, needs {needed}",
                needed = self.byte_len()
            )));
        }
        Ok(())
    }

    /// Mutable access to row `y` of staging memory, padding excluded.
    pub fn row_mut<'a>(&self, staging: &'a mut [u8], y: u32) -> &'a mut [u8] {
        let offset = y as usize * self.bytes_per_row as usize;
        &mut staging[offset..offset + self.tight_bytes_per_row()]
    }
}

/**
A graphics context able to run the pixel transfer pipeline.

All calls are expected from the one thread that owns the context.  None of the per-frame
calls block: a resource the GPU still holds is reported as [MapError::Busy] and the caller
moves on.
*/
pub trait TransferDevice: Debug {
    type Buffer: Debug;
    type Texture: Debug;
    type Framebuffer: Debug;

    /// Layout the backend uses for a staging buffer of one `width` x `height` frame.
    fn staging_layout(&self, width: u32, height: u32) -> StagingLayout;

    fn create_staging_buffer(
        &self,
        map_type: MapType,
        layout: &StagingLayout,
        debug_name: &str,
    ) -> Result<Self::Buffer, Error>;

    fn delete_staging_buffer(&self, buffer: Self::Buffer);

    /// Creates an RGBA8 texture.  `initial` is tightly packed, or empty for zeroed contents.
    fn create_texture(&self, config: &TextureConfig<'_>, initial: &[u8])
    -> Result<Self::Texture, Error>;

    fn delete_texture(&self, texture: Self::Texture);

    /// Replaces the contents of `texture` straight from system memory, bypassing staging.
    fn write_texture(&self, texture: &Self::Texture, pixels: &[u8]) -> Result<(), Error>;

    /// Attaches `color` to a new framebuffer.
    fn create_framebuffer(&self, color: &Self::Texture) -> Result<Self::Framebuffer, Error>;

    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer);

    fn framebuffer_status(&self, framebuffer: &Self::Framebuffer) -> FramebufferStatus;

    /// Width and height of the framebuffer's color attachment.
    fn framebuffer_extent(&self, framebuffer: &Self::Framebuffer) -> (u32, u32);

    /// Records a texture update sourcing from `buffer`.  GPU-internal, returns immediately.
    fn copy_staging_to_texture(
        &self,
        buffer: &Self::Buffer,
        layout: &StagingLayout,
        texture: &Self::Texture,
    ) -> Result<(), MapError>;

    /// Invalidates `buffer`, maps it write-only, runs `write` on the mapped bytes, unmaps.
    fn write_staging<F: FnOnce(&mut [u8])>(
        &self,
        buffer: &Self::Buffer,
        write: F,
    ) -> Result<(), MapError>;

    /// Records a read of `framebuffer` into `buffer`.  Returns immediately.
    fn read_framebuffer_to_staging(
        &self,
        framebuffer: &Self::Framebuffer,
        buffer: &Self::Buffer,
        layout: &StagingLayout,
    ) -> Result<(), MapError>;

    /// Maps `buffer` read-only, runs `read` on the mapped bytes, unmaps.
    fn read_staging<F: FnOnce(&[u8])>(&self, buffer: &Self::Buffer, read: F)
    -> Result<(), MapError>;

    /// Reads `framebuffer` straight into system memory, waiting for the GPU.
    ///
    /// This is the path staging buffers exist to avoid; it is kept for comparison.
    fn read_pixels_blocking(
        &self,
        framebuffer: &Self::Framebuffer,
        dst: &mut [u8],
    ) -> Result<(), MapError>;

    /// Records a full-screen pass.
    fn draw(&self, pass: &PassDescriptor<'_, Self>);

    /// Submits everything recorded this frame.
    fn end_frame(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_layout_rounds_rows_up() {
        let layout = StagingLayout::aligned(63, 2, 256);
        assert_eq!(layout.bytes_per_row, 256);
        assert_eq!(layout.byte_len(), 512);
        assert_eq!(layout.tight_byte_len(), 63 * 4 * 2);

        let exact = StagingLayout::aligned(64, 2, 256);
        assert_eq!(exact, StagingLayout::tight(64, 2));
    }

    #[test]
    fn padded_rows_survive_in_and_out() {
        let layout = StagingLayout::aligned(3, 2, 16);
        let src: Vec<u8> = (0..24).collect();
        let mut staging = vec![0xAA; layout.byte_len()];
        layout.copy_rows_in(&src, &mut staging).unwrap();
        //padding untouched
        assert_eq!(&staging[12..16], &[0xAA; 4]);
        assert_eq!(&staging[16..28], &src[12..24]);

        let mut out = vec![0; layout.tight_byte_len()];
        layout.copy_rows_out(&staging, &mut out).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn wrong_sized_rows_are_errors() {
        let layout = StagingLayout::aligned(3, 2, 16);
        let mut staging = vec![0; layout.byte_len()];
        assert!(matches!(
            layout.copy_rows_in(&[0; 4], &mut staging),
            Err(MapError::Failed(_))
        ));
        let mut out = vec![0; layout.tight_byte_len()];
        assert!(matches!(
            layout.copy_rows_out(&staging[..8], &mut out),
            Err(MapError::Failed(_))
        ));
        //nothing was written
        assert!(out.iter().all(|b| *b == 0));
    }

    #[test]
    fn row_mut_excludes_padding() {
        let layout = StagingLayout::aligned(1, 3, 8);
        let mut staging = vec![0u8; layout.byte_len()];
        layout.row_mut(&mut staging, 2).fill(9);
        assert_eq!(&staging[16..20], &[9; 4]);
        assert_eq!(&staging[20..24], &[0; 4]);
    }
}
