// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pixel types moved through the transfer pipeline.
//!
//! Every staging buffer, texture and framebuffer in this crate is RGBA, 8 bits per channel,
//! tightly packed on the CPU side.  The types here give that byte layout a name:
//!
//! - [`Unorm4`] - one pixel, `#[repr(C)]`, 4 bytes
//! - [`RGBA8UNorm`] - the format marker
//! - [`PixelBuffer`] - one frame of pixels in system memory, row 0 first
//!
//! # Examples
//!
//! ```
//! use pixel_transfer::pixel_formats::{PixelBuffer, Unorm4};
//!
//! let red = Unorm4 { r: 255, g: 0, b: 0, a: 255 };
//! let frame = PixelBuffer::filled(4, 2, red);
//! assert_eq!(frame.pixel(3, 1), red);
//! assert_eq!(frame.as_bytes().len(), 4 * 2 * 4);
//! ```

pub mod png_support;

use crate::pixel_formats::sealed::{PixelFormat, ReprC};
use std::fmt::Debug;

pub(crate) mod sealed {
    /// Sealed so only formats whose byte layout the backends understand can be named.
    pub trait PixelFormat: std::fmt::Debug + Send + Sync + 'static {
        const BYTES_PER_PIXEL: u8;
        type CPixel: Clone + Copy + std::fmt::Debug + Send + ReprC;
    }

    /// No padding, no uninitialized bytes, stable field order.
    ///
    /// # Safety
    /// Implementors are reinterpreted as byte slices.
    pub unsafe trait ReprC {}
}

/// Views a slice of C-compatible pixels as raw bytes.
pub fn pixel_as_bytes<T: ReprC>(t: &[T]) -> &[u8] {
    //safe because T is repr(C) with no padding (checked by ReprC)
    unsafe { std::slice::from_raw_parts(t.as_ptr() as *const u8, std::mem::size_of_val(t)) }
}

/// One RGBA8 pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(C)]
pub struct Unorm4 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

unsafe impl ReprC for Unorm4 {}

impl Unorm4 {
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Unorm4 {
            r: bytes[0],
            g: bytes[1],
            b: bytes[2],
            a: bytes[3],
        }
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Rec. 601 luma, `0.299 r + 0.587 g + 0.114 b`, rounded.
    pub fn luma(self) -> u8 {
        let l = 0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32;
        l.round().clamp(0.0, 255.0) as u8
    }

    /// Gray with the same luma.  Alpha is kept.
    pub fn grayscale(self) -> Self {
        let l = self.luma();
        Unorm4 {
            r: l,
            g: l,
            b: l,
            a: self.a,
        }
    }
}

/// 4-channel 8-bit normalized format.  The only format the pipeline moves.
#[derive(Debug, Clone)]
pub struct RGBA8UNorm;

impl PixelFormat for RGBA8UNorm {
    const BYTES_PER_PIXEL: u8 = 4;
    type CPixel = Unorm4;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PixelBufferError {
    #[error("{width}x{height} RGBA needs {expected} bytes, got {actual}")]
    WrongLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("zero-sized image")]
    ZeroSized,
}

/**
One tightly packed RGBA8 frame in system memory.

Row 0 is the first row in memory.  The pipeline never flips rows, so row 0 of a
downloaded frame is whatever the GPU wrote to row 0 of the framebuffer.
*/
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, bytes: Vec<u8>) -> Result<Self, PixelBufferError> {
        if width == 0 || height == 0 {
            return Err(PixelBufferError::ZeroSized);
        }
        let expected = Self::byte_len_for(width, height);
        if bytes.len() != expected {
            return Err(PixelBufferError::WrongLength {
                width,
                height,
                expected,
                actual: bytes.len(),
            });
        }
        Ok(PixelBuffer {
            width,
            height,
            bytes,
        })
    }

    /// A frame where every pixel is `pixel`.
    ///
    /// # Panics
    /// If either dimension is zero.
    pub fn filled(width: u32, height: u32, pixel: Unorm4) -> Self {
        assert!(width > 0 && height > 0, "zero-sized image");
        let pixels = vec![pixel; width as usize * height as usize];
        PixelBuffer {
            width,
            height,
            bytes: pixel_as_bytes(&pixels).to_vec(),
        }
    }

    pub(crate) const fn byte_len_for(width: u32, height: u32) -> usize {
        width as usize * height as usize * RGBA8UNorm::BYTES_PER_PIXEL as usize
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Unorm4 {
        assert!(x < self.width && y < self.height, "({x},{y}) out of bounds");
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let mut px = [0; 4];
        px.copy_from_slice(&self.bytes[offset..offset + 4]);
        Unorm4::from_bytes(px)
    }

    /// One row of bytes.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * 4;
        let offset = y as usize * stride;
        &self.bytes[offset..offset + stride]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn pixels(&self) -> impl Iterator<Item = Unorm4> + '_ {
        self.bytes
            .chunks_exact(4)
            .map(|c| Unorm4::from_bytes([c[0], c[1], c[2], c[3]]))
    }
}

impl Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_length_rejected() {
        let err = PixelBuffer::new(2, 2, vec![0; 15]).unwrap_err();
        assert_eq!(
            err,
            PixelBufferError::WrongLength {
                width: 2,
                height: 2,
                expected: 16,
                actual: 15
            }
        );
        assert_eq!(
            PixelBuffer::new(0, 5, vec![]).unwrap_err(),
            PixelBufferError::ZeroSized
        );
    }

    #[test]
    fn luma_of_primaries() {
        let red = Unorm4 {
            r: 255,
            g: 0,
            b: 0,
            a: 255,
        };
        assert_eq!(red.luma(), 76);
        let white = Unorm4 {
            r: 255,
            g: 255,
            b: 255,
            a: 7,
        };
        let gray = white.grayscale();
        assert_eq!(gray, Unorm4 { r: 255, g: 255, b: 255, a: 7 });
    }

    #[test]
    fn pixel_addressing_is_row_major() {
        let mut bytes = vec![0u8; 3 * 2 * 4];
        //pixel (1, 1)
        bytes[(3 + 1) * 4] = 42;
        let buf = PixelBuffer::new(3, 2, bytes).unwrap();
        assert_eq!(buf.pixel(1, 1).r, 42);
        assert_eq!(buf.row(1)[4], 42);
        assert_eq!(buf.pixels().filter(|p| p.r == 42).count(), 1);
    }
}
