// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Resource declarations for textures and transfer pools.
//!
//! When creating GPU resources, it's important to declare how they will be used so the
//! backend can choose usage flags up front.  This module provides the two configuration
//! types the crate takes:
//!
//! - [`TextureConfig`] - Declares the size of a texture and whether it can be rendered to
//! - [`TransferConfig`] - Declares the frame size of a [crate::bindings::transfer_pool::TransferPool]
//!   together with its optional CPU-side extras
//!
//! # Examples
//!
//! ```
//! use pixel_transfer::bindings::visible_to::{TextureConfig, TransferConfig};
//! use pixel_transfer::bindings::forward::StripeOverlay;
//!
//! let texture = TextureConfig::new(640, 480, "camera_frame").render_target();
//! assert!(texture.render_target);
//!
//! let transfer = TransferConfig::new(640, 480, "camera_pbo")
//!     .with_overlay(StripeOverlay::default());
//! assert_eq!(transfer.frame_byte_len(), 640 * 480 * 4);
//! ```

use crate::bindings::forward::StripeOverlay;
use crate::pixel_formats::png_support::DumpConfig;

/// Describes a 2D RGBA8 texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureConfig<'a> {
    pub width: u32,
    pub height: u32,
    pub debug_name: &'a str,
    /// The texture may be attached to a framebuffer and rendered into.
    pub render_target: bool,
}

impl<'a> TextureConfig<'a> {
    pub const fn new(width: u32, height: u32, debug_name: &'a str) -> Self {
        TextureConfig {
            width,
            height,
            debug_name,
            render_target: false,
        }
    }

    pub const fn render_target(mut self) -> Self {
        self.render_target = true;
        self
    }

    pub const fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Describes a transfer pool.
///
/// The pool is sized for exactly one frame of RGBA8 pixels at `width` x `height`.
/// It is never resized; a new resolution needs a new pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub width: u32,
    pub height: u32,
    pub debug_name: String,
    /// CPU-side mutation applied in mapped upload memory after each copy.
    pub overlay: Option<StripeOverlay>,
    /// Best-effort dump of each downloaded frame.
    pub dump: Option<DumpConfig>,
}

impl TransferConfig {
    pub fn new(width: u32, height: u32, debug_name: &str) -> Self {
        TransferConfig {
            width,
            height,
            debug_name: debug_name.to_string(),
            overlay: None,
            dump: None,
        }
    }

    pub fn with_overlay(mut self, overlay: StripeOverlay) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn with_dump(mut self, dump: DumpConfig) -> Self {
        self.dump = Some(dump);
        self
    }

    /// Bytes of one tightly packed frame.
    pub const fn frame_byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}
