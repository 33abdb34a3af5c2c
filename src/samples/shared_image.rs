// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! An image slot written by a loader thread and read by the render thread.

use crate::pixel_formats::PixelBuffer;
use std::sync::{Arc, Mutex};

/// Cloning shares the slot.  The lock is held only while an image is copied in or read.
#[derive(Debug, Clone, Default)]
pub struct SharedImage {
    inner: Arc<Mutex<Option<PixelBuffer>>>,
}

impl SharedImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored image with a copy of `image`.
    pub fn store(&self, image: &PixelBuffer) {
        let mut guard = self.inner.lock().unwrap();
        match guard.as_mut() {
            Some(existing)
                if existing.width() == image.width() && existing.height() == image.height() =>
            {
                existing.as_bytes_mut().copy_from_slice(image.as_bytes());
            }
            _ => *guard = Some(image.clone()),
        }
    }

    /// Runs `f` on the stored image under the lock.
    pub fn with_image<R>(&self, f: impl FnOnce(Option<&PixelBuffer>) -> R) -> R {
        let guard = self.inner.lock().unwrap();
        f(guard.as_ref())
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.lock().unwrap().is_some()
    }

    pub fn clear(&self) {
        *self.inner.lock().unwrap() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_formats::Unorm4;

    #[test]
    fn store_replaces_and_resizes() {
        let shared = SharedImage::new();
        assert!(!shared.is_loaded());
        shared.store(&PixelBuffer::filled(2, 2, Unorm4 { r: 1, g: 2, b: 3, a: 4 }));
        shared.store(&PixelBuffer::filled(2, 2, Unorm4 { r: 9, g: 9, b: 9, a: 9 }));
        assert_eq!(shared.with_image(|i| i.unwrap().pixel(1, 1).r), 9);
        shared.store(&PixelBuffer::filled(3, 1, Unorm4::default()));
        assert_eq!(shared.with_image(|i| i.map(|i| i.width())), Some(3));
        shared.clear();
        assert!(!shared.is_loaded());
    }
}
