// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Draws the loaded image to the screen through a texture.

use crate::images::render_pass::{Effect, PassDescriptor};
use crate::imp::TransferDevice;
use crate::pixel_formats::PixelBuffer;
use crate::samples::{ImageTexture, Sample, SampleError, SharedImage};
use std::sync::Arc;

/// Uploads the image straight from system memory every frame, then samples it to the screen.
#[derive(Debug)]
pub struct TextureMapSample<D: TransferDevice> {
    device: Option<Arc<D>>,
    texture: Option<ImageTexture<D>>,
    image: SharedImage,
}

impl<D: TransferDevice> TextureMapSample<D> {
    pub fn new() -> Self {
        TextureMapSample {
            device: None,
            texture: None,
            image: SharedImage::new(),
        }
    }
}

impl<D: TransferDevice> Default for TextureMapSample<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: TransferDevice> Sample<D> for TextureMapSample<D> {
    fn init(&mut self, device: &Arc<D>) -> Result<(), SampleError> {
        if self.device.is_none() {
            self.device = Some(device.clone());
        }
        Ok(())
    }

    fn draw(&mut self, screen: &D::Framebuffer) {
        let Some(device) = self.device.as_ref() else {
            return;
        };
        let texture = &mut self.texture;
        let synced = self.image.with_image(|image| match image {
            Some(image) => {
                ImageTexture::sync(device.as_ref(), texture, image, "texture_map").map(|_| true)
            }
            None => Ok(false),
        });
        match synced {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                logwise::error_sync!(
                    "TextureMapSample can't upload image: {e}",
                    e = logwise::privacy::LogIt(&e)
                );
                return;
            }
        }
        if let Some(texture) = &self.texture {
            device.draw(&PassDescriptor::new(
                "texture_map",
                texture.texture(),
                screen,
                Effect::Copy,
            ));
        }
    }

    fn destroy(&mut self) {
        if let (Some(device), Some(texture)) = (self.device.as_ref(), self.texture.take()) {
            texture.release(device);
        }
        self.device = None;
    }

    fn load_image(&mut self, image: &PixelBuffer) {
        self.image.store(image);
    }

    fn shared_image(&self) -> Option<SharedImage> {
        Some(self.image.clone())
    }
}

impl<D: TransferDevice> Drop for TextureMapSample<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::visible_to::TextureConfig;
    use crate::imp::SoftwareDevice;
    use crate::pixel_formats::Unorm4;

    #[test]
    fn draws_loaded_image() {
        let device = Arc::new(SoftwareDevice::new());
        let screen_texture = device
            .create_texture(&TextureConfig::new(4, 4, "screen").render_target(), &[])
            .unwrap();
        let screen = device.create_framebuffer(&screen_texture).unwrap();

        let mut sample = TextureMapSample::<SoftwareDevice>::new();
        sample.init(&device).unwrap();
        //nothing loaded, nothing drawn
        sample.draw(&screen);
        assert_eq!(device.stats().draws, 0);

        let blue = Unorm4 { r: 0, g: 0, b: 255, a: 255 };
        sample.load_image(&PixelBuffer::filled(2, 2, blue));
        sample.draw(&screen);
        let pixels = PixelBuffer::new(4, 4, device.framebuffer_pixels(&screen)).unwrap();
        assert!(pixels.pixels().all(|p| p == blue));

        sample.destroy();
        sample.destroy();
        assert_eq!(device.stats().live_textures, 1);
        assert_eq!(device.stats().invalid_deletes, 0);
    }
}
