// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Off-screen rendering: image -> grayscale pass into a framebuffer -> screen.

use crate::bindings::visible_to::TextureConfig;
use crate::images::render_pass::{Effect, PassDescriptor};
use crate::imp::{self, TransferDevice};
use crate::pixel_formats::PixelBuffer;
use crate::samples::{ImageTexture, Sample, SampleError, SharedImage};
use std::sync::Arc;

/// A render-target texture with a framebuffer around it.
#[derive(Debug)]
pub(crate) struct OffscreenTarget<D: TransferDevice> {
    pub(crate) texture: D::Texture,
    pub(crate) framebuffer: D::Framebuffer,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl<D: TransferDevice> OffscreenTarget<D> {
    pub(crate) fn new(
        device: &D,
        width: u32,
        height: u32,
        debug_name: &str,
    ) -> Result<Self, SampleError> {
        let config = TextureConfig::new(width, height, debug_name).render_target();
        let texture = device.create_texture(&config, &[])?;
        let framebuffer = match device.create_framebuffer(&texture) {
            Ok(framebuffer) => framebuffer,
            Err(e) => {
                device.delete_texture(texture);
                return Err(e.into());
            }
        };
        let status = device.framebuffer_status(&framebuffer);
        if !status.is_complete() {
            device.delete_framebuffer(framebuffer);
            device.delete_texture(texture);
            return Err(SampleError::IncompleteFramebuffer(status));
        }
        Ok(OffscreenTarget {
            texture,
            framebuffer,
            width,
            height,
        })
    }

    pub(crate) fn release(self, device: &D) {
        device.delete_framebuffer(self.framebuffer);
        device.delete_texture(self.texture);
    }
}

/// Renders the loaded image in grayscale off-screen, then draws the result to the screen.
#[derive(Debug)]
pub struct FboSample<D: TransferDevice> {
    device: Option<Arc<D>>,
    texture: Option<ImageTexture<D>>,
    offscreen: Option<OffscreenTarget<D>>,
    image: SharedImage,
}

impl<D: TransferDevice> FboSample<D> {
    pub fn new() -> Self {
        FboSample {
            device: None,
            texture: None,
            offscreen: None,
            image: SharedImage::new(),
        }
    }

    /// The off-screen framebuffer, once an image has been drawn.
    pub fn offscreen_framebuffer(&self) -> Option<&D::Framebuffer> {
        self.offscreen.as_ref().map(|o| &o.framebuffer)
    }

    fn prepare(&mut self) -> Result<bool, SampleError> {
        let Some(device) = self.device.as_ref() else {
            return Ok(false);
        };
        let texture = &mut self.texture;
        let size = self.image.with_image(|image| match image {
            Some(image) => ImageTexture::sync(device.as_ref(), texture, image, "fbo_image")
                .map(|_| Some((image.width(), image.height()))),
            None => Ok::<_, imp::Error>(None),
        })?;
        let Some((width, height)) = size else {
            return Ok(false);
        };
        if let Some(offscreen) = &self.offscreen
            && (offscreen.width, offscreen.height) == (width, height)
        {
            return Ok(true);
        }
        if let Some(stale) = self.offscreen.take() {
            stale.release(device);
        }
        let offscreen = OffscreenTarget::new(device.as_ref(), width, height, "fbo_offscreen")?;
        self.offscreen = Some(offscreen);
        Ok(true)
    }
}

impl<D: TransferDevice> Default for FboSample<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: TransferDevice> Sample<D> for FboSample<D> {
    fn init(&mut self, device: &Arc<D>) -> Result<(), SampleError> {
        if self.device.is_none() {
            self.device = Some(device.clone());
        }
        Ok(())
    }

    fn draw(&mut self, screen: &D::Framebuffer) {
        match self.prepare() {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                logwise::error_sync!(
                    "FboSample can't prepare: {e}",
                    e = logwise::privacy::LogIt(&e)
                );
                return;
            }
        }
        let (Some(device), Some(texture), Some(offscreen)) =
            (&self.device, &self.texture, &self.offscreen)
        else {
            return;
        };
        device.draw(&PassDescriptor::new(
            "fbo_offscreen",
            texture.texture(),
            &offscreen.framebuffer,
            Effect::Grayscale,
        ));
        device.draw(&PassDescriptor::new(
            "fbo_screen",
            &offscreen.texture,
            screen,
            Effect::Copy,
        ));
    }

    fn destroy(&mut self) {
        let Some(device) = self.device.take() else {
            return;
        };
        if let Some(texture) = self.texture.take() {
            texture.release(&device);
        }
        if let Some(offscreen) = self.offscreen.take() {
            offscreen.release(&device);
        }
    }

    fn load_image(&mut self, image: &PixelBuffer) {
        self.image.store(image);
    }

    fn shared_image(&self) -> Option<SharedImage> {
        Some(self.image.clone())
    }
}

impl<D: TransferDevice> Drop for FboSample<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::SoftwareDevice;
    use crate::pixel_formats::Unorm4;

    #[test]
    fn screen_shows_grayscale_image() {
        let device = Arc::new(SoftwareDevice::new());
        let screen_texture = device
            .create_texture(&TextureConfig::new(3, 3, "screen").render_target(), &[])
            .unwrap();
        let screen = device.create_framebuffer(&screen_texture).unwrap();

        let mut sample = FboSample::<SoftwareDevice>::new();
        sample.init(&device).unwrap();
        sample.load_image(&PixelBuffer::filled(
            3,
            3,
            Unorm4 {
                r: 0,
                g: 255,
                b: 0,
                a: 200,
            },
        ));
        sample.draw(&screen);
        let out = device.framebuffer_pixels(&screen);
        //0.587 * 255 = 149.7
        assert_eq!(&out[..4], &[150, 150, 150, 200]);

        sample.destroy();
        let stats = device.stats();
        assert_eq!(stats.live_textures, 1);
        assert_eq!(stats.live_framebuffers, 1);
    }

    #[test]
    fn incomplete_offscreen_is_reported() {
        let device = Arc::new(SoftwareDevice::new());
        device.force_incomplete_framebuffers(true);
        let err = OffscreenTarget::new(&*device, 2, 2, "broken").unwrap_err();
        assert!(matches!(err, SampleError::IncompleteFramebuffer(_)));
        assert_eq!(device.stats().live_textures, 0);
    }
}
