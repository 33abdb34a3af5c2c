// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The staging-buffer sample.

Per frame: the loaded image goes up through the upload staging pair (with a moving stripe
overlay), a grayscale pass renders it off-screen, the off-screen framebuffer comes back down
through the download staging pair, and the off-screen texture is drawn to the screen.

Either direction can be switched to the direct path ([TransferDevice::write_texture] and
[TransferDevice::read_pixels_blocking]) for comparison.
*/

use crate::bindings::forward::StripeOverlay;
use crate::bindings::reverse::DownloadedFrame;
use crate::bindings::transfer_pool::TransferPool;
use crate::bindings::visible_to::{TextureConfig, TransferConfig};
use crate::images::frame::{FrameDriver, FrameReport};
use crate::images::render_pass::{Effect, PassDescriptor};
use crate::imp::TransferDevice;
use crate::multibuffer::FrameIndex;
use crate::pixel_formats::PixelBuffer;
use crate::pixel_formats::png_support::DumpConfig;
use crate::samples::fbo::OffscreenTarget;
use crate::samples::{Sample, SampleError, SharedImage};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PboOptions {
    /// Upload through staging buffers.  Otherwise the texture is written directly.
    pub staged_upload: bool,
    /// Download through staging buffers.  Otherwise the framebuffer is read blocking.
    pub staged_download: bool,
    pub overlay: Option<StripeOverlay>,
    pub dump: Option<DumpConfig>,
}

impl Default for PboOptions {
    fn default() -> Self {
        PboOptions {
            staged_upload: true,
            staged_download: true,
            overlay: Some(StripeOverlay::default()),
            dump: None,
        }
    }
}

#[derive(Debug)]
struct PboResources<D: TransferDevice> {
    device: Arc<D>,
    driver: FrameDriver<D>,
    image_texture: D::Texture,
    offscreen: Option<OffscreenTarget<D>>,
}

/// See the [module documentation](self).
#[derive(Debug)]
pub struct PboSample<D: TransferDevice> {
    options: PboOptions,
    image: SharedImage,
    resources: Option<PboResources<D>>,
    last_report: Option<FrameReport>,
    blocking_download: Option<PixelBuffer>,
}

impl<D: TransferDevice> PboSample<D> {
    pub fn new(options: PboOptions) -> Self {
        PboSample {
            options,
            image: SharedImage::new(),
            resources: None,
            last_report: None,
            blocking_download: None,
        }
    }

    pub fn options(&self) -> &PboOptions {
        &self.options
    }

    pub fn is_initialized(&self) -> bool {
        self.resources.is_some()
    }

    /// The frame the next draw will run.
    pub fn frame_index(&self) -> Option<FrameIndex> {
        self.resources.as_ref().map(|r| r.driver.frame_index())
    }

    /// What the most recent draw did.
    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    /// Most recent frame retrieved through the download staging pair.
    pub fn latest_download(&self) -> Option<&DownloadedFrame> {
        self.resources.as_ref()?.driver.latest_download()
    }

    /// Most recent frame read through the blocking path.
    pub fn blocking_download(&self) -> Option<&PixelBuffer> {
        self.blocking_download.as_ref()
    }

    pub fn transfer_pool(&self) -> Option<&TransferPool<D>> {
        self.resources.as_ref().map(|r| r.driver.pool())
    }

    pub fn offscreen_framebuffer(&self) -> Option<&D::Framebuffer> {
        let offscreen = self.resources.as_ref()?.offscreen.as_ref()?;
        Some(&offscreen.framebuffer)
    }

    fn create_resources(&self, device: &Arc<D>) -> Result<PboResources<D>, SampleError> {
        let Some((width, height, bytes)) = self
            .image
            .with_image(|image| image.map(|i| (i.width(), i.height(), i.as_bytes().to_vec())))
        else {
            return Err(SampleError::NoImage);
        };
        let mut transfer = TransferConfig::new(width, height, "pbo");
        transfer.overlay = self.options.overlay;
        transfer.dump = self.options.dump.clone();
        let pool = TransferPool::new(device.clone(), transfer)?;

        let image_texture =
            device.create_texture(&TextureConfig::new(width, height, "pbo_image"), &bytes)?;
        let offscreen = match OffscreenTarget::new(device.as_ref(), width, height, "pbo_offscreen")
        {
            Ok(offscreen) => offscreen,
            Err(e) => {
                device.delete_texture(image_texture);
                return Err(e);
            }
        };
        Ok(PboResources {
            device: device.clone(),
            driver: FrameDriver::new(pool),
            image_texture,
            offscreen: Some(offscreen),
        })
    }
}

impl<D: TransferDevice> Sample<D> for PboSample<D> {
    /// Creates the pool and textures sized for the loaded image.  A second call does nothing.
    fn init(&mut self, device: &Arc<D>) -> Result<(), SampleError> {
        if self.resources.is_some() {
            return Ok(());
        }
        let resources = self.create_resources(device).inspect_err(|e| {
            logwise::error_sync!(
                "PboSample init failed: {e}",
                e = logwise::privacy::LogIt(e)
            );
        })?;
        self.resources = Some(resources);
        Ok(())
    }

    fn draw(&mut self, screen: &D::Framebuffer) {
        let Some(resources) = self.resources.as_mut() else {
            return;
        };
        let PboResources {
            device,
            driver,
            image_texture,
            offscreen,
        } = resources;
        let Some(offscreen) = offscreen.as_ref() else {
            return;
        };
        let mut frame = driver.begin_frame();

        if self.options.staged_upload {
            self.image.with_image(|image| {
                if let Some(image) = image {
                    frame.upload(image_texture, image);
                }
            });
        } else {
            let written = self.image.with_image(|image| match image {
                Some(image) => device.write_texture(image_texture, image.as_bytes()),
                None => Ok(()),
            });
            if let Err(e) = written {
                logwise::warn_sync!(
                    "Direct texture upload failed: {e}",
                    e = logwise::privacy::LogIt(&e)
                );
            }
        }

        device.draw(&PassDescriptor::new(
            "pbo_offscreen",
            image_texture,
            &offscreen.framebuffer,
            Effect::Grayscale,
        ));

        if self.options.staged_download {
            //failures are logged by the download path
            let _ = frame.download(&offscreen.framebuffer);
        } else {
            let mut bytes = vec![0; PixelBuffer::byte_len_for(offscreen.width, offscreen.height)];
            let interval = logwise::perfwarn_begin!("blocking framebuffer read");
            let read = device.read_pixels_blocking(&offscreen.framebuffer, &mut bytes);
            drop(interval);
            match read.map_err(|e| e.to_string()).and_then(|()| {
                PixelBuffer::new(offscreen.width, offscreen.height, bytes)
                    .map_err(|e| e.to_string())
            }) {
                Ok(pixels) => self.blocking_download = Some(pixels),
                Err(e) => logwise::warn_sync!(
                    "Blocking read failed: {e}",
                    e = logwise::privacy::LogIt(&e)
                ),
            }
        }

        device.draw(&PassDescriptor::new(
            "pbo_screen",
            &offscreen.texture,
            screen,
            Effect::Copy,
        ));
        self.last_report = Some(frame.finish());
    }

    fn destroy(&mut self) {
        let Some(mut resources) = self.resources.take() else {
            return;
        };
        resources.driver.destroy();
        if let Some(offscreen) = resources.offscreen.take() {
            offscreen.release(&resources.device);
        }
        resources.device.delete_texture(resources.image_texture);
        self.blocking_download = None;
    }

    fn load_image(&mut self, image: &PixelBuffer) {
        self.image.store(image);
    }

    fn shared_image(&self) -> Option<SharedImage> {
        Some(self.image.clone())
    }
}

impl<D: TransferDevice> Drop for PboSample<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
