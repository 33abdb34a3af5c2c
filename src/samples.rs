// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Small self-contained GPU samples built on [TransferDevice].

Each sample is independent: it owns its textures and framebuffers, and is driven through the
[Sample] trait by whatever hosts the render loop.  [SampleKind] maps the numeric sample ids
used by the host to constructors.

```
use std::sync::Arc;
use pixel_transfer::imp::{SoftwareDevice, TransferDevice};
use pixel_transfer::samples::SampleKind;

let device = Arc::new(SoftwareDevice::new());
let mut sample = SampleKind::from_id(201).unwrap().create::<SoftwareDevice>();
sample.init(&device).unwrap();
sample.destroy();
```
*/

pub mod fbo;
pub mod pbo;
pub mod shared_image;
pub mod texture_map;

use crate::bindings::transfer_pool::InitError;
use crate::bindings::visible_to::TextureConfig;
use crate::imp::{self, TransferDevice};
use crate::pixel_formats::PixelBuffer;
use std::sync::Arc;

pub use fbo::FboSample;
pub use pbo::{PboOptions, PboSample};
pub use shared_image::SharedImage;
pub use texture_map::TextureMapSample;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("no image loaded")]
    NoImage,
    #[error(transparent)]
    Device(#[from] imp::Error),
    #[error(transparent)]
    TransferPool(#[from] InitError),
    #[error("off-screen framebuffer is not complete ({0:?})")]
    IncompleteFramebuffer(imp::FramebufferStatus),
}

/**
A GPU sample.

`init` creates GPU resources, `draw` renders one frame into `screen`, `destroy` releases
everything.  The remaining hooks are optional and default to doing nothing.
*/
pub trait Sample<D: TransferDevice> {
    fn init(&mut self, device: &Arc<D>) -> Result<(), SampleError>;

    fn draw(&mut self, screen: &D::Framebuffer);

    fn destroy(&mut self);

    /// Hands the sample an image to display.  Copied; the caller keeps `image`.
    fn load_image(&mut self, _image: &PixelBuffer) {}

    fn set_touch_location(&mut self, _x: f32, _y: f32) {}

    /// The image slot shared with loader threads, for samples that have one.
    fn shared_image(&self) -> Option<SharedImage> {
        None
    }
}

/// Sample ids understood by [SampleKind::from_id].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SampleKind {
    TextureMap = 201,
    Fbo = 204,
    Pbo = 218,
}

impl SampleKind {
    pub const ALL: [SampleKind; 3] = [SampleKind::TextureMap, SampleKind::Fbo, SampleKind::Pbo];

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }

    pub const fn id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleKind::TextureMap => "texture_map",
            SampleKind::Fbo => "fbo",
            SampleKind::Pbo => "pbo",
        }
    }

    pub fn create<D: TransferDevice + 'static>(self) -> Box<dyn Sample<D>> {
        match self {
            SampleKind::TextureMap => Box::new(TextureMapSample::<D>::new()),
            SampleKind::Fbo => Box::new(FboSample::<D>::new()),
            SampleKind::Pbo => Box::new(PboSample::<D>::new(PboOptions::default())),
        }
    }
}

/// A texture mirroring a CPU image, recreated when the image changes size.
#[derive(Debug)]
pub(crate) struct ImageTexture<D: TransferDevice> {
    texture: D::Texture,
    width: u32,
    height: u32,
}

impl<D: TransferDevice> ImageTexture<D> {
    pub(crate) fn texture(&self) -> &D::Texture {
        &self.texture
    }

    /// Brings `slot` up to date with `image`, creating the texture on first use.
    pub(crate) fn sync(
        device: &D,
        slot: &mut Option<Self>,
        image: &PixelBuffer,
        debug_name: &str,
    ) -> Result<(), imp::Error> {
        if let Some(current) = slot.as_ref()
            && (current.width, current.height) == (image.width(), image.height())
        {
            return device.write_texture(&current.texture, image.as_bytes());
        }
        if let Some(stale) = slot.take() {
            device.delete_texture(stale.texture);
        }
        let config = TextureConfig::new(image.width(), image.height(), debug_name);
        let texture = device.create_texture(&config, image.as_bytes())?;
        *slot = Some(ImageTexture {
            texture,
            width: image.width(),
            height: image.height(),
        });
        Ok(())
    }

    pub(crate) fn release(self, device: &D) {
        device.delete_texture(self.texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for kind in SampleKind::ALL {
            assert_eq!(SampleKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(SampleKind::from_id(200), None);
        assert_eq!(SampleKind::Pbo.id(), 218);
    }
}
