// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Owns the four staging buffers of the pixel transfer pipeline.

Two upload buffers feed [crate::bindings::forward::UploadPath], two download buffers feed
[crate::bindings::reverse::DownloadPath].  The two pairs are disjoint, so an upload and a
download never touch the same buffer.

All four are allocated together and live until [TransferPool::destroy] (or drop).  The pool
is never resized; a new frame size needs a new pool.
*/

use crate::bindings::buffer_access::MapType;
use crate::bindings::forward::{UploadPath, UploadReport};
use crate::bindings::reverse::{DownloadError, DownloadPath, DownloadReport, DownloadedFrame};
use crate::bindings::visible_to::TransferConfig;
use crate::imp::{self, StagingLayout, TransferDevice};
use crate::multibuffer::{FrameIndex, PingPong, Slot};
use crate::pixel_formats::PixelBuffer;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("can't create a {width}x{height} transfer pool")]
    ZeroSized { width: u32, height: u32 },
    #[error("staging allocation failed: {0}")]
    Allocation(#[from] imp::Error),
}

fn allocate_pair<D: TransferDevice>(
    device: &D,
    map_type: MapType,
    layout: &StagingLayout,
    debug_name: &str,
) -> Result<PingPong<D::Buffer>, imp::Error> {
    let a = device.create_staging_buffer(map_type, layout, &format!("{debug_name}_0"))?;
    match device.create_staging_buffer(map_type, layout, &format!("{debug_name}_1")) {
        Ok(b) => Ok(PingPong::new(a, b)),
        Err(e) => {
            device.delete_staging_buffer(a);
            Err(e)
        }
    }
}

/**
Two pairs of one-frame staging buffers.

```
use std::sync::Arc;
use pixel_transfer::bindings::transfer_pool::TransferPool;
use pixel_transfer::bindings::visible_to::TransferConfig;
use pixel_transfer::imp::SoftwareDevice;

let device = Arc::new(SoftwareDevice::new());
let mut pool = TransferPool::new(device.clone(), TransferConfig::new(8, 8, "demo")).unwrap();
assert_eq!(device.stats().live_buffers, 4);
pool.destroy();
pool.destroy();
assert_eq!(device.stats().live_buffers, 0);
```
*/
#[derive(Debug)]
pub struct TransferPool<D: TransferDevice> {
    device: Arc<D>,
    config: TransferConfig,
    layout: StagingLayout,
    upload: Option<UploadPath<D>>,
    download: Option<DownloadPath<D>>,
}

impl<D: TransferDevice> TransferPool<D> {
    /// Allocates all four buffers.  If any allocation fails, the ones already made are released.
    pub fn new(device: Arc<D>, config: TransferConfig) -> Result<Self, InitError> {
        if config.width == 0 || config.height == 0 {
            return Err(InitError::ZeroSized {
                width: config.width,
                height: config.height,
            });
        }
        let layout = device.staging_layout(config.width, config.height);
        let upload = match allocate_pair(
            &*device,
            MapType::Write,
            &layout,
            &format!("{}_upload", config.debug_name),
        ) {
            Ok(upload) => upload,
            Err(e) => {
                logwise::error_sync!(
                    "Transfer pool {name} allocation failed: {e}",
                    name = logwise::privacy::LogIt(&config.debug_name),
                    e = logwise::privacy::LogIt(&e)
                );
                return Err(e.into());
            }
        };
        let download = match allocate_pair(
            &*device,
            MapType::Read,
            &layout,
            &format!("{}_download", config.debug_name),
        ) {
            Ok(download) => download,
            Err(e) => {
                let [a, b] = upload.into_inner();
                device.delete_staging_buffer(a);
                device.delete_staging_buffer(b);
                logwise::error_sync!(
                    "Transfer pool {name} allocation failed: {e}",
                    name = logwise::privacy::LogIt(&config.debug_name),
                    e = logwise::privacy::LogIt(&e)
                );
                return Err(e.into());
            }
        };
        logwise::info_sync!(
            "Transfer pool {name} ready: {w}x{h}, {row} bytes per row",
            name = logwise::privacy::LogIt(&config.debug_name),
            w = config.width,
            h = config.height,
            row = layout.bytes_per_row
        );
        Ok(TransferPool {
            upload: Some(UploadPath::new(upload, layout, config.overlay)),
            download: Some(DownloadPath::new(download, layout, config.dump.clone())),
            device,
            config,
            layout,
        })
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn layout(&self) -> &StagingLayout {
        &self.layout
    }

    pub fn is_destroyed(&self) -> bool {
        self.upload.is_none() && self.download.is_none()
    }

    /// Runs the upload half of `frame`.  See [UploadPath::upload].
    pub fn upload(
        &mut self,
        texture: &D::Texture,
        pixels: &PixelBuffer,
        frame: FrameIndex,
    ) -> UploadReport {
        match &mut self.upload {
            Some(upload) => upload.upload(&self.device, texture, pixels, frame),
            None => UploadReport::destroyed(frame),
        }
    }

    /// Runs the download half of `frame`.  See [DownloadPath::download].
    pub fn download(
        &mut self,
        framebuffer: &D::Framebuffer,
        frame: FrameIndex,
    ) -> Result<DownloadReport, DownloadError> {
        match &mut self.download {
            Some(download) => download.download(&self.device, framebuffer, frame),
            None => Err(DownloadError::Destroyed),
        }
    }

    pub fn latest_download(&self) -> Option<&DownloadedFrame> {
        self.download.as_ref().and_then(|d| d.latest())
    }

    pub fn take_latest_download(&mut self) -> Option<DownloadedFrame> {
        self.download.as_mut().and_then(|d| d.take_latest())
    }

    pub fn upload_buffer(&self, slot: Slot) -> Option<&D::Buffer> {
        self.upload.as_ref().map(|u| u.buffer(slot))
    }

    pub fn download_buffer(&self, slot: Slot) -> Option<&D::Buffer> {
        self.download.as_ref().map(|d| d.buffer(slot))
    }

    /**
    Releases all four buffers.  Calling it again does nothing.

    No fencing happens here: the caller makes sure the GPU is done with the buffers, which
    normal frame pacing does.
    */
    pub fn destroy(&mut self) {
        let upload = self.upload.take();
        let download = self.download.take();
        if upload.is_none() && download.is_none() {
            return;
        }
        if let Some(upload) = upload {
            upload.release(&self.device);
        }
        if let Some(download) = download {
            download.release(&self.device);
        }
        logwise::info_sync!(
            "Transfer pool {name} destroyed",
            name = logwise::privacy::LogIt(&self.config.debug_name)
        );
    }
}

impl<D: TransferDevice> Drop for TransferPool<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::SoftwareDevice;

    #[test]
    fn zero_sized_pool_is_rejected() {
        let device = Arc::new(SoftwareDevice::new());
        let err = TransferPool::new(device.clone(), TransferConfig::new(0, 4, "z")).unwrap_err();
        assert!(matches!(err, InitError::ZeroSized { .. }));
        assert_eq!(device.stats().live_buffers, 0);
    }

    #[test]
    fn partial_allocation_is_released() {
        for fail_after in 0..4 {
            let device = Arc::new(SoftwareDevice::new());
            device.inject_allocation_failure_after(fail_after);
            let err = TransferPool::new(device.clone(), TransferConfig::new(4, 4, "p")).unwrap_err();
            assert!(matches!(err, InitError::Allocation(_)), "{err}");
            assert_eq!(device.stats().live_buffers, 0, "fail_after={fail_after}");
            assert_eq!(device.stats().invalid_deletes, 0);
        }
    }

    #[test]
    fn upload_and_download_pairs_are_disjoint() {
        let device = Arc::new(SoftwareDevice::new());
        let pool = TransferPool::new(device.clone(), TransferConfig::new(4, 4, "d")).unwrap();
        let mut names = Vec::new();
        for slot in [Slot::A, Slot::B] {
            names.push(pool.upload_buffer(slot).unwrap().name());
            names.push(pool.download_buffer(slot).unwrap().name());
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn drop_after_destroy_frees_once() {
        let device = Arc::new(SoftwareDevice::new());
        {
            let mut pool =
                TransferPool::new(device.clone(), TransferConfig::new(4, 4, "t")).unwrap();
            pool.destroy();
            assert!(pool.is_destroyed());
        }
        let stats = device.stats();
        assert_eq!(stats.live_buffers, 0);
        assert_eq!(stats.invalid_deletes, 0);
    }
}
