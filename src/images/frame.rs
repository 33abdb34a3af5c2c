// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Per-frame sequencing of the transfer pool.

A frame is `upload` -> render pass(es) -> `download` -> end.  Ending the frame submits the
device's work and advances the counter, exactly once per [Frame] no matter how many uploads
or downloads happened in it.  The counter is the only thing the two transfer directions
share.
*/

use crate::bindings::forward::UploadReport;
use crate::bindings::reverse::{DownloadError, DownloadReport, DownloadedFrame};
use crate::bindings::transfer_pool::TransferPool;
use crate::imp::TransferDevice;
use crate::multibuffer::FrameIndex;
use crate::pixel_formats::PixelBuffer;
use crate::sys::time::{Duration, Instant};
use std::sync::Arc;

/// Drives a [TransferPool] one frame at a time.
#[derive(Debug)]
pub struct FrameDriver<D: TransferDevice> {
    pool: TransferPool<D>,
    frame: FrameIndex,
}

impl<D: TransferDevice> FrameDriver<D> {
    pub fn new(pool: TransferPool<D>) -> Self {
        FrameDriver {
            pool,
            frame: FrameIndex::ZERO,
        }
    }

    /// The frame the next [Self::begin_frame] will run.
    pub fn frame_index(&self) -> FrameIndex {
        self.frame
    }

    pub fn pool(&self) -> &TransferPool<D> {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut TransferPool<D> {
        &mut self.pool
    }

    pub fn device(&self) -> &Arc<D> {
        self.pool.device()
    }

    pub fn latest_download(&self) -> Option<&DownloadedFrame> {
        self.pool.latest_download()
    }

    pub fn begin_frame(&mut self) -> Frame<'_, D> {
        Frame {
            frame: self.frame,
            started: Instant::now(),
            upload: None,
            download: None,
            finished: false,
            driver: self,
        }
    }

    /// Releases the pool's buffers.  Idempotent.
    pub fn destroy(&mut self) {
        self.pool.destroy();
    }
}

/// Everything one frame did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: FrameIndex,
    pub upload: Option<UploadReport>,
    pub download: Option<Result<DownloadReport, DownloadError>>,
    pub elapsed: Duration,
}

/**
One frame in progress.

Dropping the frame ends it, same as [Frame::finish].
*/
#[derive(Debug)]
pub struct Frame<'a, D: TransferDevice> {
    driver: &'a mut FrameDriver<D>,
    frame: FrameIndex,
    started: Instant,
    upload: Option<UploadReport>,
    download: Option<Result<DownloadReport, DownloadError>>,
    finished: bool,
}

impl<D: TransferDevice> Frame<'_, D> {
    pub fn index(&self) -> FrameIndex {
        self.frame
    }

    pub fn device(&self) -> &Arc<D> {
        self.driver.device()
    }

    pub fn upload(&mut self, texture: &D::Texture, pixels: &PixelBuffer) -> &UploadReport {
        let report = self.driver.pool.upload(texture, pixels, self.frame);
        self.upload.insert(report)
    }

    pub fn download(
        &mut self,
        framebuffer: &D::Framebuffer,
    ) -> Result<&DownloadReport, &DownloadError> {
        let result = self.driver.pool.download(framebuffer, self.frame);
        self.download.insert(result).as_ref()
    }

    pub fn latest_download(&self) -> Option<&DownloadedFrame> {
        self.driver.latest_download()
    }

    pub fn finish(mut self) -> FrameReport {
        self.end()
    }

    fn end(&mut self) -> FrameReport {
        debug_assert!(!self.finished);
        self.finished = true;
        self.driver.device().end_frame();
        self.driver.frame.advance();
        let elapsed = self.started.elapsed();
        let us = elapsed.as_micros() as u64;
        logwise::trace_sync!(
            "Frame {frame} ended after {us}us",
            frame = self.frame.get(),
            us = us
        );
        FrameReport {
            frame: self.frame,
            upload: self.upload.take(),
            download: self.download.take(),
            elapsed,
        }
    }
}

impl<D: TransferDevice> Drop for Frame<'_, D> {
    fn drop(&mut self) {
        if !self.finished {
            self.end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::visible_to::{TextureConfig, TransferConfig};
    use crate::imp::SoftwareDevice;
    use crate::pixel_formats::Unorm4;

    fn driver() -> FrameDriver<SoftwareDevice> {
        let device = Arc::new(SoftwareDevice::new());
        FrameDriver::new(TransferPool::new(device, TransferConfig::new(4, 4, "frame")).unwrap())
    }

    #[test]
    fn counter_advances_once_per_frame() {
        let mut driver = driver();
        {
            let frame = driver.begin_frame();
            assert_eq!(frame.index(), FrameIndex::ZERO);
        }
        let report = driver.begin_frame().finish();
        assert_eq!(report.frame, FrameIndex::new(1));
        assert_eq!(driver.frame_index(), FrameIndex::new(2));
        assert_eq!(driver.device().stats().frames, 2);
    }

    #[test]
    fn repeated_uploads_do_not_advance() {
        let mut driver = driver();
        let device = driver.device().clone();
        let texture = device
            .create_texture(&TextureConfig::new(4, 4, "t"), &[])
            .unwrap();
        let pixels = PixelBuffer::filled(4, 4, Unorm4::default());
        let mut frame = driver.begin_frame();
        frame.upload(&texture, &pixels);
        frame.upload(&texture, &pixels);
        let report = frame.finish();
        assert_eq!(report.frame, FrameIndex::ZERO);
        assert!(report.upload.is_some());
        assert_eq!(driver.frame_index(), FrameIndex::new(1));
        device.delete_texture(texture);
    }
}
