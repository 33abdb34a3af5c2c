// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Reverse (GPU->CPU) pixel transfer.

Each frame:

1.  A read of the framebuffer into the download buffer in slot `frame % 2` is recorded.
    It returns immediately.
2.  If the buffer in the other slot holds the read issued one frame ago, it is mapped
    read-only, copied out into a [DownloadedFrame] and unmapped.  A read from any earlier
    frame is dropped unread.

Data retrieved during frame N therefore always shows the framebuffer as it was in frame N-1.
The complementary buffer is mapped again every time it holds a new read; nothing from an
earlier mapping is cached.
*/

use crate::imp::{FramebufferStatus, MapError, StagingLayout, TransferDevice};
use crate::multibuffer::{FrameIndex, PingPong, Slot};
use crate::pixel_formats::PixelBuffer;
use crate::pixel_formats::png_support::{self, DumpConfig};
use std::path::PathBuf;

/// Reasons a download was aborted before any read was issued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownloadError {
    #[error("framebuffer is not complete ({0:?})")]
    FramebufferIncomplete(FramebufferStatus),
    #[error("framebuffer is {actual_width}x{actual_height}, pool is {width}x{height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("transfer pool was destroyed")]
    Destroyed,
}

/// Pixels retrieved from a download buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFrame {
    /// Frame in which the read was issued.
    pub source_frame: FrameIndex,
    /// Slot the pixels came from.
    pub slot: Slot,
    pub pixels: PixelBuffer,
}

/// What one download call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub frame: FrameIndex,
    /// Slot the framebuffer read went into.
    pub issued: Option<Slot>,
    /// Slot mapped and copied out this frame.
    pub retrieved: Option<Slot>,
    /// A recoverable failure of the read or the map.
    pub error: Option<MapError>,
    /// File written by the optional dump.
    pub dumped: Option<PathBuf>,
}

/// The download half of a [crate::bindings::transfer_pool::TransferPool].
#[derive(Debug)]
pub struct DownloadPath<D: TransferDevice> {
    buffers: PingPong<D::Buffer>,
    /// Frame whose read went into the slot, until it is consumed.
    issued_in: PingPong<Option<FrameIndex>>,
    layout: StagingLayout,
    dump: Option<DumpConfig>,
    latest: Option<DownloadedFrame>,
    /// Storage of a superseded frame, reused for the next copy.
    spare: Option<Vec<u8>>,
}

impl<D: TransferDevice> DownloadPath<D> {
    pub(crate) fn new(
        buffers: PingPong<D::Buffer>,
        layout: StagingLayout,
        dump: Option<DumpConfig>,
    ) -> Self {
        DownloadPath {
            buffers,
            issued_in: PingPong::new(None, None),
            layout,
            dump,
            latest: None,
            spare: None,
        }
    }

    pub(crate) fn buffer(&self, slot: Slot) -> &D::Buffer {
        &self.buffers[slot]
    }

    pub(crate) fn release(self, device: &D) {
        let [a, b] = self.buffers.into_inner();
        device.delete_staging_buffer(a);
        device.delete_staging_buffer(b);
    }

    /// Most recent successfully retrieved frame.
    pub fn latest(&self) -> Option<&DownloadedFrame> {
        self.latest.as_ref()
    }

    pub fn take_latest(&mut self) -> Option<DownloadedFrame> {
        self.latest.take()
    }

    /**
    Runs one download cycle for `frame` against `framebuffer`.

    Returns `Err` only when the framebuffer can't be read at all, in which case nothing was
    issued.  Map failures leave [Self::latest] as it was.
    */
    pub fn download(
        &mut self,
        device: &D,
        framebuffer: &D::Framebuffer,
        frame: FrameIndex,
    ) -> Result<DownloadReport, DownloadError> {
        let slot = frame.slot();
        let status = device.framebuffer_status(framebuffer);
        if !status.is_complete() {
            //the slot no longer holds a read from the frame before the next one
            self.issued_in[slot] = None;
            logwise::error_sync!(
                "Framebuffer incomplete, skipping download: {status}",
                status = logwise::privacy::LogIt(&status)
            );
            return Err(DownloadError::FramebufferIncomplete(status));
        }
        let (fw, fh) = device.framebuffer_extent(framebuffer);
        if (fw, fh) != (self.layout.width, self.layout.height) {
            let err = DownloadError::DimensionMismatch {
                width: self.layout.width,
                height: self.layout.height,
                actual_width: fw,
                actual_height: fh,
            };
            self.issued_in[slot] = None;
            logwise::error_sync!(
                "Skipping download: {err}",
                err = logwise::privacy::LogIt(&err)
            );
            return Err(err);
        }

        let mut report = DownloadReport {
            frame,
            issued: None,
            retrieved: None,
            error: None,
            dumped: None,
        };

        match device.read_framebuffer_to_staging(framebuffer, &self.buffers[slot], &self.layout) {
            Ok(()) => {
                self.issued_in[slot] = Some(frame);
                report.issued = Some(slot);
            }
            Err(e) => {
                logwise::warn_sync!(
                    "Framebuffer read into slot {slot} failed: {e}",
                    slot = slot.index(),
                    e = logwise::privacy::LogIt(&e)
                );
                self.issued_in[slot] = None;
                report.error = Some(e);
            }
        }

        let next = frame.next_slot();
        let previous = FrameIndex::new(frame.get().wrapping_sub(1));
        match self.issued_in[next] {
            None => return Ok(report),
            Some(source) if source != previous => {
                logwise::warn_sync!(
                    "Discarding read from frame {source} in slot {slot}",
                    source = source.get(),
                    slot = next.index()
                );
                self.issued_in[next] = None;
                return Ok(report);
            }
            Some(_) => {}
        }
        let layout = self.layout;
        let mut bytes = match self.spare.take() {
            Some(bytes) if bytes.len() == layout.tight_byte_len() => bytes,
            _ => vec![0; layout.tight_byte_len()],
        };
        let interval = logwise::perfwarn_begin!("download staging copy");
        let mut copied = Ok(());
        let mapped = device.read_staging(&self.buffers[next], |staging| {
            copied = layout.copy_rows_out(staging, &mut bytes);
        });
        drop(interval);
        let mapped = mapped.and(copied);
        //consumed either way: a failed map does not get a second chance at stale data
        self.issued_in[next] = None;

        match mapped {
            Ok(()) => {
                let pixels = match PixelBuffer::new(layout.width, layout.height, bytes) {
                    Ok(pixels) => pixels,
                    Err(e) => {
                        logwise::error_sync!(
                            "Downloaded frame is malformed: {e}",
                            e = logwise::privacy::LogIt(&e)
                        );
                        return Ok(report);
                    }
                };
                let downloaded = DownloadedFrame {
                    source_frame: previous,
                    slot: next,
                    pixels,
                };
                report.retrieved = Some(next);
                if let Some(dump) = &self.dump {
                    match png_support::dump(dump, next, &downloaded.pixels) {
                        Ok(path) => report.dumped = Some(path),
                        Err(e) => logwise::warn_sync!(
                            "Frame dump failed: {e}",
                            e = logwise::privacy::LogIt(&e)
                        ),
                    }
                }
                if let Some(old) = self.latest.replace(downloaded) {
                    self.spare = Some(old.pixels.into_bytes());
                }
            }
            Err(e) => {
                logwise::warn_sync!(
                    "Mapping download slot {slot} failed, keeping previous frame: {e}",
                    slot = next.index(),
                    e = logwise::privacy::LogIt(&e)
                );
                self.spare = Some(bytes);
                report.error.get_or_insert(e);
            }
        }
        Ok(report)
    }
}
