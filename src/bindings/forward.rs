// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Forward (CPU->GPU) pixel transfer.

Each frame does two things with the two upload staging buffers:

1.  The buffer in slot `frame % 2` was filled by the CPU last frame.  A texture update
    sourcing from it is recorded.  This is a GPU-internal copy and does not block.
2.  The buffer in the other slot is invalidated, mapped write-only, filled with this frame's
    pixels and unmapped.  The GPU picks it up next frame.

So the buffer the CPU writes and the buffer the GPU reads are never the same buffer within
one frame, and the texture shows pixels with one frame of latency.
*/

use crate::imp::{MapError, StagingLayout, TransferDevice};
use crate::multibuffer::{FrameIndex, PingPong, Slot};
use crate::pixel_formats::PixelBuffer;
use rand_xoshiro::Xoshiro256StarStar;
use rand_xoshiro::rand_core::{RngCore, SeedableRng};

/**
A debug overlay written straight into mapped upload memory.

After the frame's pixels are copied, `rows` consecutive rows starting at a random row are
filled with `value` in every channel.  The stripe moves every frame, which makes it easy to
see whether uploads are still flowing.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StripeOverlay {
    pub rows: u32,
    pub value: u8,
    /// Seed for the row generator.  Same seed, same sequence of rows.
    pub seed: u64,
}

impl Default for StripeOverlay {
    fn default() -> Self {
        StripeOverlay {
            rows: 5,
            value: 188,
            seed: 0,
        }
    }
}

impl StripeOverlay {
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Chooses stripe rows for a [StripeOverlay].
#[derive(Debug)]
struct StripeGenerator {
    overlay: StripeOverlay,
    rng: Xoshiro256StarStar,
}

impl StripeGenerator {
    fn new(overlay: StripeOverlay) -> Self {
        StripeGenerator {
            overlay,
            rng: Xoshiro256StarStar::seed_from_u64(overlay.seed),
        }
    }

    /// First stripe row, in `[0, height - rows)`.  `None` if the image is too short.
    fn next_row(&mut self, height: u32) -> Option<u32> {
        if height <= self.overlay.rows {
            return None;
        }
        let span = (height - self.overlay.rows) as u64;
        Some((self.rng.next_u64() % span) as u32)
    }

    fn paint(&self, layout: &StagingLayout, staging: &mut [u8], first_row: u32) {
        for y in first_row..first_row + self.overlay.rows {
            layout.row_mut(staging, y).fill(self.overlay.value);
        }
    }
}

/// Why part of an upload did not happen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("texture update from staging failed: {0}")]
    Source(MapError),
    #[error("staging write failed: {0}")]
    Stage(MapError),
    #[error("pixel buffer is {actual_width}x{actual_height}, pool is {width}x{height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("transfer pool was destroyed")]
    Destroyed,
}

/// What one upload call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub frame: FrameIndex,
    /// Slot the texture update sourced from, if one was recorded.
    pub sourced: Option<Slot>,
    /// Slot written by the CPU, if the write went through.
    pub staged: Option<Slot>,
    /// First row of the stripe overlay written this frame.
    pub stripe_row: Option<u32>,
    pub error: Option<UploadError>,
}

impl UploadReport {
    pub(crate) fn destroyed(frame: FrameIndex) -> Self {
        UploadReport {
            frame,
            sourced: None,
            staged: None,
            stripe_row: None,
            error: Some(UploadError::Destroyed),
        }
    }
}

/// The upload half of a [crate::bindings::transfer_pool::TransferPool].
#[derive(Debug)]
pub struct UploadPath<D: TransferDevice> {
    buffers: PingPong<D::Buffer>,
    /// Whether the slot holds a complete frame the GPU has not consumed yet.
    primed: PingPong<bool>,
    layout: StagingLayout,
    stripes: Option<StripeGenerator>,
}

impl<D: TransferDevice> UploadPath<D> {
    pub(crate) fn new(
        buffers: PingPong<D::Buffer>,
        layout: StagingLayout,
        overlay: Option<StripeOverlay>,
    ) -> Self {
        UploadPath {
            buffers,
            primed: PingPong::new(false, false),
            layout,
            stripes: overlay.map(StripeGenerator::new),
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

    /**
    Runs one upload cycle for `frame`.

    Failures are logged and reported; none of them touch the texture.  If the staging write
    fails, the slot is marked empty so the next frame skips its texture update and the
    texture keeps its current contents.
    */
    pub fn upload(
        &mut self,
        device: &D,
        texture: &D::Texture,
        pixels: &PixelBuffer,
        frame: FrameIndex,
    ) -> UploadReport {
        let mut report = UploadReport {
            frame,
            sourced: None,
            staged: None,
            stripe_row: None,
            error: None,
        };

        let slot = frame.slot();
        if self.primed[slot] {
            match device.copy_staging_to_texture(&self.buffers[slot], &self.layout, texture) {
                Ok(()) => report.sourced = Some(slot),
                Err(e) => {
                    logwise::warn_sync!(
                        "Texture update from slot {slot} failed: {e}",
                        slot = slot.index(),
                        e = logwise::privacy::LogIt(&e)
                    );
                    report.error = Some(UploadError::Source(e));
                }
            }
            self.primed[slot] = false;
        } else {
            logwise::trace_sync!(
                "Slot {slot} has no staged frame; texture unchanged",
                slot = slot.index()
            );
        }

        let next = frame.next_slot();
        if (pixels.width(), pixels.height()) != (self.layout.width, self.layout.height) {
            let err = UploadError::DimensionMismatch {
                width: self.layout.width,
                height: self.layout.height,
                actual_width: pixels.width(),
                actual_height: pixels.height(),
            };
            logwise::warn_sync!(
                "Rejecting upload: {err}",
                err = logwise::privacy::LogIt(&err)
            );
            report.error.get_or_insert(err);
            return report;
        }

        let stripe_row = self
            .stripes
            .as_mut()
            .and_then(|s| s.next_row(self.layout.height));
        let layout = self.layout;
        let stripes = self.stripes.as_ref();
        let interval = logwise::perfwarn_begin!("upload staging copy");
        let mut copied = Ok(());
        let written = device.write_staging(&self.buffers[next], |staging| {
            copied = layout.copy_rows_in(pixels.as_bytes(), staging);
            if let (Ok(()), Some(stripes), Some(row)) = (&copied, stripes, stripe_row) {
                stripes.paint(&layout, staging, row);
            }
        });
        drop(interval);
        let written = written.and(copied);

        match written {
            Ok(()) => {
                self.primed[next] = true;
                report.staged = Some(next);
                report.stripe_row = stripe_row;
            }
            Err(e) => {
                logwise::warn_sync!(
                    "Dropping upload for frame {frame}: {e}",
                    frame = frame.get(),
                    e = logwise::privacy::LogIt(&e)
                );
                self.primed[next] = false;
                report.error.get_or_insert(UploadError::Stage(e));
            }
        }
        report
    }
}
