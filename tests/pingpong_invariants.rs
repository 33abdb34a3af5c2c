// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Frame-level behavior of the staging ping-pong, checked on the software device.

use pixel_transfer::bindings::forward::UploadError;
use pixel_transfer::bindings::reverse::DownloadError;
use pixel_transfer::bindings::transfer_pool::TransferPool;
use pixel_transfer::bindings::visible_to::{TextureConfig, TransferConfig};
use pixel_transfer::images::FrameDriver;
use pixel_transfer::imp::software::{JournalOp, SoftwareFramebuffer, SoftwareTexture};
use pixel_transfer::imp::{MapError, SoftwareDevice, TransferDevice};
use pixel_transfer::multibuffer::{FrameIndex, Slot};
use pixel_transfer::pixel_formats::{PixelBuffer, Unorm4};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

const W: u32 = 8;
const H: u32 = 6;

struct Rig {
    device: Arc<SoftwareDevice>,
    driver: FrameDriver<SoftwareDevice>,
    texture: SoftwareTexture,
    framebuffer: SoftwareFramebuffer,
}

fn rig() -> Rig {
    let device = Arc::new(SoftwareDevice::new());
    let pool = TransferPool::new(device.clone(), TransferConfig::new(W, H, "rig")).unwrap();
    let texture = device
        .create_texture(&TextureConfig::new(W, H, "uploaded"), &[])
        .unwrap();
    let target = device
        .create_texture(&TextureConfig::new(W, H, "target").render_target(), &[])
        .unwrap();
    let framebuffer = device.create_framebuffer(&target).unwrap();
    Rig {
        device,
        driver: FrameDriver::new(pool),
        texture,
        framebuffer,
    }
}

/// A color unique to frame `n`.
fn upload_color(n: u64) -> Unorm4 {
    Unorm4 {
        r: n as u8 * 10,
        g: 1,
        b: 2,
        a: 255,
    }
}

fn screen_color(n: u64) -> Unorm4 {
    Unorm4 {
        r: 3,
        g: n as u8 * 10,
        b: 4,
        a: 255,
    }
}

fn texture_is(rig: &Rig, color: Unorm4) -> bool {
    let pixels = PixelBuffer::new(W, H, rig.device.texture_pixels(&rig.texture)).unwrap();
    pixels.pixels().all(|p| p == color)
}

#[test]
fn gpu_and_cpu_never_share_a_buffer_within_a_frame() {
    let mut rig = rig();
    for n in 0..12 {
        rig.device.fill_framebuffer(&rig.framebuffer, screen_color(n));
        let mut frame = rig.driver.begin_frame();
        frame.upload(&rig.texture, &PixelBuffer::filled(W, H, upload_color(n)));
        frame.download(&rig.framebuffer).unwrap();
        frame.finish();
    }

    let mut by_frame: BTreeMap<u64, (HashSet<u32>, HashSet<u32>)> = BTreeMap::new();
    for entry in rig.device.journal() {
        let (gpu, cpu) = by_frame.entry(entry.frame).or_default();
        if entry.op.is_gpu() {
            gpu.insert(entry.buffer);
        } else {
            cpu.insert(entry.buffer);
        }
    }
    assert_eq!(by_frame.len(), 12);
    for (frame, (gpu, cpu)) in &by_frame {
        assert!(gpu.is_disjoint(cpu), "frame {frame} aliases {gpu:?} / {cpu:?}");
    }
    //what the GPU used in frame N, the CPU maps in frame N+1
    for (frame, (gpu, _)) in &by_frame {
        if let Some((_, next_cpu)) = by_frame.get(&(frame + 1)) {
            assert!(gpu.is_subset(next_cpu), "frame {frame}: {gpu:?} / {next_cpu:?}");
        }
    }
    assert_eq!(rig.device.stats().stalls, 0);
}

#[test]
fn slots_follow_frame_parity() {
    let mut rig = rig();
    for n in 0..6u64 {
        let mut frame = rig.driver.begin_frame();
        let upload = frame
            .upload(&rig.texture, &PixelBuffer::filled(W, H, upload_color(n)))
            .clone();
        let download = frame.download(&rig.framebuffer).unwrap().clone();
        frame.finish();

        let index = FrameIndex::new(n);
        let (slot, next) = if n % 2 == 0 {
            (Slot::A, Slot::B)
        } else {
            (Slot::B, Slot::A)
        };
        assert_eq!(index.slot(), slot);
        assert_eq!(index.next_slot(), next);

        assert_eq!(upload.staged, Some(next));
        assert_eq!(download.issued, Some(slot));
        if n == 0 {
            //nothing staged or read yet
            assert_eq!(upload.sourced, None);
            assert_eq!(download.retrieved, None);
        } else {
            assert_eq!(upload.sourced, Some(slot));
            assert_eq!(download.retrieved, Some(next));
        }
    }
}

#[test]
fn both_directions_lag_one_frame() {
    let mut rig = rig();
    let untouched = Unorm4::default();
    for n in 0..8u64 {
        rig.device.fill_framebuffer(&rig.framebuffer, screen_color(n));
        let mut frame = rig.driver.begin_frame();
        frame.upload(&rig.texture, &PixelBuffer::filled(W, H, upload_color(n)));
        frame.download(&rig.framebuffer).unwrap();
        frame.finish();

        if n == 0 {
            assert!(texture_is(&rig, untouched));
            assert!(rig.driver.latest_download().is_none());
            continue;
        }
        assert!(texture_is(&rig, upload_color(n - 1)), "frame {n}");
        let latest = rig.driver.latest_download().unwrap();
        assert_eq!(latest.source_frame, FrameIndex::new(n - 1));
        assert!(latest.pixels.pixels().all(|p| p == screen_color(n - 1)));
    }
}

#[test]
fn failed_staging_write_keeps_texture() {
    let mut rig = rig();
    let mut reports = Vec::new();
    for n in 0..6u64 {
        if n == 3 {
            //the upload write is the first map of the frame
            rig.device.inject_map_failures(1);
        }
        let mut frame = rig.driver.begin_frame();
        reports.push(
            frame
                .upload(&rig.texture, &PixelBuffer::filled(W, H, upload_color(n)))
                .clone(),
        );
        frame.finish();

        match n {
            3 | 4 => assert!(texture_is(&rig, upload_color(2)), "frame {n}"),
            5 => assert!(texture_is(&rig, upload_color(4))),
            _ => {}
        }
    }
    assert_eq!(reports[3].staged, None);
    assert!(matches!(
        reports[3].error,
        Some(UploadError::Stage(MapError::Failed(_)))
    ));
    //nothing staged for frame 4 to source from
    assert_eq!(reports[4].sourced, None);
    assert_eq!(reports[4].error, None);
    assert_eq!(reports[5].sourced, Some(Slot::B));
    assert_eq!(rig.device.stats().failed_maps, 1);
}

#[test]
fn failed_download_map_keeps_previous_frame() {
    let mut rig = rig();
    for n in 0..8u64 {
        rig.device.fill_framebuffer(&rig.framebuffer, screen_color(n));
        let mut frame = rig.driver.begin_frame();
        if n == 6 {
            rig.device.inject_map_failures(1);
        }
        let report = frame.download(&rig.framebuffer).unwrap().clone();
        frame.finish();

        if n == 0 {
            assert!(rig.driver.latest_download().is_none());
            continue;
        }
        let latest = rig.driver.latest_download().unwrap();
        match n {
            6 => {
                assert!(report.error.is_some());
                assert_eq!(report.retrieved, None);
                //the read for this frame still went out
                assert_eq!(report.issued, Some(Slot::A));
                assert_eq!(latest.source_frame, FrameIndex::new(4));
                assert!(latest.pixels.pixels().all(|p| p == screen_color(4)));
            }
            _ => assert_eq!(latest.source_frame, FrameIndex::new(n - 1)),
        }
    }
}

#[test]
fn aborted_downloads_never_surface_older_reads() {
    let mut rig = rig();
    let mut reports = Vec::new();
    for n in 0..5u64 {
        rig.device.fill_framebuffer(&rig.framebuffer, screen_color(n));
        rig.device.force_incomplete_framebuffers(n == 1 || n == 2);
        let mut frame = rig.driver.begin_frame();
        reports.push(frame.download(&rig.framebuffer).cloned().map_err(Clone::clone));
        frame.finish();
    }
    assert!(reports[1].is_err());
    assert!(reports[2].is_err());
    //frame 0's read is two frames old by now
    let third = reports[3].as_ref().unwrap();
    assert_eq!(third.issued, Some(Slot::B));
    assert_eq!(third.retrieved, None);

    let fourth = reports[4].as_ref().unwrap();
    assert_eq!(fourth.retrieved, Some(Slot::B));
    let latest = rig.driver.latest_download().unwrap();
    assert_eq!(latest.source_frame, FrameIndex::new(3));
    assert!(latest.pixels.pixels().all(|p| p == screen_color(3)));
}

#[test]
fn skipped_downloads_discard_older_reads() {
    let mut rig = rig();
    for n in 0..5u64 {
        rig.device.fill_framebuffer(&rig.framebuffer, screen_color(n));
        let mut frame = rig.driver.begin_frame();
        if n == 1 || n == 2 {
            frame.finish();
            continue;
        }
        let report = frame.download(&rig.framebuffer).unwrap().clone();
        frame.finish();
        match n {
            0 | 3 => {
                assert_eq!(report.retrieved, None, "frame {n}");
                assert!(rig.driver.latest_download().is_none(), "frame {n}");
            }
            _ => {
                let latest = rig.driver.latest_download().unwrap();
                assert_eq!(latest.source_frame, FrameIndex::new(3));
                assert!(latest.pixels.pixels().all(|p| p == screen_color(3)));
            }
        }
    }
}

#[test]
fn incomplete_framebuffer_skips_download() {
    let mut rig = rig();
    rig.device.force_incomplete_framebuffers(true);
    let result = rig
        .driver
        .pool_mut()
        .download(&rig.framebuffer, FrameIndex::ZERO);
    assert!(matches!(
        result,
        Err(DownloadError::FramebufferIncomplete(_))
    ));
    assert!(
        rig.device
            .journal()
            .iter()
            .all(|e| e.op != JournalOp::FramebufferToStaging)
    );
}

#[test]
fn mismatched_sizes_are_rejected() {
    let mut rig = rig();
    let mut frame = rig.driver.begin_frame();
    let report = frame
        .upload(&rig.texture, &PixelBuffer::filled(W + 1, H, upload_color(0)))
        .clone();
    assert_eq!(report.staged, None);
    assert!(matches!(
        report.error,
        Some(UploadError::DimensionMismatch { .. })
    ));
    frame.finish();

    let other = rig
        .device
        .create_texture(&TextureConfig::new(W, H + 2, "other").render_target(), &[])
        .unwrap();
    let other_fb = rig.device.create_framebuffer(&other).unwrap();
    let mut frame = rig.driver.begin_frame();
    let err = frame.download(&other_fb).unwrap_err().clone();
    frame.finish();
    assert_eq!(
        err,
        DownloadError::DimensionMismatch {
            width: W,
            height: H,
            actual_width: W,
            actual_height: H + 2,
        }
    );
}

#[test]
fn teardown_is_idempotent() {
    let mut rig = rig();
    for n in 0..3 {
        let mut frame = rig.driver.begin_frame();
        frame.upload(&rig.texture, &PixelBuffer::filled(W, H, upload_color(n)));
        frame.download(&rig.framebuffer).unwrap();
        frame.finish();
    }
    assert_eq!(rig.device.stats().live_buffers, 4);
    rig.driver.destroy();
    rig.driver.destroy();
    assert!(rig.driver.pool().is_destroyed());
    let stats = rig.device.stats();
    assert_eq!(stats.live_buffers, 0);
    assert_eq!(stats.invalid_deletes, 0);

    //a destroyed pool reports instead of touching freed buffers
    let mut frame = rig.driver.begin_frame();
    let upload = frame
        .upload(&rig.texture, &PixelBuffer::filled(W, H, upload_color(0)))
        .clone();
    assert_eq!(upload.error, Some(UploadError::Destroyed));
    assert_eq!(
        frame.download(&rig.framebuffer).unwrap_err(),
        &DownloadError::Destroyed
    );
    frame.finish();
    drop(rig.driver);
    assert_eq!(rig.device.stats().invalid_deletes, 0);
}
