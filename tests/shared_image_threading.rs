// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! A loader thread replacing the image while the render thread draws.

use pixel_transfer::bindings::visible_to::TextureConfig;
use pixel_transfer::imp::{SoftwareDevice, TransferDevice};
use pixel_transfer::pixel_formats::{PixelBuffer, Unorm4};
use pixel_transfer::samples::{PboOptions, PboSample, Sample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const W: u32 = 16;
const H: u32 = 16;

const COLORS: [Unorm4; 2] = [
    Unorm4 {
        r: 255,
        g: 0,
        b: 0,
        a: 255,
    },
    Unorm4 {
        r: 0,
        g: 0,
        b: 255,
        a: 255,
    },
];

#[test]
fn frames_never_mix_two_images() {
    let device = Arc::new(SoftwareDevice::new());
    let screen_texture = device
        .create_texture(&TextureConfig::new(W, H, "screen").render_target(), &[])
        .unwrap();
    let screen = device.create_framebuffer(&screen_texture).unwrap();

    let mut sample = PboSample::<SoftwareDevice>::new(PboOptions {
        overlay: None,
        ..PboOptions::default()
    });
    sample.load_image(&PixelBuffer::filled(W, H, COLORS[0]));
    sample.init(&device).unwrap();

    let shared = sample.shared_image().unwrap();
    let done = Arc::new(AtomicBool::new(false));
    let loader_done = done.clone();
    let loader = thread::Builder::new()
        .name("image_loader".to_string())
        .spawn(move || {
            let mut n = 0usize;
            while !loader_done.load(Ordering::Relaxed) {
                shared.store(&PixelBuffer::filled(W, H, COLORS[n % 2]));
                n += 1;
                thread::yield_now();
            }
            n
        })
        .unwrap();

    let grays = COLORS.map(|c| c.grayscale());
    let mut seen = 0;
    for _ in 0..200 {
        sample.draw(&screen);
        if let Some(latest) = sample.latest_download() {
            let first = latest.pixels.pixel(0, 0);
            assert!(grays.contains(&first), "unexpected pixel {first:?}");
            assert!(latest.pixels.pixels().all(|p| p == first), "torn frame");
            seen += 1;
        }
    }
    done.store(true, Ordering::Relaxed);
    let stored = loader.join().unwrap();
    assert!(stored > 0);
    assert_eq!(seen, 199);
    assert_eq!(device.stats().stalls, 0);
}
