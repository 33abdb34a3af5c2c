// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! pixel_transfer moves frames of RGBA pixels between system memory and the GPU without
stalling either side.

# Ping-pong staging

A naive texture upload or framebuffer readback makes the CPU wait for the GPU.  Here each
direction gets two staging buffers, and the frame counter decides which one the GPU uses and
which one the CPU maps:

| Direction | Slot `frame % 2` (GPU)                  | Slot `(frame + 1) % 2` (CPU)                    |
|-----------|-----------------------------------------|-------------------------------------------------|
| Upload    | texture update from last frame's write  | invalidate, map, write this frame's pixels      |
| Download  | read of this frame's framebuffer        | map, copy out last frame's read                 |

A buffer used by the GPU in frame N is touched by the CPU in frame N+1 and never earlier.
No fences, no locks; the price is one frame of latency in each direction.

```
use std::sync::Arc;
use pixel_transfer::bindings::transfer_pool::TransferPool;
use pixel_transfer::bindings::visible_to::{TextureConfig, TransferConfig};
use pixel_transfer::images::FrameDriver;
use pixel_transfer::imp::{SoftwareDevice, TransferDevice};
use pixel_transfer::pixel_formats::{PixelBuffer, Unorm4};

let device = Arc::new(SoftwareDevice::new());
let pool = TransferPool::new(device.clone(), TransferConfig::new(16, 16, "demo")).unwrap();
let mut driver = FrameDriver::new(pool);

let texture = device.create_texture(&TextureConfig::new(16, 16, "texture"), &[]).unwrap();
let target = device
    .create_texture(&TextureConfig::new(16, 16, "target").render_target(), &[])
    .unwrap();
let framebuffer = device.create_framebuffer(&target).unwrap();
let red = PixelBuffer::filled(16, 16, Unorm4 { r: 255, g: 0, b: 0, a: 255 });

for _ in 0..3 {
    let mut frame = driver.begin_frame();
    frame.upload(&texture, &red);
    // render passes go here
    let _ = frame.download(&framebuffer);
    frame.finish();
}
assert!(driver.latest_download().is_some());
```

# Backends

Everything is written against [imp::TransferDevice].  [imp::SoftwareDevice] runs on the CPU,
is always available, and can inject faults.  With the default `backend_wgpu` feature,
`imp::WgpuDevice` runs on [wgpu](https://wgpu.rs), which in turn targets Vulkan, Metal, DX12
and GL.

# Samples

[samples] holds a few self-contained demonstrations driven through [samples::Sample]:
plain texture mapping, off-screen rendering and the staging-buffer pipeline.
*/

pub mod bindings;
pub mod images;
pub mod imp;
pub mod multibuffer;
pub mod pixel_formats;
pub mod samples;
mod sys;
