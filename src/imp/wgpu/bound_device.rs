// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::Error;
use crate::imp::wgpu::unbound_device::UnboundDevice;
#[cfg(not(target_arch = "wasm32"))]
use std::sync::Arc;
#[cfg(not(target_arch = "wasm32"))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(not(target_arch = "wasm32"))]
use std::sync::mpsc::{self, Receiver, Sender};
#[cfg(not(target_arch = "wasm32"))]
use std::thread::{self, JoinHandle};
use wgpu::{Limits, PollType, Trace};

/// An opened device and its queue.
///
/// On native targets a background thread drives map callbacks so the render thread never
/// waits on them.
#[derive(Debug)]
pub struct BoundDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter: wgpu::Adapter,
    #[cfg(not(target_arch = "wasm32"))]
    poll_thread: Option<JoinHandle<()>>,
    #[cfg(not(target_arch = "wasm32"))]
    poll_shutdown: Arc<AtomicBool>,
    #[cfg(not(target_arch = "wasm32"))]
    poll_trigger: Sender<()>,
}

impl BoundDevice {
    pub(crate) async fn bind(unbound_device: UnboundDevice) -> Result<Self, Error> {
        let label = wgpu::Label::from("pixel_transfer");
        let mut limits = Limits::downlevel_webgl2_defaults();
        //webGL is quite serious about enforcing these, which
        //by default are rather small
        limits.max_texture_dimension_1d = 4096;
        limits.max_texture_dimension_2d = 4096;

        let descriptor = wgpu::DeviceDescriptor {
            label,
            required_features: Default::default(),
            required_limits: limits,
            memory_hints: Default::default(),
            trace: Trace::Off,
        };
        let (device, queue) = unbound_device.adapter.request_device(&descriptor).await?;
        device.on_uncaptured_error(Box::new(|error| {
            logwise::error_sync!(
                "Uncaptured wgpu error: {error}",
                error = logwise::privacy::LogIt(&error)
            );
        }));

        #[cfg(not(target_arch = "wasm32"))]
        {
            let poll_device = device.clone();
            let poll_shutdown = Arc::new(AtomicBool::new(false));
            let shutdown_clone = poll_shutdown.clone();

            let (poll_sender, poll_receiver): (Sender<()>, Receiver<()>) = mpsc::channel();

            let poll_thread = thread::Builder::new()
                .name("wgpu_poll".to_string())
                .spawn(move || {
                    while let Ok(()) = poll_receiver.recv() {
                        if shutdown_clone.load(Ordering::Relaxed) {
                            break;
                        }
                        //runs map callbacks for everything submitted so far
                        let _ = poll_device.poll(PollType::Wait);
                    }
                })
                .map_err(|e| Error::Unknown(format!("can't spawn wgpu_poll thread: {e}")))?;
            Ok(BoundDevice {
                device,
                queue,
                adapter: unbound_device.adapter,
                poll_thread: Some(poll_thread),
                poll_shutdown,
                poll_trigger: poll_sender,
            })
        }
        #[cfg(target_arch = "wasm32")]
        {
            Ok(BoundDevice {
                device,
                queue,
                adapter: unbound_device.adapter,
            })
        }
    }

    /// Signal the polling thread that GPU work may be ready
    pub fn set_needs_poll(&self) {
        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = self.poll_trigger.send(());
        }
        #[cfg(target_arch = "wasm32")]
        {
            let _ = self.device.poll(PollType::Poll);
        }
    }

    /// Runs whatever callbacks are ready, without waiting.
    pub(super) fn poll_now(&self) {
        let _ = self.device.poll(PollType::Poll);
    }

    /// Waits for all submitted work.
    pub(super) fn poll_wait(&self) {
        let _ = self.device.poll(PollType::Wait);
    }

    pub(super) fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub(super) fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Drop for BoundDevice {
    fn drop(&mut self) {
        self.poll_shutdown.store(true, Ordering::Relaxed);
        //wake the thread so it sees the flag
        let _ = self.poll_trigger.send(());
        if let Some(handle) = self.poll_thread.take() {
            let _ = handle.join();
        }
    }
}
