// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The wgpu instance.

#[derive(Debug)]
pub struct EntryPoint(pub(super) wgpu::Instance);

impl EntryPoint {
    /// Creates an instance configured from `WGPU_*` environment variables where set.
    pub fn new() -> Self {
        let descriptor = wgpu::InstanceDescriptor::from_env_or_default();
        EntryPoint(wgpu::Instance::new(&descriptor))
    }
}

impl Default for EntryPoint {
    fn default() -> Self {
        Self::new()
    }
}
