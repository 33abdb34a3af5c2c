// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::Error;
use crate::imp::wgpu::entry_point::EntryPoint;

/// An adapter that has been picked but not yet opened.
#[derive(Debug)]
pub struct UnboundDevice {
    pub(super) adapter: wgpu::Adapter,
}

impl UnboundDevice {
    /// Picks an adapter for headless work.  Nothing is presented, so no surface is required.
    pub async fn pick(entry_point: &EntryPoint) -> Result<UnboundDevice, Error> {
        let options = wgpu::RequestAdapterOptions {
            power_preference: Default::default(),
            force_fallback_adapter: false,
            compatible_surface: None,
        };
        let adapter = entry_point.0.request_adapter(&options).await;
        let adapter = adapter.map_err(|_| Error::NoSuchAdapter)?;
        logwise::info_sync!(
            "Picked adapter {info}",
            info = logwise::privacy::LogIt(&adapter.get_info())
        );
        Ok(UnboundDevice { adapter })
    }
}
