// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use wgpu::{AddressMode, FilterMode, SamplerDescriptor};

/// Nearest-neighbour, clamped.  Full-screen passes map texels one to one, so nothing is
/// interpolated.
pub(super) fn nearest(device: &wgpu::Device) -> wgpu::Sampler {
    let descriptor = SamplerDescriptor {
        label: Some("nearest"),
        address_mode_u: AddressMode::ClampToEdge,
        address_mode_v: AddressMode::ClampToEdge,
        address_mode_w: AddressMode::ClampToEdge,
        mag_filter: FilterMode::Nearest,
        min_filter: FilterMode::Nearest,
        mipmap_filter: FilterMode::Nearest,
        lod_min_clamp: 0.0,
        lod_max_clamp: 0.0,
        compare: None,
        anisotropy_clamp: 1,
        border_color: None,
    };
    device.create_sampler(&descriptor)
}
