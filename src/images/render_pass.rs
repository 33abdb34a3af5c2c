// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::TransferDevice;
use std::fmt::{Debug, Formatter};

/// What the full-screen pass does to each sampled texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Effect {
    /// Output equals input.
    #[default]
    Copy,
    /// Rec. 601 luma in all three color channels, alpha kept.
    Grayscale,
}

/**
One full-screen textured quad.

`source` is sampled over the whole target with nearest filtering; nothing is blended.
*/
pub struct PassDescriptor<'a, D: TransferDevice + ?Sized> {
    pub(crate) name: &'a str,
    pub(crate) source: &'a D::Texture,
    pub(crate) target: &'a D::Framebuffer,
    pub(crate) effect: Effect,
}

impl<'a, D: TransferDevice + ?Sized> PassDescriptor<'a, D> {
    pub fn new(
        name: &'a str,
        source: &'a D::Texture,
        target: &'a D::Framebuffer,
        effect: Effect,
    ) -> Self {
        PassDescriptor {
            name,
            source,
            target,
            effect,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }
}

impl<D: TransferDevice + ?Sized> Debug for PassDescriptor<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassDescriptor")
            .field("name", &self.name)
            .field("source", self.source)
            .field("target", self.target)
            .field("effect", &self.effect)
            .finish()
    }
}
