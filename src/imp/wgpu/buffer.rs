// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0

//! Staging buffers for the wgpu backend.
//!
//! wgpu maps buffers asynchronously: `map_async` registers a callback that fires once the
//! GPU has finished with the buffer, and the mapped range is only available after that.
//! Each staging buffer therefore carries a small state machine shared with its callback:
//!
//! ```text
//! Unmapped --arm--> Pending --callback--> Mapped --CPU access--> Unmapped
//!                           \--callback--> Failed --reported--> Unmapped
//! ```
//!
//! A buffer is armed right after the frame that used it on the GPU is submitted, so by the
//! time the CPU wants it one frame later the callback has normally fired.  When it hasn't,
//! access reports [MapError::Busy] instead of waiting.

use crate::bindings::buffer_access::MapType;
use crate::imp::{Error, MapError, StagingLayout};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use wgpu::{BufferDescriptor, BufferUsages, MapMode};

const UNMAPPED: u8 = 0;
const PENDING: u8 = 1;
const MAPPED: u8 = 2;
const FAILED: u8 = 3;

#[derive(Debug, Clone)]
struct MapState(Arc<AtomicU8>);

impl MapState {
    fn new(initial: u8) -> Self {
        MapState(Arc::new(AtomicU8::new(initial)))
    }
    fn load(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }
    fn store(&self, state: u8) {
        self.0.store(state, Ordering::Release)
    }
    fn transition(&self, from: u8, to: u8) -> bool {
        self.0
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/**
A buffer the CPU maps and the GPU copies through.

Upload buffers are `MAP_WRITE | COPY_SRC` and start out mapped; download buffers are
`MAP_READ | COPY_DST` and start out unmapped.
*/
#[derive(Debug)]
pub struct WgpuStagingBuffer {
    buffer: wgpu::Buffer,
    map_type: MapType,
    state: MapState,
    debug_name: String,
}

impl WgpuStagingBuffer {
    pub(super) fn new(
        device: &wgpu::Device,
        map_type: MapType,
        layout: &StagingLayout,
        debug_name: &str,
    ) -> Result<Self, Error> {
        let byte_len = layout.byte_len();
        if byte_len == 0 {
            return Err(Error::ZeroSized(debug_name.to_string()));
        }
        let size = (byte_len as u64).div_ceil(wgpu::COPY_BUFFER_ALIGNMENT)
            * wgpu::COPY_BUFFER_ALIGNMENT;
        if size > device.limits().max_buffer_size {
            return Err(Error::Allocation {
                debug_name: debug_name.to_string(),
                byte_len,
            });
        }
        let (usage, mapped_at_creation) = match map_type {
            MapType::Read => (BufferUsages::MAP_READ | BufferUsages::COPY_DST, false),
            MapType::Write => (BufferUsages::MAP_WRITE | BufferUsages::COPY_SRC, true),
        };
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(debug_name),
            size,
            usage,
            mapped_at_creation,
        });
        let state = MapState::new(if mapped_at_creation { MAPPED } else { UNMAPPED });
        Ok(WgpuStagingBuffer {
            buffer,
            map_type,
            state,
            debug_name: debug_name.to_string(),
        })
    }

    pub(super) fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn map_type(&self) -> MapType {
        self.map_type
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    /// Gets the buffer ready for a GPU copy this frame.
    ///
    /// A buffer the CPU still has mapped is unmapped.  A buffer with a map in flight can't be
    /// used until its callback fires.
    pub(super) fn release_to_gpu(&self) -> Result<(), MapError> {
        match self.state.load() {
            MAPPED => {
                self.buffer.unmap();
                self.state.store(UNMAPPED);
                Ok(())
            }
            PENDING => Err(MapError::Busy),
            FAILED => {
                self.state.store(UNMAPPED);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// The map request to issue once the frame using this buffer has been submitted.
    pub(super) fn pending_map(&self) -> PendingMap {
        PendingMap {
            buffer: self.buffer.clone(),
            state: self.state.clone(),
            mode: match self.map_type {
                MapType::Read => MapMode::Read,
                MapType::Write => MapMode::Write,
            },
            debug_name: self.debug_name.clone(),
        }
    }

    /**
    Checks the buffer is mapped, without waiting.

    `poll` gives wgpu a chance to run ready callbacks before reporting the buffer busy.
    A buffer nobody has armed is armed here, so the next attempt can succeed.
    */
    fn ensure_mapped(&self, poll: impl FnOnce()) -> Result<(), MapError> {
        match self.state.load() {
            MAPPED => Ok(()),
            FAILED => {
                self.state.store(UNMAPPED);
                Err(MapError::Failed(format!(
                    "{name} could not be mapped",
                    name = self.debug_name
                )))
            }
            PENDING => {
                poll();
                if self.state.load() == MAPPED {
                    Ok(())
                } else {
                    Err(MapError::Busy)
                }
            }
            _ => {
                self.pending_map().arm();
                Err(MapError::Busy)
            }
        }
    }

    /// Zeroes the mapped memory, hands it to `write`, unmaps.
    pub(super) fn write<F: FnOnce(&mut [u8])>(
        &self,
        poll: impl FnOnce(),
        write: F,
    ) -> Result<(), MapError> {
        if self.map_type != MapType::Write {
            return Err(MapError::Failed(format!(
                "{name} is not mappable for writing",
                name = self.debug_name
            )));
        }
        self.ensure_mapped(poll)?;
        {
            let mut view = self.buffer.slice(..).get_mapped_range_mut();
            //discard whatever the previous frame left here
            view.fill(0);
            write(&mut view);
        }
        self.buffer.unmap();
        self.state.store(UNMAPPED);
        Ok(())
    }

    /// Hands the mapped memory to `read`, unmaps.
    pub(super) fn read<F: FnOnce(&[u8])>(&self, poll: impl FnOnce(), read: F) -> Result<(), MapError> {
        if self.map_type != MapType::Read {
            return Err(MapError::Failed(format!(
                "{name} is not mappable for reading",
                name = self.debug_name
            )));
        }
        self.ensure_mapped(poll)?;
        {
            let view = self.buffer.slice(..).get_mapped_range();
            read(&view);
        }
        self.buffer.unmap();
        self.state.store(UNMAPPED);
        Ok(())
    }
}

/// A `map_async` waiting for its submission.
#[derive(Debug)]
pub(super) struct PendingMap {
    buffer: wgpu::Buffer,
    state: MapState,
    mode: MapMode,
    debug_name: String,
}

impl PendingMap {
    /// Requests the mapping.  Does nothing if the buffer is already mapped or pending.
    pub(super) fn arm(self) {
        if !self.state.transition(UNMAPPED, PENDING) {
            return;
        }
        let PendingMap {
            buffer,
            state,
            mode,
            debug_name,
        } = self;
        buffer.slice(..).map_async(mode, move |result| match result {
            Ok(()) => state.store(MAPPED),
            Err(e) => {
                logwise::warn_sync!(
                    "Mapping {name} failed: {e}",
                    name = logwise::privacy::LogIt(&debug_name),
                    e = logwise::privacy::LogIt(&e)
                );
                state.store(FAILED);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_only_from_unmapped() {
        let state = MapState::new(MAPPED);
        assert!(!state.transition(UNMAPPED, PENDING));
        state.store(UNMAPPED);
        assert!(state.transition(UNMAPPED, PENDING));
        assert!(!state.transition(UNMAPPED, PENDING));
        assert_eq!(state.load(), PENDING);
    }
}
