// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Staging buffers and the two transfer directions built on them. */

pub mod buffer_access;
pub mod forward;
pub mod reverse;
pub mod transfer_pool;
pub mod visible_to;

pub use transfer_pool::TransferPool;
