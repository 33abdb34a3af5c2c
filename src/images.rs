// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Frame sequencing and render passes */

pub mod frame;
pub mod render_pass;

pub use frame::{Frame, FrameDriver, FrameReport};
