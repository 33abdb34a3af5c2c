// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Defines types for use in imp staging buffers.
*/

//whether the buffer can be mapped to CPU, and in which direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapType {
    /// The buffer is mapped to the CPU for reading.  Download staging.
    Read,
    /// The buffer is mapped to the CPU for writing.  Upload staging.
    Write,
}
