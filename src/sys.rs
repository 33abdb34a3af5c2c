// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0

//! Platform shims.

pub mod time {
    //! `std::time` on native targets.  The browser has no monotonic clock in `std`, so wasm
    //! uses `web_time`.

    #[cfg(not(target_arch = "wasm32"))]
    pub use std::time::{Duration, Instant};

    #[cfg(target_arch = "wasm32")]
    pub use web_time::{Duration, Instant};
}
