// SPDX-License-Identifier: MIT

// === Sub-modules ===
pub mod checker;
pub mod errors;
pub mod macros;
pub mod utils;

// === Error types ===
pub use errors::*;

// === Utilities ===
pub use utils::{checksum_utils::*, path_utils::*, time_utils::*, volume_utils::*};
