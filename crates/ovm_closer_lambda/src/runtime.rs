//! Domain primitives re-exported under a single runtime boundary.

pub use ovm_closer_core::{classify, contract};
