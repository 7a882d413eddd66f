//! In-process entity store implementations.

mod memory;

pub use memory::*;
