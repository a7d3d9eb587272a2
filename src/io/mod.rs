//! Byte-level I/O helpers shared by the source and the text writers.

pub mod compression;
pub mod glob;
