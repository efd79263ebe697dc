//! Domain layer - Pure computational logic
//!
//! This module contains pure functions and algorithms without I/O dependencies.

pub mod chain;
pub mod encoder;
pub mod reduce;
pub mod shard_format;
