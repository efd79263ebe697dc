//! Infrastructure layer - I/O and external dependencies
//!
//! This module handles shard file operations and the backing store.

pub mod shard_io;
pub mod store;
