//! rtgen-rainbow - Rainbow table precomputation
//!
//! This crate provides functionality to:
//! - Build hash/reduce chains from random plaintext seeds
//! - Generate chains in parallel, one shard file per worker
//! - Load shard files into length-partitioned store tables, tolerating collisions

pub mod cancel;
pub mod config;
pub mod constants;
pub mod error;
pub mod domain;
pub mod infra;
pub mod app;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use config::RainbowConfig;
pub use constants::*;
pub use domain::chain::{Chain, ChainBuilder};
pub use domain::encoder::{Encoder, encoder_for};
pub use domain::reduce::{reduce, reduce_into};
pub use error::{Error, Result};
