//! Application layer - Use case implementations
//!
//! This module coordinates domain and infrastructure layers to implement use cases.

pub mod generator;
pub mod loader;
pub mod schema;

use crate::error::{Error, Result};

/// Join per-unit results, keeping the first failure
///
/// Every unit has already finished when this runs; later failures are
/// logged so none is dropped silently.
pub(crate) fn first_error<T>(stage: &str, results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut ok = Vec::with_capacity(results.len());
    let mut first: Option<Error> = None;

    for result in results {
        match result {
            Ok(value) => ok.push(value),
            Err(e) if first.is_none() => first = Some(e),
            Err(e) => tracing::error!(stage, error = %e, "additional failure"),
        }
    }

    match first {
        Some(e) => Err(e),
        None => Ok(ok),
    }
}
