//! Error types
//!
//! The timing primitives themselves degrade instead of failing; errors only
//! surface when building configurations or converting raw timestamps.

use thiserror::Error;

/// Errors produced while configuring timers or parsing server input
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] garde::Report),
    /// A configuration document could not be decoded
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// A server timestamp could not be represented as a point in time
    #[error("invalid server timestamp: {0} ms")]
    InvalidTimestamp(i64),
}

/// Convenience alias for results carrying [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;
