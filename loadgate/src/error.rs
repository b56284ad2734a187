//! Error types for loadgate.
//!
//! The coordination pipeline itself cannot fail; these cover setup and the
//! keyboard feed.

use thiserror::Error;

use crate::combo::ComboError;
use crate::config::ConfigError;

/// Errors that can occur while setting up or feeding loadgate.
#[derive(Error, Debug)]
pub enum LoadgateError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The configured combo could not be built.
    #[error("combo error: {0}")]
    Combo(#[from] ComboError),

    /// Terminal I/O error from the keyboard feed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for loadgate operations.
pub type Result<T> = std::result::Result<T, LoadgateError>;
