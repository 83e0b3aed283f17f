//! Error types for value parsing in larva-types.

use thiserror::Error;

/// Errors that can occur when parsing stored or transmitted values.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Unrecognised image format tag.
    #[error("Unknown image format: {0}")]
    UnknownFormat(String),
}

/// Result type alias using larva-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
