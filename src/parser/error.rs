//! Error types for the HTTP parser.

use thiserror::Error;

/// Errors that can occur during HTTP request parsing.
///
/// Only the request line can make a buffered message unusable; header
/// problems are tolerated and fall back to defaults.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The request line has fewer than two tokens (method and path).
    #[error("Malformed request line: {0:?}")]
    MalformedRequestLine(String),
}
