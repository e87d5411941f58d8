//! Error types for the HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::parser::Error as ParserError;
use crate::server::response::StatusCode;

/// Errors that can occur during HTTP server operation.
///
/// Startup errors abort `start`; every other variant is confined to the
/// connection it happened on.
#[derive(Debug, Error)]
pub enum Error {
    /// Creating, binding or listening on the server socket failed.
    #[error("Failed to {stage} socket on {addr}: {source}")]
    Socket {
        stage: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Accepting an inbound connection failed.
    #[error("Accept error: {0}")]
    Accept(std::io::Error),

    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The request path tried to leave the document root.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Requested resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Method not allowed for the requested resource.
    #[error("Method {0} not allowed for path: {1}")]
    MethodNotAllowed(String, String),

    /// The buffered request grew past the configured limit.
    #[error("Request exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// The open-connection limit was reached.
    #[error("Connection limit of {0} reached")]
    AtCapacity(usize),

    /// The document root is missing or not a directory.
    #[error("Invalid document root: {}", .0.display())]
    InvalidRoot(PathBuf),

    /// `start` was called on a server that is already running.
    #[error("Server is already running")]
    AlreadyRunning,

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration document could not be decoded.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// The HTTP status a client sees for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::ParseError(_) => StatusCode::BadRequest,
            Error::Forbidden(_) => StatusCode::Forbidden,
            Error::NotFound(_) => StatusCode::NotFound,
            Error::MethodNotAllowed(_, _) => StatusCode::MethodNotAllowed,
            Error::PayloadTooLarge(_) => StatusCode::PayloadTooLarge,
            Error::AtCapacity(_) => StatusCode::ServiceUnavailable,
            _ => StatusCode::InternalServerError,
        }
    }
}
