//! HTTP parser module.
//!
//! Requests arrive in arbitrary fragments, so parsing is incremental: the
//! caller keeps appending received bytes to one buffer and retries
//! [`try_parse`] until a complete message is available.

mod request;
mod method;
mod error;

// Re-export public items
pub use request::{HttpRequest, ParseStatus, RequestReader};
pub use method::Method;
pub use error::Error;

// Re-export the try_parse function
pub use request::try_parse;
