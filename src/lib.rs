//! An embeddable HTTP/1.1 static file server.
//!
//! The server accepts connections on a background task, answers them on a
//! bounded pool of workers and serves files below a document root. Hosts
//! drive it through [`HttpServer::start`] and [`HttpServer::stop`] and can
//! observe it through a channel of [`ServerEvent`]s.
//!
//! # Features
//!
//! - Incremental request parsing that tolerates partial reads and pipelining
//! - `GET` and `HEAD` for static files with content types guessed from extensions
//! - A small `POST` form endpoint for diagnostics
//! - Persistent connections with an idle receive timeout
//! - Admission control that turns excess connections away with `503`
//! - Orderly shutdown that closes idle and queued connections
//!
//! # Examples
//!
//! ## Parsing a request
//!
//! ```
//! use filehttp_rs::{try_parse, Method, ParseStatus};
//!
//! let bytes = b"GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n";
//!
//! match try_parse(bytes) {
//!     Ok(ParseStatus::Complete { request, consumed }) => {
//!         assert_eq!(request.method, Method::GET);
//!         assert_eq!(request.path, "/index.html");
//!         assert!(request.keep_alive);
//!         assert_eq!(consumed, bytes.len());
//!     }
//!     Ok(ParseStatus::Incomplete) => println!("Need more bytes"),
//!     Err(err) => println!("Error parsing request: {}", err),
//! }
//! ```
//!
//! ## Running the server
//!
//! ```no_run
//! use filehttp_rs::{HttpServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = HttpServer::new(ServerConfig::default());
//!     let addr = server.start("./public", 8080).await?;
//!     println!("Serving on http://{addr}");
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! See the `demos` directory for a complete host program.

// Export the parser module
pub mod parser;

// Export the server module
pub mod server;

// Re-export commonly used items for convenience
pub use parser::{try_parse, Error as ParserError, HttpRequest, Method, ParseStatus};
pub use server::{
    Error as ServerError, HttpResponse, HttpServer, ServerConfig, ServerEvent, StatusCode,
};

// Keep the README usage example compiling
#[cfg(doctest)]
#[doc = include_str!("../README.md")]
pub struct ReadmeDoctests;
