//! HTTP server implementation for filehttp-rs.
//!
//! An accept loop admits connections into a bounded worker pool, where each
//! connection runs its own keep-alive request loop over static files.

mod response;
mod config;
mod connection;
mod error;
mod events;
mod handler;
mod http_server;
mod pool;
mod registry;
mod resolver;

// Re-export public items
pub use response::{http_date, HttpResponse, StatusCode, SERVER_NAME};
pub use config::ServerConfig;
pub use connection::{ConnectionContext, ConnectionTask};
pub use error::Error;
pub use events::{EventEmitter, ServerEvent};
pub use handler::{handle, DIAGNOSTIC_POST_PATH};
pub use http_server::HttpServer;
pub use pool::{Job, JobFuture, WorkerPool};
pub use registry::{ConnectionId, ConnectionRegistry, Registration};
pub use resolver::{resolve, ResolveError, ResolvedFile};
