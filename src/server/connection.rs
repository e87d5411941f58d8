//! Per-connection request/response loop.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::parser::{ParseStatus, RequestReader};
use crate::server::config::ServerConfig;
use crate::server::error::Error;
use crate::server::events::EventEmitter;
use crate::server::handler::{error_response, handle};
use crate::server::pool::{Job, JobFuture};
use crate::server::registry::Registration;

/// State shared by all connections of one running server.
pub struct ConnectionContext {
    pub root: PathBuf,
    pub config: ServerConfig,
    pub events: EventEmitter,
}

/// Whether the loop goes on after a response.
enum Next {
    Continue,
    Close,
}

/// One accepted connection and everything it exclusively owns.
///
/// The task reads until a full request is buffered, answers it, and either
/// waits for the next request (keep-alive) or finishes. Finishing drops the
/// stream and the registration, which closes the socket and removes the
/// connection from the registry.
pub struct ConnectionTask<S> {
    stream: S,
    peer: SocketAddr,
    registration: Registration,
    context: Arc<ConnectionContext>,
    buffer: Vec<u8>,
    reader: RequestReader,
    keep_alive: bool,
}

impl<S> ConnectionTask<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
        registration: Registration,
        context: Arc<ConnectionContext>,
    ) -> Self {
        Self {
            stream,
            peer,
            registration,
            context,
            buffer: Vec::new(),
            reader: RequestReader::new(),
            keep_alive: false,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Serve the connection until it ends or the server closes it.
    pub async fn serve(mut self) {
        tokio::select! {
            _ = self.registration.closed() => {
                debug!("Connection from {peer} closed by the server", peer = self.peer);
            }
            result = Self::serve_requests(
                &mut self.stream,
                self.peer,
                &mut self.buffer,
                &mut self.reader,
                &mut self.keep_alive,
                &self.context,
            ) => {
                if let Err(e) = result {
                    warn!("Connection from {peer} failed: {e}", peer = self.peer);
                    self.context.events.log(format!("Connection from {} failed: {e}", self.peer));
                }
            }
        }
        let _ = self.stream.shutdown().await;
    }

    async fn serve_requests(
        stream: &mut S,
        peer: SocketAddr,
        buffer: &mut Vec<u8>,
        reader: &mut RequestReader,
        keep_alive: &mut bool,
        context: &ConnectionContext,
    ) -> Result<(), Error> {
        let config = &context.config;
        let mut chunk = vec![0; config.read_buffer_size];

        loop {
            let read = match tokio::time::timeout(config.receive_timeout(), stream.read(&mut chunk)).await {
                Err(_) => {
                    debug!("Connection from {peer} idle for {:?}, closing", config.receive_timeout());
                    return Ok(());
                }
                Ok(Ok(0)) => {
                    debug!("Connection from {peer} closed by the client");
                    return Ok(());
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) if is_benign(&e) => {
                    debug!("Connection from {peer} ended: {e}");
                    return Ok(());
                }
                Ok(Err(e)) => return Err(Error::IoError(e)),
            };
            buffer.extend_from_slice(&chunk[..read]);

            // Answer every request that is already fully buffered
            loop {
                match Self::answer_next(stream, peer, buffer, reader, keep_alive, context).await? {
                    Some(Next::Continue) => continue,
                    Some(Next::Close) => return Ok(()),
                    None => break,
                }
            }
        }
    }

    /// Answer the request at the front of the buffer, if there is one.
    ///
    /// `None` means more bytes are needed.
    async fn answer_next(
        stream: &mut S,
        peer: SocketAddr,
        buffer: &mut Vec<u8>,
        reader: &mut RequestReader,
        keep_alive: &mut bool,
        context: &ConnectionContext,
    ) -> Result<Option<Next>, Error> {
        let max_request_size = context.config.max_request_size;

        match reader.poll(buffer) {
            Ok(ParseStatus::Incomplete) => {
                if buffer.len() > max_request_size {
                    let response = error_response(&Error::PayloadTooLarge(max_request_size));
                    context.events.log(format!("{peer} request exceeds {max_request_size} bytes -> 413"));
                    stream.write_all(&response.to_bytes()).await?;
                    return Ok(Some(Next::Close));
                }
                Ok(None)
            }
            Ok(ParseStatus::Complete { request, consumed }) => {
                *keep_alive = request.keep_alive;
                let response = handle(&request, &context.root)
                    .await
                    .with_keep_alive(*keep_alive);
                context.events.log(format!(
                    "{peer} {method} {path} -> {code}",
                    method = request.method,
                    path = request.path,
                    code = response.status.as_u16(),
                ));
                stream.write_all(&response.to_bytes()).await?;

                if *keep_alive {
                    buffer.drain(..consumed);
                    Ok(Some(Next::Continue))
                } else {
                    Ok(Some(Next::Close))
                }
            }
            Err(e) => {
                *keep_alive = false;
                let error = Error::from(e);
                let response = error_response(&error);
                context.events.log(format!("{peer} {error} -> 400"));
                stream.write_all(&response.to_bytes()).await?;
                Ok(Some(Next::Close))
            }
        }
    }
}

impl<S> Job for ConnectionTask<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn run(self) -> JobFuture {
        Box::pin(self.serve())
    }
}

/// Read errors that just mean the session is over.
fn is_benign(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
    )
}
