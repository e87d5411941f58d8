//! HTTP server implementation.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::server::config::ServerConfig;
use crate::server::connection::{ConnectionContext, ConnectionTask};
use crate::server::error::Error;
use crate::server::events::{EventEmitter, ServerEvent};
use crate::server::pool::WorkerPool;
use crate::server::registry::ConnectionRegistry;
use crate::server::response::HttpResponse;

type ConnectionPool<S = TcpStream> = WorkerPool<ConnectionTask<S>>;

/// Where the accept loop takes new connections from.
pub(crate) trait Incoming: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;
}

impl Incoming for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// An HTTP file server that can be started and stopped by its host.
pub struct HttpServer {
    /// The server configuration.
    pub config: ServerConfig,
    events: EventEmitter,
    state: Mutex<Option<RunningServer>>,
}

/// Everything that exists only while the server runs.
struct RunningServer {
    local_addr: SocketAddr,
    root: PathBuf,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    registry: Arc<ConnectionRegistry>,
    pool: Arc<ConnectionPool>,
    accept_loop: JoinHandle<()>,
}

/// The accept loop and the state it needs. Owns the listening socket.
struct Acceptor<L: Incoming> {
    listener: L,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    registry: Arc<ConnectionRegistry>,
    pool: Arc<ConnectionPool<L::Stream>>,
    context: Arc<ConnectionContext>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            events: EventEmitter::disabled(),
            state: Mutex::new(None),
        }
    }

    /// Deliver log lines and lifecycle notifications to `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        self.events = EventEmitter::new(tx);
        self
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().is_some()
    }

    /// The address the server is bound to, while it runs.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_state().as_ref().map(|server| server.local_addr)
    }

    /// The document root, while the server runs.
    pub fn root_dir(&self) -> Option<PathBuf> {
        self.lock_state().as_ref().map(|server| server.root.clone())
    }

    /// Number of connections currently registered.
    pub fn active_connections(&self) -> usize {
        self.lock_state()
            .as_ref()
            .map_or(0, |server| server.registry.len())
    }

    /// Number of accepted connections waiting for a worker.
    pub fn queued_connections(&self) -> usize {
        self.lock_state()
            .as_ref()
            .map_or(0, |server| server.pool.queued())
    }

    /// Start serving files from `root_dir` on `port`.
    ///
    /// Port `0` lets the operating system choose; the returned address
    /// carries the actual port. Failures are also reported as a log event.
    pub async fn start(&self, root_dir: impl Into<PathBuf>, port: u16) -> Result<SocketAddr, Error> {
        let root = root_dir.into();
        let mut state = self.lock_state();
        if state.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let listener = match self.prepare(&root, port) {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to start server: {e}");
                self.events.log(format!("Failed to start server: {e}"));
                return Err(e);
            }
        };
        let local_addr = listener.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let pool = Arc::new(WorkerPool::new(self.config.max_workers));
        let context = Arc::new(ConnectionContext {
            root: root.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
        });

        self.events.log(format!(
            "Listening for incoming connections on {local_addr}, serving {root}",
            root = root.display()
        ));
        self.events.started(local_addr);

        let acceptor = Acceptor {
            listener,
            running: running.clone(),
            shutdown: shutdown.clone(),
            registry: registry.clone(),
            pool: pool.clone(),
            context,
        };
        let accept_loop = tokio::spawn(acceptor.run());

        *state = Some(RunningServer {
            local_addr,
            root,
            running,
            shutdown,
            registry,
            pool,
            accept_loop,
        });
        Ok(local_addr)
    }

    /// Stop accepting, close every connection and wait briefly for workers.
    ///
    /// Does nothing if the server is not running. The stopped notification
    /// is sent even when workers are still busy after the drain timeout.
    pub async fn stop(&self) {
        let server = self.lock_state().take();
        let Some(server) = server else {
            return;
        };
        info!("Shutting down server...");

        server.running.store(false, Ordering::SeqCst);
        server.shutdown.notify_one();
        // The listening socket closes when the loop returns
        if let Err(e) = server.accept_loop.await {
            error!("Accept loop failed: {e}");
        }

        for task in server.pool.cancel_queued() {
            debug!("Dropping queued connection from {peer}", peer = task.peer());
        }
        let closed = server.registry.close_all();
        debug!("Signalled {closed} open connections to close");

        let drain_timeout = self.config.drain_timeout();
        if !server.pool.drain(drain_timeout).await {
            warn!("Connections still busy after {drain_timeout:?}, abandoning them");
        }

        self.events.log("Server stopped");
        self.events.stopped();
    }

    /// Validate the inputs and create the listening socket.
    fn prepare(&self, root: &Path, port: u16) -> Result<TcpListener, Error> {
        self.config.validate()?;
        if !root.is_dir() {
            return Err(Error::InvalidRoot(root.to_path_buf()));
        }
        self.setup_listener(port)
    }

    /// Set up the TCP listener with address reuse enabled.
    fn setup_listener(&self, port: u16) -> Result<TcpListener, Error> {
        let addr = SocketAddr::new(self.config.bind_addr, port);
        let socket_error =
            move |stage: &'static str| move |source: std::io::Error| Error::Socket { stage, addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(socket_error("create"))?;
        socket.set_reuseaddr(true).map_err(socket_error("configure"))?;
        socket.bind(addr).map_err(socket_error("bind"))?;
        let listener = socket.listen(self.config.backlog).map_err(socket_error("listen"))?;

        info!("Server listening on http://{addr}");
        Ok(listener)
    }

    fn lock_state(&self) -> MutexGuard<'_, Option<RunningServer>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(server) = state.take() {
            // No waiting here; the loop and the workers wind down on their own
            server.running.store(false, Ordering::SeqCst);
            server.shutdown.notify_one();
            drop(server.pool.cancel_queued());
            server.registry.close_all();
        }
    }
}

impl<L: Incoming> Acceptor<L> {
    async fn run(mut self) {
        let poll_interval = self.context.config.accept_poll_interval();

        while self.running.load(Ordering::SeqCst) {
            let accepted = tokio::select! {
                _ = self.shutdown.notified() => break,
                accepted = tokio::time::timeout(poll_interval, self.listener.accept()) => accepted,
            };

            match accepted {
                // Nothing arrived within the poll interval
                Err(_) => continue,
                Ok(Err(e)) => self.handle_accept_error(Error::Accept(e)).await,
                Ok(Ok((stream, peer))) => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    self.dispatch(stream, peer).await;
                }
            }
        }

        debug!("Accept loop exited");
    }

    /// Admit the connection to the pool or turn it away.
    async fn dispatch(&self, stream: L::Stream, peer: SocketAddr) {
        let max_connections = self.context.config.max_connections;
        if self.registry.len() >= max_connections {
            self.reject(stream, peer, Error::AtCapacity(max_connections)).await;
            return;
        }

        debug!("Connection from: {peer}");
        let registration = self.registry.register(peer);
        let task = ConnectionTask::new(stream, peer, registration, self.context.clone());
        self.pool.submit(task);
    }

    /// Answer with the fixed 503 page and close without creating a task.
    async fn reject(&self, mut stream: L::Stream, peer: SocketAddr, reason: Error) {
        warn!("{reason}, rejecting connection from {peer}");
        self.context
            .events
            .log(format!("Connection limit reached, rejecting connection from {peer}"));

        let response = HttpResponse::service_unavailable().to_bytes();
        let written = tokio::time::timeout(self.context.config.accept_poll_interval(), async {
            stream.write_all(&response).await?;
            stream.shutdown().await
        })
        .await;
        if !matches!(written, Ok(Ok(()))) {
            debug!("Could not deliver 503 to {peer}");
        }
    }

    /// Accept errors are not fatal; log them and back off briefly.
    async fn handle_accept_error(&self, e: Error) {
        error!("Error accepting connection: {e}");
        self.context.events.log(format!("Error accepting connection: {e}"));
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::time::Instant;

    /// Hands out a fixed sequence of accept results, then never accepts again.
    struct ScriptedIncoming {
        script: VecDeque<io::Result<(DuplexStream, SocketAddr)>>,
    }

    impl Incoming for ScriptedIncoming {
        type Stream = DuplexStream;

        async fn accept(&mut self) -> io::Result<(DuplexStream, SocketAddr)> {
            match self.script.pop_front() {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
    }

    struct Harness {
        _root: TempDir,
        running: Arc<AtomicBool>,
        shutdown: Arc<Notify>,
        registry: Arc<ConnectionRegistry>,
        accept_loop: JoinHandle<()>,
        events: mpsc::UnboundedReceiver<ServerEvent>,
    }

    impl Harness {
        fn spawn(script: Vec<io::Result<(DuplexStream, SocketAddr)>>, config: ServerConfig) -> Self {
            let root = tempfile::tempdir().unwrap();
            std::fs::write(root.path().join("index.html"), "hi").unwrap();
            let (tx, events) = mpsc::unbounded_channel();

            let running = Arc::new(AtomicBool::new(true));
            let shutdown = Arc::new(Notify::new());
            let registry = Arc::new(ConnectionRegistry::new());
            let acceptor = Acceptor {
                listener: ScriptedIncoming {
                    script: script.into(),
                },
                running: running.clone(),
                shutdown: shutdown.clone(),
                registry: registry.clone(),
                pool: Arc::new(WorkerPool::new(config.max_workers)),
                context: Arc::new(ConnectionContext {
                    root: root.path().to_path_buf(),
                    config,
                    events: EventEmitter::new(tx),
                }),
            };

            Self {
                _root: root,
                running,
                shutdown,
                registry,
                accept_loop: tokio::spawn(acceptor.run()),
                events,
            }
        }

        async fn stop(self) {
            self.running.store(false, Ordering::SeqCst);
            self.shutdown.notify_one();
            tokio::time::timeout(Duration::from_secs(2), self.accept_loop)
                .await
                .expect("accept loop did not exit")
                .unwrap();
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    async fn read_to_close(client: &mut DuplexStream) -> String {
        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut received))
            .await
            .expect("connection was not closed")
            .unwrap();
        String::from_utf8_lossy(&received).into_owned()
    }

    #[tokio::test]
    async fn test_accept_errors_back_off_and_loop_continues() {
        let (mut client, server_side) = tokio::io::duplex(4096);
        let failure = || io::Error::new(io::ErrorKind::ConnectionAborted, "aborted");
        let started = Instant::now();
        let mut harness = Harness::spawn(
            vec![Err(failure()), Err(failure()), Ok((server_side, peer()))],
            ServerConfig::default(),
        );

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let response = read_to_close(&mut client).await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(started.elapsed() >= Duration::from_millis(200));

        let mut accept_errors = 0;
        while let Ok(event) = harness.events.try_recv() {
            if matches!(event, ServerEvent::Log(ref line) if line.starts_with("Error accepting connection")) {
                accept_errors += 1;
            }
        }
        assert_eq!(accept_errors, 2);

        harness.stop().await;
    }

    #[tokio::test]
    async fn test_full_registry_rejects_with_503() {
        let (mut client, server_side) = tokio::io::duplex(4096);
        let config = ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        };
        let harness = Harness::spawn(vec![Ok((server_side, peer()))], config);
        let _held = harness.registry.register(peer());

        let response = read_to_close(&mut client).await;
        assert!(response.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
        assert_eq!(harness.registry.len(), 1);

        harness.stop().await;
    }

    #[tokio::test]
    async fn test_shutdown_wakes_idle_loop() {
        let config = ServerConfig {
            accept_poll_interval_ms: 60_000,
            ..ServerConfig::default()
        };
        let harness = Harness::spawn(Vec::new(), config);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!harness.accept_loop.is_finished());

        harness.stop().await;
    }
}
