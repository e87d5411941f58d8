//! Notifications sent from the server to its host.

use std::net::SocketAddr;

use log::info;
use tokio::sync::mpsc;

/// Something the host may want to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A human-readable log line.
    Log(String),
    /// The server is accepting connections on the given address.
    Started(SocketAddr),
    /// The server has shut down.
    Stopped,
}

/// Cloneable handle that forwards events to an optional subscriber.
///
/// Log lines always go through the `log` facade as well, so a host without
/// a subscriber still sees them in its logger.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    tx: Option<mpsc::UnboundedSender<ServerEvent>>,
}

impl EventEmitter {
    pub fn new(tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// An emitter without a subscriber.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.send(ServerEvent::Log(message));
    }

    pub fn started(&self, addr: SocketAddr) {
        self.send(ServerEvent::Started(addr));
    }

    pub fn stopped(&self) {
        self.send(ServerEvent::Stopped);
    }

    fn send(&self, event: ServerEvent) {
        if let Some(tx) = &self.tx {
            // The host may have dropped its receiver; the server keeps going
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_reach_subscriber_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = EventEmitter::new(tx);
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();

        emitter.log("hello");
        emitter.started(addr);
        emitter.stopped();

        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Log("hello".to_string()));
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Started(addr));
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Stopped);
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        EventEmitter::new(tx).log("nobody listens");
        EventEmitter::disabled().stopped();
    }
}
