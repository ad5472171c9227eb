//! WebSocket Transport Layer
//!
//! Single responsibility: Open a socket, move text frames in and out, and
//! report what happened to the event loop. No knowledge of request ids,
//! throttling or caching.
//!
//! Each socket is driven by its own task. Events it reports are tagged with
//! the socket's generation so the channel manager can ignore events from a
//! socket it already discarded.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{http::Request, protocol::Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::service::Event;

/// Lifecycle events reported by a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The socket is ready to transmit
    Open,
    /// A text frame arrived
    Message(String),
    /// The socket closed, failed to connect, or errored
    Closed,
}

/// Send half of one physical socket, as seen by the channel manager
pub trait Socket: Send {
    /// Queue a text frame for transmission
    fn send(&mut self, frame: String) -> Result<()>;
}

/// Creates sockets on demand
pub trait Connector: Send {
    /// Start opening a new socket. Its events must carry `generation`.
    fn connect(&mut self, generation: u64) -> Box<dyn Socket>;
}

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Socket handle backed by a tokio-tungstenite task
pub struct WsSocket {
    outgoing: mpsc::UnboundedSender<String>,
}

impl Socket for WsSocket {
    fn send(&mut self, frame: String) -> Result<()> {
        self.outgoing
            .send(frame)
            .map_err(|_| TransportError::Send("socket task has exited".into()))
    }
}

/// Connector that opens WebSockets with tokio-tungstenite.
///
/// Consecutive connect failures back off exponentially, starting at
/// `reconnect_delay` and capped at `max_reconnect_delay`. A successful open
/// resets the back-off.
pub struct WsConnector {
    url: String,
    origin: String,
    reconnect_delay: Duration,
    max_reconnect_delay: Duration,
    failures: Arc<AtomicU32>,
    events: mpsc::UnboundedSender<Event>,
}

impl WsConnector {
    pub fn new(config: &TransportConfig, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            url: config.endpoint.clone(),
            origin: config.origin.clone(),
            reconnect_delay: config.reconnect_delay,
            max_reconnect_delay: config.max_reconnect_delay,
            failures: Arc::new(AtomicU32::new(0)),
            events,
        }
    }

    /// Delay before the next connect attempt
    fn backoff(&self) -> Duration {
        backoff_delay(
            self.failures.load(Ordering::Relaxed),
            self.reconnect_delay,
            self.max_reconnect_delay,
        )
    }
}

impl Connector for WsConnector {
    fn connect(&mut self, generation: u64) -> Box<dyn Socket> {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let delay = self.backoff();

        tokio::spawn(socket_task(
            self.url.clone(),
            self.origin.clone(),
            generation,
            delay,
            Arc::clone(&self.failures),
            outgoing_rx,
            self.events.clone(),
        ));

        Box::new(WsSocket { outgoing })
    }
}

/// Back-off for the given number of consecutive failures
fn backoff_delay(failures: u32, base: Duration, max: Duration) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

/// Drive one socket from connect to close
async fn socket_task(
    url: String,
    origin: String,
    generation: u64,
    delay: Duration,
    failures: Arc<AtomicU32>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<Event>,
) {
    if !delay.is_zero() {
        warn!(generation, delay = ?delay, "Reconnecting after back-off");
        tokio::time::sleep(delay).await;
    }

    info!(url = %url, generation, "Connecting WebSocket");

    match open(&url, &origin).await {
        Ok(ws) => {
            failures.store(0, Ordering::Relaxed);
            let _ = events.send(Event::socket(generation, SocketEvent::Open));
            info!(generation, "WebSocket connected");

            let (mut sink, mut stream) = ws.split();
            loop {
                tokio::select! {
                    frame = outgoing.recv() => match frame {
                        Some(frame) => {
                            if let Err(e) = sink.send(Message::Text(frame)).await {
                                error!(generation, error = %e, "Failed to send frame");
                                break;
                            }
                        }
                        None => {
                            // Handle dropped: the manager no longer uses this socket
                            debug!(generation, "Socket handle dropped, closing");
                            let _ = sink.close().await;
                            break;
                        }
                    },
                    msg = stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let _ = events.send(Event::socket(generation, SocketEvent::Message(text)));
                        }
                        Some(Ok(Message::Binary(data))) => {
                            let text = String::from_utf8_lossy(&data).into_owned();
                            let _ = events.send(Event::socket(generation, SocketEvent::Message(text)));
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(generation, frame = ?frame, "Server closed WebSocket");
                            break;
                        }
                        Some(Ok(_)) => {
                            // Ping/pong handled by tungstenite
                        }
                        Some(Err(e)) => {
                            error!(generation, error = %e, "WebSocket error");
                            break;
                        }
                        None => break,
                    },
                }
            }
        }
        Err(e) => {
            failures.fetch_add(1, Ordering::Relaxed);
            error!(generation, error = %e, "Failed to connect WebSocket");
        }
    }

    let _ = events.send(Event::socket(generation, SocketEvent::Closed));
}

/// Connect with an explicit handshake request
async fn open(url: &str, origin: &str) -> Result<WsStream> {
    let request = Request::builder()
        .uri(url)
        .header("Host", extract_host(url))
        .header("Origin", origin)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header(
            "Sec-WebSocket-Key",
            tokio_tungstenite::tungstenite::handshake::client::generate_key(),
        )
        .body(())
        .map_err(|e| TransportError::Connect(format!("Failed to build request: {}", e)))?;

    let (ws, _) = connect_async_with_config(request, None, false)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    Ok(ws)
}

/// Extract host from URL for Host header
fn extract_host(url: &str) -> &str {
    url.split("//")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or("localhost")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_host() {
        assert_eq!(extract_host("ws://localhost:8000"), "localhost:8000");
        assert_eq!(extract_host("wss://example.com/path"), "example.com");
        assert_eq!(extract_host("invalid"), "localhost");
    }

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(30);
        assert_eq!(backoff_delay(0, base, max), Duration::ZERO);
        assert_eq!(backoff_delay(1, base, max), Duration::from_millis(100));
        assert_eq!(backoff_delay(2, base, max), Duration::from_millis(200));
        assert_eq!(backoff_delay(4, base, max), Duration::from_millis(800));
        assert_eq!(backoff_delay(20, base, max), max);
        assert_eq!(backoff_delay(40, base, max), max);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_closed() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let config = TransportConfig {
            endpoint: "ws://127.0.0.1:1".to_string(),
            ..TransportConfig::default()
        };
        let mut connector = WsConnector::new(&config, events_tx);

        let _socket = connector.connect(5);

        match events_rx.recv().await {
            Some(Event::Socket { generation, event }) => {
                assert_eq!(generation, 5);
                assert_eq!(event, SocketEvent::Closed);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(connector.backoff(), Duration::from_millis(100));
    }
}
