//! Transport adapter — one WebSocket per handle.
//!
//! DESIGN
//! ======
//! A handle owns exactly one network connection. Inbound frames are decoded
//! by the `wire` crate and delivered, in arrival order, onto a single event
//! queue; a frame that fails to parse is delivered as raw text rather than
//! dropped. `send` is best-effort: frames are silently dropped, never
//! queued, once the socket task is gone. Reconnect policy belongs to the
//! store, not here.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use wire::{Incoming, OutFrame};

use crate::error::ClientError;

/// One entry on the inbound event queue.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// The connection is established.
    Opened,
    /// A recognized inbound frame.
    Frame(wire::InFrame),
    /// An inbound payload that did not parse as a frame.
    Raw(String),
    /// The connection ended (peer close, clean shutdown, or send failure).
    Closed,
    /// The connection failed with a protocol or I/O error.
    Error(String),
}

/// A live connection handle.
pub trait Transport: Send {
    /// Serialize and send one frame. No-op unless the socket is open —
    /// callers get no delivery guarantee beyond "sent if currently open".
    fn send(&self, frame: &OutFrame);
    /// Perform a normal client-initiated close. Idempotent.
    fn close(&mut self);
}

/// Opens transports. The store owns a `Connector` so tests can substitute
/// a channel-backed double for the real socket.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open one connection to `url`, delivering its events onto `events`.
    async fn connect(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn Transport>, ClientError>;
}

enum Outbound {
    Text(String),
    Close,
}

/// `tokio-tungstenite` transport. Dropping the handle without `close` tears
/// the socket task down as well.
pub struct WsTransport {
    out: mpsc::UnboundedSender<Outbound>,
}

impl Transport for WsTransport {
    fn send(&self, frame: &OutFrame) {
        // Err means the socket task is gone; the frame is dropped by contract.
        let _ = self.out.send(Outbound::Text(wire::encode(frame)));
    }

    fn close(&mut self) {
        let _ = self.out.send(Outbound::Close);
    }
}

/// Real WebSocket connector.
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn Transport>, ClientError> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ClientError::WsConnect(Box::new(e)))?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let _ = events.send(TransportEvent::Opened);
        tokio::spawn(run_socket(stream, out_rx, events));

        Ok(Box::new(WsTransport { out: out_tx }))
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn run_socket(
    mut stream: WsStream,
    mut out: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    loop {
        tokio::select! {
            cmd = out.recv() => match cmd {
                Some(Outbound::Text(text)) => {
                    if stream.send(Message::Text(text.into())).await.is_err() {
                        let _ = events.send(TransportEvent::Closed);
                        break;
                    }
                }
                // Handle dropped or closed: normal closure either way.
                Some(Outbound::Close) | None => {
                    let _ = stream.close(None).await;
                    let _ = events.send(TransportEvent::Closed);
                    break;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let event = match wire::decode(text.as_str()) {
                        Incoming::Frame(frame) => TransportEvent::Frame(frame),
                        Incoming::Raw(raw) => TransportEvent::Raw(raw),
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    let _ = events.send(TransportEvent::Closed);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "ws recv error");
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break;
                }
            },
        }
    }
}

/// Milliseconds since the Unix epoch, for outbound `ts` fields.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(duration) = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(duration.as_millis()).unwrap_or(0)
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
