#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! The realtime channel seam. The sync driver only sees text frames; the
//! WebSocket implementation hides control frames and binary framing.

use crate::error::{MirrorError, Result};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::pin::Pin;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// One open channel. `recv` yields `Ok(None)` once the peer has closed it.
///
/// `recv` must be cancel-safe: the driver polls it inside `tokio::select!`.
pub trait Channel: Send {
    fn recv(&mut self) -> TransportFuture<'_, Option<String>>;
    fn send(&mut self, text: String) -> TransportFuture<'_, ()>;
    fn close(&mut self) -> TransportFuture<'_, ()>;
}

pub trait Transport: Send + Sync {
    fn connect(&self) -> TransportFuture<'_, Box<dyn Channel>>;
    fn endpoint(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct WsTransport {
    url: Url,
}

impl WsTransport {
    #[must_use]
    pub const fn new(url: Url) -> Self {
        Self { url }
    }
}

impl Transport for WsTransport {
    fn connect(&self) -> TransportFuture<'_, Box<dyn Channel>> {
        Box::pin(async move {
            let (stream, _) = connect_async(self.url.as_str()).await.map_err(|e| {
                MirrorError::TransportError(format!("Failed to connect to {}: {e}", self.url))
            })?;
            debug!("WebSocket handshake complete with {}", self.url);
            Ok(Box::new(WsChannel { stream }) as Box<dyn Channel>)
        })
    }

    fn endpoint(&self) -> String {
        self.url.to_string()
    }
}

struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Channel for WsChannel {
    fn recv(&mut self) -> TransportFuture<'_, Option<String>> {
        Box::pin(async move {
            while let Some(message) = self.stream.next().await {
                match message {
                    Ok(WsMessage::Text(text)) => return Ok(Some(text)),
                    Ok(WsMessage::Binary(bytes)) => {
                        return String::from_utf8(bytes).map(Some).map_err(|e| {
                            MirrorError::MalformedMessage(format!("Binary frame is not UTF-8: {e}"))
                        });
                    }
                    Ok(WsMessage::Close(frame)) => {
                        debug!("Peer closed channel: {:?}", frame);
                        return Ok(None);
                    }
                    Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => {}
                    Err(e) => return Err(MirrorError::TransportError(e.to_string())),
                }
            }
            Ok(None)
        })
    }

    fn send(&mut self, text: String) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.stream
                .send(WsMessage::Text(text))
                .await
                .map_err(|e| MirrorError::TransportError(format!("Send failed: {e}")))
        })
    }

    fn close(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.stream
                .close(None)
                .await
                .map_err(|e| MirrorError::TransportError(format!("Close failed: {e}")))
        })
    }
}
