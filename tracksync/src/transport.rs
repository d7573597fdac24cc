//! Low-level plumbing shared by the HTTP client and the live stream
//!
//! The push channel is reached through the [`SocketConnector`] /
//! [`DuplexSocket`] pair so that the live stream state machine can run over
//! any message-oriented duplex transport. [`WebSocketConnector`] is the
//! production implementation on top of tokio-tungstenite.

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::{Response, StatusCode};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

// ============================================================================
// HTTP helpers
// ============================================================================

/// Whether an HTTP status is an internal server error (5xx)
pub fn is_server_error(status: u16) -> bool {
    (500..600).contains(&status)
}

/// Join an API path onto a base URL
pub(crate) fn endpoint(base_url: &str, path: &str) -> Result<Url> {
    Ok(Url::parse(&format!(
        "{}{}",
        base_url.trim_end_matches('/'),
        path
    ))?)
}

/// Accept only `200 OK`; anything else becomes [`Error::Status`]
pub(crate) async fn require_ok(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(
        operation,
        status = status.as_u16(),
        body = %body,
        "Server rejected request"
    );
    Err(Error::status(status.as_u16(), body))
}

// ============================================================================
// Push channel transport
// ============================================================================

/// Something received from the push channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame
    Message(String),
    /// The peer closed the connection, or it dropped
    Closed,
}

/// An open, message-oriented duplex connection
#[async_trait]
pub trait DuplexSocket: Send {
    /// Send one text frame
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Wait for the next message or for the end of the connection
    ///
    /// Must be cancel safe: it is raced against outgoing messages.
    async fn next_event(&mut self) -> Result<SocketEvent>;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;
}

/// Opens push channel connections
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn open(&self, url: &Url) -> Result<Box<dyn DuplexSocket>>;
}

/// tokio-tungstenite connector (`ws://` and `wss://`)
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl SocketConnector for WebSocketConnector {
    async fn open(&self, url: &Url) -> Result<Box<dyn DuplexSocket>> {
        let (stream, response) = connect_async(url.as_str()).await?;
        tracing::debug!(url = %url, status = response.status().as_u16(), "WebSocket handshake done");
        Ok(Box::new(TungsteniteSocket { inner: stream }))
    }
}

struct TungsteniteSocket {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl DuplexSocket for TungsteniteSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.inner.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<SocketEvent> {
        loop {
            match self.inner.next().await {
                None | Some(Ok(Message::Close(_))) => return Ok(SocketEvent::Closed),
                Some(Ok(Message::Text(text))) => return Ok(SocketEvent::Message(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(SocketEvent::Message(text)),
                    Err(_) => tracing::debug!("Ignoring non UTF-8 binary frame"),
                },
                // ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(tungstenite::Error::ConnectionClosed))
                | Some(Err(tungstenite::Error::AlreadyClosed)) => return Ok(SocketEvent::Closed),
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.inner.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_range() {
        assert!(is_server_error(500));
        assert!(is_server_error(503));
        assert!(!is_server_error(404));
        assert!(!is_server_error(200));
        assert!(!is_server_error(600));
    }

    #[test]
    fn test_endpoint_join() {
        let url = endpoint("http://host:8080/", "/api/tracks/list").unwrap();
        assert_eq!(url.as_str(), "http://host:8080/api/tracks/list");

        assert!(endpoint("not a url", "/api").is_err());
    }
}
