//! Transport capability.
//!
//! [`Conn`] is the thin interface the connection machinery consumes: a
//! duplex message-oriented socket with `read`, `write`, `ping` and
//! `close`. The production implementation wraps a websocket; tests
//! inject a double through [`ConnCreator`].
//!
//! The session guarantees only one task reads and only one task writes,
//! so both halves sit behind their own async mutex rather than a single
//! connection-wide lock.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

/// Transport-level errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// Underlying websocket failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The peer closed the connection or the stream ended.
    #[error("connection closed")]
    Closed,

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

/// A duplex message-oriented socket.
#[async_trait]
pub trait Conn: Send + Sync {
    /// Read the next message payload.
    async fn read(&self) -> Result<Vec<u8>, ConnError>;

    /// Write one message payload.
    async fn write(&self, payload: Vec<u8>) -> Result<(), ConnError>;

    /// Send a transport-level ping.
    async fn ping(&self) -> Result<(), ConnError>;

    /// Close the connection. Best effort; errors are ignored.
    async fn close(&self);
}

/// Shared handle to a connection.
pub type SharedConn = Arc<dyn Conn>;

/// Factory producing a fresh connection for each session attempt.
///
/// The default creator dials a websocket; tests substitute one that
/// returns scripted doubles.
pub type ConnCreator =
    Arc<dyn Fn(Url) -> BoxFuture<'static, Result<SharedConn, ConnError>> + Send + Sync>;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Websocket-backed [`Conn`].
pub struct WebSocketConn {
    write: Mutex<WsSink>,
    read: Mutex<WsSource>,
}

impl WebSocketConn {
    /// Dial `url` and wrap the resulting websocket.
    ///
    /// # Errors
    ///
    /// Returns an error if the websocket handshake fails.
    pub async fn connect(url: &Url) -> Result<Self, ConnError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (write, read) = stream.split();
        Ok(Self {
            write: Mutex::new(write),
            read: Mutex::new(read),
        })
    }
}

#[async_trait]
impl Conn for WebSocketConn {
    async fn read(&self) -> Result<Vec<u8>, ConnError> {
        let mut read = self.read.lock().await;
        loop {
            match read.next().await {
                Some(Ok(Message::Binary(payload))) => return Ok(payload.to_vec()),
                Some(Ok(Message::Text(payload))) => return Ok(payload.as_bytes().to_vec()),
                // Control frames are not surfaced; tungstenite answers
                // pings internally on the next write flush.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => return Err(ConnError::Closed),
                Some(Err(err)) => return Err(err.into()),
            }
        }
    }

    async fn write(&self, payload: Vec<u8>) -> Result<(), ConnError> {
        self.write
            .lock()
            .await
            .send(Message::Binary(payload.into()))
            .await
            .map_err(ConnError::from)
    }

    async fn ping(&self) -> Result<(), ConnError> {
        self.write
            .lock()
            .await
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(ConnError::from)
    }

    async fn close(&self) {
        let _ = self.write.lock().await.send(Message::Close(None)).await;
    }
}

/// The default [`ConnCreator`]: dial a websocket at the given URL.
pub(crate) fn websocket_creator() -> ConnCreator {
    Arc::new(|url: Url| {
        Box::pin(async move {
            let conn = WebSocketConn::connect(&url).await?;
            Ok(Arc::new(conn) as SharedConn)
        })
    })
}
