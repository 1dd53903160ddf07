use std::{borrow::Cow, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info};
use url::Url;

pub const GENERATION_PATH: &str = "/api/orchestration/gui";
pub const EXECUTION_PATH: &str = "/api/orchestration/ws";

/// Upper bound on waiting for the peer to finish a close handshake we started.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Generation,
    Execution,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unsupported server url scheme in `{0}`, expected http or https")]
    UnsupportedScheme(String),
    #[error("invalid channel url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to connect websocket {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("failed to send frame: {0}")]
    Send(String),
    #[error("failed to receive frame: {0}")]
    Receive(String),
}

/// Ordered, full-duplex message channel to the testbed server.
#[async_trait]
pub trait DuplexChannel: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// `None` once the channel has ended.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Starts the close handshake. Closing twice is a no-op.
    async fn close(&mut self, reason: &str) -> Result<(), TransportError>;
}

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(&self, endpoint: Endpoint) -> Result<Box<dyn DuplexChannel>, TransportError>;
}

/// Maps an http(s) server url onto the matching ws(s) base.
pub fn websocket_base_url(server_url: &str) -> Result<String, TransportError> {
    let trimmed = server_url.trim().trim_end_matches('/');
    let ws_url = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(TransportError::UnsupportedScheme(server_url.to_string()));
    };
    Url::parse(&ws_url)?;
    Ok(ws_url)
}

pub struct WsConnector {
    base: String,
    generation_path: String,
    execution_path: String,
}

impl WsConnector {
    pub fn new(server_url: &str) -> Result<Self, TransportError> {
        Ok(Self {
            base: websocket_base_url(server_url)?,
            generation_path: GENERATION_PATH.to_string(),
            execution_path: EXECUTION_PATH.to_string(),
        })
    }

    pub fn with_paths(mut self, generation_path: impl Into<String>, execution_path: impl Into<String>) -> Self {
        self.generation_path = generation_path.into();
        self.execution_path = execution_path.into();
        self
    }

    pub fn endpoint_url(&self, endpoint: Endpoint) -> Result<Url, TransportError> {
        let path = match endpoint {
            Endpoint::Generation => &self.generation_path,
            Endpoint::Execution => &self.execution_path,
        };
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{path}", self.base))?)
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn open(&self, endpoint: Endpoint) -> Result<Box<dyn DuplexChannel>, TransportError> {
        let url = self.endpoint_url(endpoint)?;
        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Connect {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
        info!(%url, status = %response.status(), ?endpoint, "websocket channel opened");
        Ok(Box::new(WsChannel::new(stream)))
    }
}

pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closing: bool,
}

impl WsChannel {
    pub fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            stream,
            closing: false,
        }
    }
}

#[async_trait]
impl DuplexChannel for WsChannel {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes),
            Frame::Close(reason) => return self.close(reason.as_deref().unwrap_or_default()).await,
        };
        self.stream
            .send(message)
            .await
            .map_err(|err| TransportError::Send(err.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(Message::Text(text)) => Ok(Frame::Text(text)),
                Ok(Message::Binary(bytes)) => Ok(Frame::Binary(bytes)),
                Ok(Message::Close(close)) => {
                    let reason = close
                        .map(|frame| frame.reason.into_owned())
                        .filter(|reason| !reason.is_empty());
                    Ok(Frame::Close(reason))
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(err) => Err(TransportError::Receive(err.to_string())),
            };
            return Some(frame);
        }
    }

    async fn close(&mut self, reason: &str) -> Result<(), TransportError> {
        if self.closing {
            return Ok(());
        }
        self.closing = true;
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: Cow::Owned(reason.to_string()),
        };
        match self.stream.close(Some(frame)).await {
            Ok(()) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => return Ok(()),
            Err(err) => return Err(TransportError::Send(err.to_string())),
        }
        let drained = tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, async {
            while let Some(Ok(_)) = self.stream.next().await {}
        })
        .await;
        if drained.is_err() {
            debug!("peer did not finish the close handshake in time");
        }
        Ok(())
    }
}
