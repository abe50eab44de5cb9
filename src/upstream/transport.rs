use crate::error::UpstreamError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Abstracts the raw socket so [`super::client::UpstreamClient`] can be
/// exercised against a fake in tests without opening a real connection.
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, text: String) -> Result<(), UpstreamError>;

    /// Returns `None` once the peer has closed the stream.
    async fn recv_text(&mut self) -> Option<Result<String, UpstreamError>>;
}

type TungsteniteStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// [`Transport`] backed by a real `tokio-tungstenite` WebSocket connection.
pub struct WsTransport {
    stream: TungsteniteStream,
}

impl WsTransport {
    pub async fn connect(url: &str) -> Result<Self, UpstreamError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|err| UpstreamError::Connect(err.to_string()))?;
        Ok(Self { stream })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), UpstreamError> {
        self.stream
            .send(WsMessage::text(text))
            .await
            .map_err(|err| UpstreamError::Send(err.to_string()))
    }

    async fn recv_text(&mut self) -> Option<Result<String, UpstreamError>> {
        loop {
            let message = self.stream.next().await?;
            match message {
                Ok(WsMessage::Text(text)) => return Some(Ok(text.to_string())),
                Ok(WsMessage::Binary(_)) => continue,
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => continue,
                Ok(WsMessage::Close(_)) => return None,
                Ok(WsMessage::Frame(_)) => continue,
                Err(err) => return Some(Err(UpstreamError::Read(err.to_string()))),
            }
        }
    }
}
