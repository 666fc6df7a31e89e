use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::effects::transport::BoxStream;
use crate::error::{Error, Result};

type MessageSink = Pin<Box<dyn Sink<Message, Error = Error> + Send>>;
type MessageStream = BoxStream<'static, Result<Message>>;

fn disconnected() -> Error {
    Error::protocol("server disconnected")
}

/// A persistent websocket channel opened from a signed request.
pub struct WebSocket {
    sink: MessageSink,
    stream: MessageStream,
    closed: bool,
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket").field("closed", &self.closed).finish_non_exhaustive()
    }
}

impl WebSocket {
    pub fn from_stream<S>(stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = stream.split();
        Self::from_parts(
            sink.sink_map_err(|e| Error::transport(e.to_string(), e)),
            stream.map(|msg| msg.map_err(|e| Error::transport(e.to_string(), e))),
        )
    }

    /// Build a socket from any message sink and stream, e.g. an in-memory pair.
    pub fn from_parts<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<Message, Error = Error> + Send + 'static,
        St: futures_util::Stream<Item = Result<Message>> + Send + 'static,
    {
        Self { sink: Box::pin(sink), stream: Box::pin(stream), closed: false }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    async fn send(&mut self, message: Message) -> Result<()> {
        if self.closed {
            return Err(disconnected());
        }
        self.sink.send(message).await
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.send(Message::Text(text.into())).await
    }

    pub async fn send_bytes(&mut self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::Binary(data.into())).await
    }

    pub async fn send_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)
            .map_err(|e| Error::client(format!("cannot serialize websocket message: {e}")))?;
        self.send_text(text).await
    }

    /// Next data message; control frames are skipped.
    async fn receive(&mut self) -> Result<Message> {
        if self.closed {
            return Err(disconnected());
        }
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return Err(disconnected());
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(message)) => return Ok(message),
                Some(Err(e)) => return Err(e),
            }
        }
    }

    pub async fn receive_text(&mut self) -> Result<String> {
        match self.receive().await? {
            Message::Text(text) => Ok(text),
            Message::Binary(data) => {
                String::from_utf8(data)
                    .map_err(|e| Error::transport("websocket message is not UTF-8", e))
            }
            _ => Err(Error::protocol("unexpected websocket frame")),
        }
    }

    pub async fn receive_bytes(&mut self) -> Result<Bytes> {
        match self.receive().await? {
            Message::Text(text) => Ok(Bytes::from(text)),
            Message::Binary(data) => Ok(Bytes::from(data)),
            _ => Err(Error::protocol("unexpected websocket frame")),
        }
    }

    pub async fn receive_json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let text = self.receive_text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Send a close frame. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("closing websocket");
        let _ = self.sink.send(Message::Close(None)).await;
        self.sink.close().await
    }
}
