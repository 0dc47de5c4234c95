use std::collections::VecDeque;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::RealtimeError;
use crate::protocol::EnginePacket;

/// Engine.IO over a single WebSocket.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    /// Packets carried over from a polling session during upgrade.
    backlog: VecDeque<EnginePacket>,
}

impl WebSocketTransport {
    pub async fn connect(url: &Url) -> Result<Self, RealtimeError> {
        tracing::debug!(url = %redact(url), "Opening WebSocket transport");
        let (stream, _) = connect_async(url.as_str()).await?;
        Ok(Self {
            stream,
            backlog: VecDeque::new(),
        })
    }

    pub(super) fn extend_backlog(&mut self, packets: Vec<EnginePacket>) {
        self.backlog.extend(packets);
    }

    pub async fn send(&mut self, packet: &EnginePacket) -> Result<(), RealtimeError> {
        let text = packet.encode();
        tracing::trace!(packet = %text, "ws send");
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Next engine packet; `Ok(None)` once the socket is closed.
    pub async fn recv(&mut self) -> Result<Option<EnginePacket>, RealtimeError> {
        if let Some(packet) = self.backlog.pop_front() {
            return Ok(Some(packet));
        }
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::trace!(packet = %text.as_str(), "ws recv");
                    return EnginePacket::decode(text.as_str()).map(Some);
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = self.stream.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(Message::Binary(_))) => {
                    tracing::debug!("Ignoring binary WebSocket frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(RealtimeError::WebSocket(e)),
            }
        }
    }

    pub async fn close(&mut self) {
        let _ = self.send(&EnginePacket::Close).await;
        let _ = self.stream.close(None).await;
    }
}

/// URL without its query string, for logs (the query carries the token).
pub(crate) fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}
