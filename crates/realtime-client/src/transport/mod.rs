//! Engine.IO transports and session negotiation.

mod polling;
mod websocket;

pub use polling::PollingTransport;
pub use websocket::WebSocketTransport;

use crate::endpoint::Endpoint;
use crate::options::{ClientOptions, TransportKind};
use crate::protocol::{EnginePacket, Handshake};
use crate::RealtimeError;

/// An open Engine.IO session on one transport.
pub enum Transport {
    WebSocket(WebSocketTransport),
    Polling(PollingTransport),
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::WebSocket(_) => TransportKind::WebSocket,
            Self::Polling(_) => TransportKind::Polling,
        }
    }

    pub async fn send(&mut self, packet: &EnginePacket) -> Result<(), RealtimeError> {
        match self {
            Self::WebSocket(t) => t.send(packet).await,
            Self::Polling(t) => t.send(packet).await,
        }
    }

    /// Cancel-safe. `Ok(None)` means the transport closed.
    pub async fn recv(&mut self) -> Result<Option<EnginePacket>, RealtimeError> {
        match self {
            Self::WebSocket(t) => t.recv().await,
            Self::Polling(t) => t.recv().await,
        }
    }

    /// Best-effort engine close.
    pub async fn close(&mut self) {
        match self {
            Self::WebSocket(t) => t.close().await,
            Self::Polling(t) => t.close().await,
        }
    }
}

/// Open a session on the first transport, in preference order, that
/// completes the Engine.IO handshake.
pub async fn open(
    endpoint: &Endpoint,
    options: &ClientOptions,
    transports: &[TransportKind],
    token: &str,
    http: &reqwest::Client,
) -> Result<(Transport, Handshake), RealtimeError> {
    let mut last_error = None;
    for &kind in transports {
        match open_one(kind, endpoint, options, token, http).await {
            Ok(opened) => {
                tracing::debug!(transport = %opened.0.kind(), sid = %opened.1.sid, "Engine session open");
                return Ok(opened);
            }
            Err(e) => {
                tracing::warn!(transport = %kind, error = %e, "Transport failed to open");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| RealtimeError::Config("no transports configured".into())))
}

async fn open_one(
    kind: TransportKind,
    endpoint: &Endpoint,
    options: &ClientOptions,
    token: &str,
    http: &reqwest::Client,
) -> Result<(Transport, Handshake), RealtimeError> {
    let url = endpoint.engine_url(&options.path, kind, token, None);
    match kind {
        TransportKind::WebSocket => {
            let mut ws = WebSocketTransport::connect(&url).await?;
            match ws.recv().await? {
                Some(EnginePacket::Open(handshake)) => Ok((Transport::WebSocket(ws), handshake)),
                Some(other) => Err(RealtimeError::Protocol(format!(
                    "expected open packet, got {other:?}"
                ))),
                None => Err(RealtimeError::Closed),
            }
        }
        TransportKind::Polling => {
            let (mut polling, handshake) = PollingTransport::open(http.clone(), url).await?;
            if !(options.upgrade && handshake.offers_upgrade(TransportKind::WebSocket.as_str())) {
                return Ok((Transport::Polling(polling), handshake));
            }

            let mut ws = match probe(endpoint, options, token, &handshake.sid).await {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::warn!(error = %e, "Upgrade probe failed; staying on polling");
                    return Ok((Transport::Polling(polling), handshake));
                }
            };

            // Past this point the polling side is paused, so failure is fatal.
            let backlog = polling.pause();
            ws.send(&EnginePacket::Upgrade).await?;
            ws.extend_backlog(backlog);
            tracing::info!(sid = %handshake.sid, "Transport upgraded to websocket");
            Ok((Transport::WebSocket(ws), handshake))
        }
    }
}

/// Open a WebSocket for an existing session and confirm it with a probe.
async fn probe(
    endpoint: &Endpoint,
    options: &ClientOptions,
    token: &str,
    sid: &str,
) -> Result<WebSocketTransport, RealtimeError> {
    let url = endpoint.engine_url(&options.path, TransportKind::WebSocket, token, Some(sid));
    let mut ws = WebSocketTransport::connect(&url).await?;
    ws.send(&EnginePacket::Ping("probe".into())).await?;
    match ws.recv().await? {
        Some(EnginePacket::Pong(data)) if data == "probe" => Ok(ws),
        other => Err(RealtimeError::Protocol(format!(
            "unexpected probe reply {other:?}"
        ))),
    }
}
