use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RealtimeError;

/// Separator between packets in a polling payload.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Handshake data sent by the server in the open packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl Handshake {
    /// Longest silence tolerated before the transport is considered lost.
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }

    pub fn offers_upgrade(&self, transport: &str) -> bool {
        self.upgrades.iter().any(|u| u == transport)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    /// Ping with optional probe data.
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn encode(&self) -> String {
        match self {
            Self::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            Self::Close => "1".into(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".into(),
            Self::Noop => "6".into(),
        }
    }

    pub fn decode(text: &str) -> Result<Self, RealtimeError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| RealtimeError::Protocol("empty engine packet".into()))?;
        let data = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(data)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(data.to_string())),
            '3' => Ok(Self::Pong(data.to_string())),
            '4' => Ok(Self::Message(data.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            'b' => Err(RealtimeError::Protocol(
                "binary engine packets are not supported".into(),
            )),
            other => Err(RealtimeError::Protocol(format!(
                "unknown engine packet type {other:?}"
            ))),
        }
    }
}

/// Split a polling response body into packets.
pub fn decode_payload(body: &str) -> Result<Vec<EnginePacket>, RealtimeError> {
    body.split(RECORD_SEPARATOR)
        .filter(|part| !part.is_empty())
        .map(EnginePacket::decode)
        .collect()
}

/// Join packets into a polling request body.
pub fn encode_payload(packets: &[EnginePacket]) -> String {
    packets
        .iter()
        .map(EnginePacket::encode)
        .collect::<Vec<_>>()
        .join(&RECORD_SEPARATOR.to_string())
}
