//! Text codec for Engine.IO v4 packets and the Socket.IO v5 packets they carry.
//!
//! Only the text subset is implemented; binary attachments and base64
//! polling frames are rejected as protocol errors.

mod engine;
mod socket;

pub use engine::{decode_payload, encode_payload, EnginePacket, Handshake, RECORD_SEPARATOR};
pub use socket::SocketPacket;
