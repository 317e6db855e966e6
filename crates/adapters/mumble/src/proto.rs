//! Mumble control messages (subset of Mumble.proto) and TCP framing.
//!
//! Each frame is a big-endian `u16` message type, a big-endian `u32` payload
//! length, then the protobuf payload.

use crate::MumbleError;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const VERSION: u16 = 0;
pub const AUTHENTICATE: u16 = 2;
pub const PING: u16 = 3;
pub const REJECT: u16 = 4;
pub const SERVER_SYNC: u16 = 5;
pub const USER_REMOVE: u16 = 8;
pub const USER_STATE: u16 = 9;
pub const TEXT_MESSAGE: u16 = 11;

const HEADER_LEN: usize = 6;

/// Upper bound on a single frame. Inline images make text messages large, but
/// anything past this is a broken stream.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Version {
    #[prost(uint32, optional, tag = "1")]
    pub version_v1: Option<u32>,
    #[prost(string, optional, tag = "2")]
    pub release: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub os: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub os_version: Option<String>,
    #[prost(uint64, optional, tag = "5")]
    pub version_v2: Option<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Authenticate {
    #[prost(string, optional, tag = "1")]
    pub username: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub password: Option<String>,
    #[prost(string, repeated, tag = "3")]
    pub tokens: Vec<String>,
    #[prost(int32, repeated, packed = "false", tag = "4")]
    pub celt_versions: Vec<i32>,
    #[prost(bool, optional, tag = "5")]
    pub opus: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ping {
    #[prost(uint64, optional, tag = "1")]
    pub timestamp: Option<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Reject {
    #[prost(int32, optional, tag = "1")]
    pub kind: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub reason: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerSync {
    #[prost(uint32, optional, tag = "1")]
    pub session: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub max_bandwidth: Option<u32>,
    #[prost(string, optional, tag = "3")]
    pub welcome_text: Option<String>,
    #[prost(uint64, optional, tag = "4")]
    pub permissions: Option<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserRemove {
    #[prost(uint32, required, tag = "1")]
    pub session: u32,
    #[prost(uint32, optional, tag = "2")]
    pub actor: Option<u32>,
    #[prost(string, optional, tag = "3")]
    pub reason: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserState {
    #[prost(uint32, optional, tag = "1")]
    pub session: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub actor: Option<u32>,
    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,
    #[prost(uint32, optional, tag = "4")]
    pub user_id: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub channel_id: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TextMessage {
    #[prost(uint32, optional, tag = "1")]
    pub actor: Option<u32>,
    #[prost(uint32, repeated, packed = "false", tag = "2")]
    pub session: Vec<u32>,
    #[prost(uint32, repeated, packed = "false", tag = "3")]
    pub channel_id: Vec<u32>,
    #[prost(uint32, repeated, packed = "false", tag = "4")]
    pub tree_id: Vec<u32>,
    #[prost(string, required, tag = "5")]
    pub message: String,
}

/// Client version advertised to the server (1.4.0).
pub fn client_version() -> Version {
    Version {
        version_v1: Some((1 << 16) | (4 << 8)),
        release: Some(format!("slumble {}", env!("CARGO_PKG_VERSION"))),
        os: Some(std::env::consts::OS.to_string()),
        os_version: None,
        version_v2: Some((1u64 << 48) | (4u64 << 32)),
    }
}

/// Encode a message into a complete frame (header + payload).
pub fn encode_frame<M: prost::Message>(kind: u16, msg: &M) -> Vec<u8> {
    let payload = msg.encode_to_vec();
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&kind.to_be_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    frame
}

/// Read one frame. Returns the message type and raw payload.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(u16, Vec<u8>), MumbleError> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let kind = u16::from_be_bytes([header[0], header[1]]);
    let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(MumbleError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok((kind, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[tokio::test]
    async fn text_message_frame_reads_back() {
        let msg = TextMessage {
            actor: Some(7),
            session: vec![],
            channel_id: vec![3],
            tree_id: vec![],
            message: "hello <b>there</b>".to_string(),
        };
        let frame = encode_frame(TEXT_MESSAGE, &msg);
        assert_eq!(&frame[..2], &[0, 11]);

        let mut reader: &[u8] = &frame;
        let (kind, payload) = read_frame(&mut reader).await.unwrap();
        assert_eq!(kind, TEXT_MESSAGE);
        let decoded = TextMessage::decode(payload.as_slice()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&TEXT_MESSAGE.to_be_bytes());
        frame.extend_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes());
        let mut reader: &[u8] = &frame;
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, MumbleError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn truncated_frame_is_io_error() {
        let frame = [0u8, 11, 0, 0, 0, 10, 1, 2];
        let mut reader: &[u8] = &frame;
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, MumbleError::Io(_)));
    }
}
