//! Mumble adapter for slumble: a small control-channel client.
//!
//! Speaks just enough of the Mumble TCP protocol (TLS, 6-byte frame header,
//! protobuf payloads) to authenticate, follow the user list, receive text
//! messages and post text into the channel the relay user occupies. Voice is
//! not handled.

mod client;
mod proto;

pub use client::{connect, MumbleClient, MumbleConfig, MumbleEvent};

/// Errors from the Mumble connection.
#[derive(Debug, thiserror::Error)]
pub enum MumbleError {
    #[error("mumble io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mumble tls error: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("mumble protocol decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("mumble frame too large: {0} bytes")]
    FrameTooLarge(usize),
    #[error("mumble server rejected connection: {0}")]
    Rejected(String),
    #[error("mumble session not synchronised yet")]
    NotSynced,
    #[error("mumble connection closed")]
    Closed,
}
