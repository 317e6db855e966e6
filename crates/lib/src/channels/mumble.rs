//! Mumble side: the send surface the relay needs from a Mumble session.

use async_trait::async_trait;
use mumble_channel::MumbleClient;

pub use mumble_channel::{MumbleConfig, MumbleEvent};

/// A connected Mumble session the relay can post into.
#[async_trait]
pub trait MumbleSession: Send + Sync {
    /// Name the relay is known by on the server.
    fn self_name(&self) -> String;

    /// Send an HTML text message to the channel the relay user is in.
    async fn send_to_current_channel(&self, text: &str) -> Result<(), String>;
}

#[async_trait]
impl MumbleSession for MumbleClient {
    fn self_name(&self) -> String {
        MumbleClient::self_name(self)
    }

    async fn send_to_current_channel(&self, text: &str) -> Result<(), String> {
        MumbleClient::send_to_current_channel(self, text)
            .await
            .map_err(|e| e.to_string())
    }
}
