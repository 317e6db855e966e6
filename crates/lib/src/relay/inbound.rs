//! Inbound side: turn network events into relay messages.
//!
//! Mumble text is enqueued untouched on the Mumble -> Slack queue; translation
//! happens when it is drained. Slack text is translated and posted to Mumble
//! right away, inside the Slack event loop.

use super::dispatch::MumbleDispatcher;
use super::guard::LoopGuard;
use super::message::{Network, RelayMessage};
use crate::channels::{Disposition, SlackClient, SlackEvent};
use crate::format;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Mumble text-message listener. Feeds the Mumble -> Slack queue.
pub struct MumbleInbound {
    guard: LoopGuard,
    queue: mpsc::Sender<RelayMessage>,
}

impl MumbleInbound {
    pub fn new(guard: LoopGuard, queue: mpsc::Sender<RelayMessage>) -> Self {
        Self { guard, queue }
    }

    /// Handle one Mumble text message. Waits while the queue is full.
    /// Returns true if the message was enqueued.
    pub async fn on_text_message(&self, sender: Option<&str>, message: &str) -> bool {
        let Some(name) = sender else {
            log::debug!("mumble: ignoring message without sender");
            return false;
        };
        let Some(name) = self.guard.admit(Some(name)) else {
            log::debug!("mumble: ignoring own message");
            return false;
        };
        let msg = RelayMessage::new(name, message, Network::Mumble);
        if self.queue.send(msg).await.is_err() {
            log::warn!("mumble: relay queue closed, dropping message from {}", name);
            return false;
        }
        true
    }
}

/// Whether the Slack event loop keeps going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Slack event listener. Translates text posts and sends them to Mumble.
pub struct SlackInbound {
    guard: LoopGuard,
    client: Arc<dyn SlackClient>,
    mumble: MumbleDispatcher,
    empty_link_label: String,
}

impl SlackInbound {
    pub fn new(
        guard: LoopGuard,
        client: Arc<dyn SlackClient>,
        mumble: MumbleDispatcher,
        empty_link_label: impl Into<String>,
    ) -> Self {
        Self {
            guard,
            client,
            mumble,
            empty_link_label: empty_link_label.into(),
        }
    }

    pub async fn handle(&self, event: SlackEvent) -> Flow {
        match event.disposition() {
            Disposition::Stop => {
                log::error!("slack: invalid credentials, stopping Slack -> Mumble relay");
                Flow::Stop
            }
            Disposition::Relay => {
                if let SlackEvent::TextPosted { user, text, .. } = event {
                    self.relay_text(&user, &text).await;
                }
                Flow::Continue
            }
            Disposition::LogOnly => {
                log_event(&event);
                Flow::Continue
            }
        }
    }

    async fn relay_text(&self, user_id: &str, text: &str) {
        let name = match self.client.user_name(user_id).await {
            Ok(name) => name,
            Err(e) => {
                log::warn!("slack: user lookup for {:?} failed: {}", user_id, e);
                return;
            }
        };
        if self.guard.is_own(&name) {
            log::debug!("slack: ignoring own message");
            return;
        }
        let body = format::slack_links_to_html(text, &self.empty_link_label);
        let msg = RelayMessage::new(name, body, Network::Slack);
        self.mumble.dispatch(&msg.prefixed()).await;
    }

    /// Process events in order until the stream ends or credentials are rejected.
    pub async fn run(self, mut events: mpsc::Receiver<SlackEvent>) {
        while let Some(event) = events.recv().await {
            if self.handle(event).await == Flow::Stop {
                break;
            }
        }
        log::info!("slack: event loop stopped");
    }
}

fn log_event(event: &SlackEvent) {
    match event {
        SlackEvent::Hello => log::debug!("slack: hello"),
        SlackEvent::Connected {
            self_name,
            team,
            connection_count,
        } => log::info!(
            "slack: connected to {} as {} (connection #{})",
            team,
            self_name,
            connection_count
        ),
        SlackEvent::FileCommentAdded { user, comment } => {
            log::info!("slack: file comment added: {}: {}", user, comment)
        }
        SlackEvent::Presence { user, presence } => {
            log::info!("slack: presence change: {} is {}", user, presence)
        }
        SlackEvent::Latency(latency) => log::info!("slack: current latency: {:?}", latency),
        SlackEvent::Error { code, message } => log::warn!("slack: error {}: {}", code, message),
        SlackEvent::Disconnected { intentional } => {
            log::warn!("slack: disconnected (intentional: {})", intentional)
        }
        SlackEvent::MessageTooLong { size, max_size } => {
            log::warn!("slack: message too long: {} > {} bytes", size, max_size)
        }
        SlackEvent::MessageSubtype { subtype } => {
            log::debug!("slack: not relaying message with subtype {}", subtype)
        }
        SlackEvent::FileCommentEdited(v)
        | SlackEvent::FilePublic(v)
        | SlackEvent::FileShared(v)
        | SlackEvent::ChannelJoined(v)
        | SlackEvent::ReactionAdded(v) => log::info!("slack: {}: {}", event.kind(), v),
        SlackEvent::Unrecognized { kind } => log::debug!("slack: unexpected event: {}", kind),
        SlackEvent::TextPosted { .. } | SlackEvent::InvalidAuth => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mumble_message_is_enqueued_unchanged() {
        let (tx, mut rx) = mpsc::channel(4);
        let inbound = MumbleInbound::new(LoopGuard::new("SlackRelay"), tx);
        assert!(inbound.on_text_message(Some("alice"), "<b>hi</b>").await);
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.prefixed(), "alice: <b>hi</b>");
        assert_eq!(msg.origin, Network::Mumble);
    }

    #[tokio::test]
    async fn mumble_own_and_server_messages_are_dropped() {
        let (tx, mut rx) = mpsc::channel(4);
        let inbound = MumbleInbound::new(LoopGuard::new("SlackRelay"), tx);
        assert!(!inbound.on_text_message(Some("SlackRelay"), "echo").await);
        assert!(!inbound.on_text_message(None, "welcome").await);
        drop(inbound);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_queue_is_not_fatal() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let inbound = MumbleInbound::new(LoopGuard::new("SlackRelay"), tx);
        assert!(!inbound.on_text_message(Some("alice"), "hi").await);
    }
}
