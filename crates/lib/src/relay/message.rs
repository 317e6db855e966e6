//! Normalised message passed between the two sides of the relay.

/// Network a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mumble,
    Slack,
}

/// One message observed on a network, ready to be posted on the other one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    pub sender_display_name: String,
    pub body: String,
    pub origin: Network,
}

impl RelayMessage {
    pub fn new(
        sender_display_name: impl Into<String>,
        body: impl Into<String>,
        origin: Network,
    ) -> Self {
        Self {
            sender_display_name: sender_display_name.into(),
            body: body.into(),
            origin,
        }
    }

    /// Text as posted on the other side: `name: body`.
    pub fn prefixed(&self) -> String {
        format!("{}: {}", self.sender_display_name, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_puts_sender_first() {
        let msg = RelayMessage::new("alice", "hi <b>all</b>", Network::Mumble);
        assert_eq!(msg.prefixed(), "alice: hi <b>all</b>");
    }
}
