//! Echo suppression: the relay never forwards what it posted itself.

/// Compares inbound senders against the name the relay posts under on that network.
///
/// This is the only loop protection, so the relay's Mumble and Slack names must
/// differ from every real user's name.
#[derive(Debug, Clone)]
pub struct LoopGuard {
    own_name: String,
}

impl LoopGuard {
    pub fn new(own_name: impl Into<String>) -> Self {
        Self {
            own_name: own_name.into(),
        }
    }

    pub fn own_name(&self) -> &str {
        &self.own_name
    }

    /// True if `sender` is the relay itself.
    pub fn is_own(&self, sender: &str) -> bool {
        sender == self.own_name
    }

    /// Returns the sender when the message should be relayed: present, non-empty
    /// and not the relay.
    pub fn admit<'a>(&self, sender: Option<&'a str>) -> Option<&'a str> {
        sender.filter(|s| !s.is_empty() && !self.is_own(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_name_is_rejected() {
        let guard = LoopGuard::new("SlackRelay");
        assert!(guard.is_own("SlackRelay"));
        assert_eq!(guard.admit(Some("SlackRelay")), None);
    }

    #[test]
    fn comparison_is_exact() {
        let guard = LoopGuard::new("SlackRelay");
        assert_eq!(guard.admit(Some("slackrelay")), Some("slackrelay"));
        assert_eq!(guard.admit(Some("alice")), Some("alice"));
    }

    #[test]
    fn absent_or_empty_sender_is_rejected() {
        let guard = LoopGuard::new("SlackRelay");
        assert_eq!(guard.admit(None), None);
        assert_eq!(guard.admit(Some("")), None);
    }
}
