//! Slack RTM event model.
//!
//! Every frame from the RTM socket is parsed into one [`SlackEvent`]; kinds the
//! relay does not know become [`SlackEvent::Unrecognized`] rather than errors.

use serde_json::Value;
use std::time::Duration;

/// Events delivered by the RTM connection manager, in socket order.
#[derive(Debug, Clone, PartialEq)]
pub enum SlackEvent {
    Hello,
    /// Socket established (emitted by the manager, not by Slack).
    Connected {
        self_name: String,
        team: String,
        connection_count: u32,
    },
    /// A user posted a plain message.
    TextPosted {
        user: String,
        channel: String,
        text: String,
    },
    /// Message with a subtype (edit, join, bot post, ...). Not relayed.
    MessageSubtype { subtype: String },
    FileCommentAdded { user: String, comment: String },
    FileCommentEdited(Value),
    FilePublic(Value),
    FileShared(Value),
    ChannelJoined(Value),
    ReactionAdded(Value),
    Presence { user: String, presence: String },
    /// Round trip of the manager's last ping.
    Latency(Duration),
    Error { code: i64, message: String },
    Disconnected { intentional: bool },
    /// An inbound frame exceeded the socket's size limit.
    MessageTooLong { size: usize, max_size: usize },
    /// The token was rejected. The manager stops after emitting this.
    InvalidAuth,
    Unrecognized { kind: String },
}

/// What the relay does with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Translate and forward to Mumble.
    Relay,
    /// Log only.
    LogOnly,
    /// Stop processing Slack events.
    Stop,
}

impl SlackEvent {
    pub fn disposition(&self) -> Disposition {
        match self {
            SlackEvent::TextPosted { .. } => Disposition::Relay,
            SlackEvent::InvalidAuth => Disposition::Stop,
            _ => Disposition::LogOnly,
        }
    }

    /// Short kind name for logs.
    pub fn kind(&self) -> &str {
        match self {
            SlackEvent::Hello => "hello",
            SlackEvent::Connected { .. } => "connected",
            SlackEvent::TextPosted { .. } => "message",
            SlackEvent::MessageSubtype { .. } => "message_subtype",
            SlackEvent::FileCommentAdded { .. } => "file_comment_added",
            SlackEvent::FileCommentEdited(_) => "file_comment_edited",
            SlackEvent::FilePublic(_) => "file_public",
            SlackEvent::FileShared(_) => "file_shared",
            SlackEvent::ChannelJoined(_) => "channel_joined",
            SlackEvent::ReactionAdded(_) => "reaction_added",
            SlackEvent::Presence { .. } => "presence_change",
            SlackEvent::Latency(_) => "latency",
            SlackEvent::Error { .. } => "error",
            SlackEvent::Disconnected { .. } => "disconnected",
            SlackEvent::MessageTooLong { .. } => "message_too_long",
            SlackEvent::InvalidAuth => "invalid_auth",
            SlackEvent::Unrecognized { kind } => kind.as_str(),
        }
    }
}

/// One decoded RTM frame. Pongs and goodbyes are handled by the manager itself.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RtmFrame {
    Event(SlackEvent),
    Pong { sent_at_ms: Option<i64> },
    Goodbye,
    /// Acknowledgement of something we sent (`reply_to` without `type`).
    Reply,
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Parse a text frame from the RTM socket.
pub(crate) fn parse_frame(text: &str) -> RtmFrame {
    let v: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            return RtmFrame::Event(SlackEvent::Error {
                code: 0,
                message: format!("unparseable frame: {}", e),
            })
        }
    };
    let Some(kind) = v.get("type").and_then(Value::as_str).map(str::to_string) else {
        if v.get("reply_to").is_some() {
            return RtmFrame::Reply;
        }
        return RtmFrame::Event(SlackEvent::Unrecognized {
            kind: "untyped".to_string(),
        });
    };
    let event = match kind.as_str() {
        "hello" => SlackEvent::Hello,
        "goodbye" => return RtmFrame::Goodbye,
        "pong" => {
            return RtmFrame::Pong {
                sent_at_ms: v.get("time").and_then(Value::as_i64),
            }
        }
        "message" => match v.get("subtype").and_then(Value::as_str) {
            None | Some("me_message") => SlackEvent::TextPosted {
                user: str_field(&v, "user"),
                channel: str_field(&v, "channel"),
                text: str_field(&v, "text"),
            },
            Some(subtype) => SlackEvent::MessageSubtype {
                subtype: subtype.to_string(),
            },
        },
        "file_comment_added" => {
            let comment = v.get("comment").cloned().unwrap_or(Value::Null);
            SlackEvent::FileCommentAdded {
                user: str_field(&comment, "user"),
                comment: str_field(&comment, "comment"),
            }
        }
        "file_comment_edited" => SlackEvent::FileCommentEdited(v),
        "file_public" => SlackEvent::FilePublic(v),
        "file_shared" => SlackEvent::FileShared(v),
        "channel_joined" => SlackEvent::ChannelJoined(v),
        "reaction_added" => SlackEvent::ReactionAdded(v),
        "presence_change" => SlackEvent::Presence {
            user: str_field(&v, "user"),
            presence: str_field(&v, "presence"),
        },
        "error" => {
            let err = v.get("error").cloned().unwrap_or(Value::Null);
            SlackEvent::Error {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: str_field(&err, "msg"),
            }
        }
        other => SlackEvent::Unrecognized {
            kind: other.to_string(),
        },
    };
    RtmFrame::Event(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(text: &str) -> SlackEvent {
        match parse_frame(text) {
            RtmFrame::Event(e) => e,
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn plain_message_is_text_posted() {
        assert_eq!(
            event(r#"{"type":"message","user":"U1","channel":"C1","text":"hi <https://x.io|x>"}"#),
            SlackEvent::TextPosted {
                user: "U1".to_string(),
                channel: "C1".to_string(),
                text: "hi <https://x.io|x>".to_string(),
            }
        );
    }

    #[test]
    fn edited_message_is_not_relayed() {
        let e = event(r#"{"type":"message","subtype":"message_changed","message":{}}"#);
        assert_eq!(
            e,
            SlackEvent::MessageSubtype {
                subtype: "message_changed".to_string()
            }
        );
        assert_eq!(e.disposition(), Disposition::LogOnly);
    }

    #[test]
    fn file_comment_fields_are_read() {
        assert_eq!(
            event(r#"{"type":"file_comment_added","comment":{"user":"U2","comment":"nice"}}"#),
            SlackEvent::FileCommentAdded {
                user: "U2".to_string(),
                comment: "nice".to_string(),
            }
        );
    }

    #[test]
    fn unknown_kind_is_unrecognized() {
        let e = event(r#"{"type":"dnd_updated_user","user":"U1"}"#);
        assert_eq!(e.kind(), "dnd_updated_user");
        assert_eq!(e.disposition(), Disposition::LogOnly);
    }

    #[test]
    fn control_frames() {
        assert_eq!(
            parse_frame(r#"{"type":"pong","reply_to":3,"time":1700000000000}"#),
            RtmFrame::Pong {
                sent_at_ms: Some(1_700_000_000_000)
            }
        );
        assert_eq!(parse_frame(r#"{"type":"goodbye"}"#), RtmFrame::Goodbye);
        assert_eq!(parse_frame(r#"{"ok":true,"reply_to":1,"ts":"1.2"}"#), RtmFrame::Reply);
    }

    #[test]
    fn error_frame_and_garbage() {
        assert_eq!(
            event(r#"{"type":"error","error":{"code":1,"msg":"Socket URL has expired"}}"#),
            SlackEvent::Error {
                code: 1,
                message: "Socket URL has expired".to_string(),
            }
        );
        assert!(matches!(event("not json"), SlackEvent::Error { code: 0, .. }));
    }

    #[test]
    fn dispositions() {
        assert_eq!(SlackEvent::InvalidAuth.disposition(), Disposition::Stop);
        assert_eq!(
            SlackEvent::Presence {
                user: "U".to_string(),
                presence: "away".to_string()
            }
            .disposition(),
            Disposition::LogOnly
        );
    }
}
