//! Network clients as seen by the relay.
//!
//! Each network is a capability surface: an ordered stream of inbound events and
//! a send call. Slack is reached over its Web API and RTM socket; Mumble through
//! the `mumble-channel` adapter.

pub mod mumble;
pub mod slack;

pub use mumble::{MumbleConfig, MumbleEvent, MumbleSession};
pub use slack::{Disposition, FileUpload, SlackClient, SlackError, SlackEvent, SlackWebClient};
