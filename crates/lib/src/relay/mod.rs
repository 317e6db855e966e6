//! Bidirectional relay between Mumble and Slack.
//!
//! Mumble -> Slack: the Mumble listener enqueues `name: text` on a bounded FIFO
//! queue; one drain task extracts inline images, strips HTML and posts to Slack.
//! Slack -> Mumble: the Slack event loop resolves the sender, rewrites links and
//! posts to Mumble directly, one event at a time.

mod dispatch;
mod engine;
mod guard;
mod inbound;
mod message;
mod runtime;

pub use dispatch::{MumbleDispatcher, MumbleSlot, SlackDelivery, SlackDispatcher};
pub use engine::{RelayCore, RelayInputs, RelayOptions, RelayState, RelayTasks};
pub use guard::LoopGuard;
pub use inbound::{Flow, MumbleInbound, SlackInbound};
pub use message::{Network, RelayMessage};
pub use runtime::run_relay;
