//! Slumble core library: relays chat between a Mumble channel and a Slack channel.
//!
//! Used by the `slumble` binary; the relay engine is driven through trait-based
//! network surfaces so it can run against fakes in tests.

pub mod channels;
pub mod config;
pub mod format;
pub mod relay;
