//! Slack side: Web API client, RTM connection manager and event model.

mod api;
mod events;
mod rtm;

pub use api::{slack_api_base, FileUpload, RtmSession, SlackClient, SlackError, SlackWebClient};
pub use events::{Disposition, SlackEvent};
pub use rtm::start_rtm;
