//! Outbound side: perform the network-specific send calls for a relayed message.

use crate::channels::{FileUpload, MumbleSession, SlackClient};
use crate::format;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Mumble session slot, filled once when the Mumble connection is synchronised.
pub type MumbleSlot = Arc<OnceCell<Arc<dyn MumbleSession>>>;

/// What happened to one message sent to Slack.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SlackDelivery {
    pub uploaded: usize,
    pub failed_images: usize,
    pub posted: bool,
}

/// Sends Mumble-originated text to Slack: inline images as file uploads, the rest
/// as a tag-stripped message.
pub struct SlackDispatcher {
    client: Arc<dyn SlackClient>,
    channel: String,
    upload_title: String,
}

impl SlackDispatcher {
    pub fn new(client: Arc<dyn SlackClient>, channel: impl Into<String>, upload_title: impl Into<String>) -> Self {
        Self {
            client,
            channel: channel.into(),
            upload_title: upload_title.into(),
        }
    }

    /// Each image is uploaded on its own; a failed decode or upload skips that image only.
    /// The text post happens regardless.
    pub async fn dispatch(&self, html: &str) -> SlackDelivery {
        let mut delivery = SlackDelivery::default();
        let extraction = format::extract_inline_images(html);
        for (index, image) in extraction.images.into_iter().enumerate() {
            let image = match image {
                Ok(image) => image,
                Err(e) => {
                    log::warn!("slack dispatch: skipping inline image: {}", e);
                    delivery.failed_images += 1;
                    continue;
                }
            };
            let upload = FileUpload {
                title: self.upload_title.clone(),
                filename: image.filename(index + 1),
                content: image.bytes,
                channel: Some(self.channel.clone()),
            };
            match self.client.upload_file(upload).await {
                Ok(()) => delivery.uploaded += 1,
                Err(e) => {
                    log::warn!("slack dispatch: image upload failed: {}", e);
                    delivery.failed_images += 1;
                }
            }
        }

        let text = format::strip_tags(&extraction.remainder);
        match self.client.post_message(&self.channel, &text, true).await {
            Ok(()) => {
                log::debug!("relayed to slack: {}", text);
                delivery.posted = true;
            }
            Err(e) => log::warn!("slack dispatch: postMessage failed: {}", e),
        }
        delivery
    }
}

/// Sends Slack-originated text into the relay's current Mumble channel.
pub struct MumbleDispatcher {
    session: MumbleSlot,
}

impl MumbleDispatcher {
    pub fn new(session: MumbleSlot) -> Self {
        Self { session }
    }

    /// Returns true if the message was handed to the Mumble session.
    pub async fn dispatch(&self, html: &str) -> bool {
        let Some(session) = self.session.get() else {
            log::warn!("mumble dispatch: not connected yet, dropping message");
            return false;
        };
        match session.send_to_current_channel(html).await {
            Ok(()) => {
                log::debug!("relayed to mumble: {}", html);
                true
            }
            Err(e) => {
                log::warn!("mumble dispatch: send failed: {}", e);
                false
            }
        }
    }
}
