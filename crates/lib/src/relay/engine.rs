//! Relay orchestration: owns both adapters, the Mumble -> Slack queue and its
//! drain task.
//!
//! States: `Idle -> ConnectingBoth -> Relaying -> ShuttingDown`. `Relaying` is
//! entered when the Mumble session reports `Connected`; the Slack side counts as
//! ready once its event stream is being consumed.

use super::dispatch::{MumbleDispatcher, MumbleSlot, SlackDispatcher};
use super::guard::LoopGuard;
use super::inbound::{MumbleInbound, SlackInbound};
use super::message::RelayMessage;
use crate::channels::{MumbleEvent, MumbleSession, SlackClient, SlackEvent};
use crate::config::Config;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, OnceCell};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    ConnectingBoth,
    Relaying,
    ShuttingDown,
}

/// Identities and tuning the relay runs with.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Name the relay posts under on Mumble.
    pub mumble_name: String,
    /// Name the relay posts under on Slack.
    pub slack_name: String,
    pub slack_channel: String,
    pub upload_title: String,
    pub empty_link_label: String,
    pub queue_capacity: usize,
}

impl RelayOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mumble_name: config.mumble.username.clone(),
            slack_name: config.relay.slack_bot_name.clone(),
            slack_channel: config.slack_channel.clone(),
            upload_title: config.relay.upload_title.clone(),
            empty_link_label: config.relay.empty_link_label.clone(),
            queue_capacity: config.relay.queue_capacity.max(1),
        }
    }
}

/// Inbound streams and the Mumble send handle, produced by connecting both networks.
pub struct RelayInputs {
    pub mumble_session: Arc<dyn MumbleSession>,
    pub mumble_events: mpsc::Receiver<MumbleEvent>,
    pub slack_events: mpsc::Receiver<SlackEvent>,
}

/// Tasks spawned by [`RelayCore::start`].
pub struct RelayTasks {
    pub mumble_inbound: JoinHandle<()>,
    pub slack_inbound: JoinHandle<()>,
    pub drain: JoinHandle<()>,
}

impl RelayTasks {
    fn abort(&self) {
        self.mumble_inbound.abort();
        self.slack_inbound.abort();
        self.drain.abort();
    }
}

pub struct RelayCore {
    options: RelayOptions,
    slack: Arc<dyn SlackClient>,
    mumble: MumbleSlot,
    state: Arc<watch::Sender<RelayState>>,
}

impl RelayCore {
    pub fn new(options: RelayOptions, slack: Arc<dyn SlackClient>) -> Self {
        let (state, _) = watch::channel(RelayState::Idle);
        Self {
            options,
            slack,
            mumble: Arc::new(OnceCell::new()),
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    /// Leave `Idle`: called before either network's connection is requested.
    pub fn connecting(&self) {
        self.state.send_if_modified(|s| {
            if *s == RelayState::Idle {
                *s = RelayState::ConnectingBoth;
                true
            } else {
                false
            }
        });
    }

    /// Spawn the Mumble listener, the Slack listener and the queue drain.
    pub fn start(&self, inputs: RelayInputs) -> RelayTasks {
        self.connecting();
        let (queue_tx, queue_rx) = mpsc::channel::<RelayMessage>(self.options.queue_capacity);

        let dispatcher = SlackDispatcher::new(
            self.slack.clone(),
            self.options.slack_channel.clone(),
            self.options.upload_title.clone(),
        );
        let drain = tokio::spawn(drain_queue(queue_rx, dispatcher));

        let mumble_inbound = MumbleInbound::new(LoopGuard::new(self.options.mumble_name.clone()), queue_tx);
        let mumble_task = tokio::spawn(run_mumble_events(
            inputs.mumble_events,
            inputs.mumble_session,
            mumble_inbound,
            self.mumble.clone(),
            self.state.clone(),
        ));

        let slack_inbound = SlackInbound::new(
            LoopGuard::new(self.options.slack_name.clone()),
            self.slack.clone(),
            MumbleDispatcher::new(self.mumble.clone()),
            self.options.empty_link_label.clone(),
        );
        let slack_task = tokio::spawn(slack_inbound.run(inputs.slack_events));

        RelayTasks {
            mumble_inbound: mumble_task,
            slack_inbound: slack_task,
            drain,
        }
    }

    /// Move to `ShuttingDown` and stop all relay tasks.
    pub fn shutdown(&self, tasks: RelayTasks) {
        self.state.send_replace(RelayState::ShuttingDown);
        tasks.abort();
        log::info!("relay stopped");
    }
}

/// Sole consumer of the Mumble -> Slack queue.
async fn drain_queue(mut queue: mpsc::Receiver<RelayMessage>, dispatcher: SlackDispatcher) {
    while let Some(msg) = queue.recv().await {
        dispatcher.dispatch(&msg.prefixed()).await;
    }
    log::debug!("relay queue closed");
}

async fn run_mumble_events(
    mut events: mpsc::Receiver<MumbleEvent>,
    session: Arc<dyn MumbleSession>,
    inbound: MumbleInbound,
    slot: MumbleSlot,
    state: Arc<watch::Sender<RelayState>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            MumbleEvent::Connected => {
                if slot.set(session.clone()).is_err() {
                    log::debug!("mumble: session already published");
                }
                log::info!("mumble: connected as {}, relaying", session.self_name());
                state.send_if_modified(|s| {
                    if *s == RelayState::ConnectingBoth {
                        *s = RelayState::Relaying;
                        true
                    } else {
                        false
                    }
                });
            }
            MumbleEvent::TextMessage { sender, message } => {
                inbound.on_text_message(sender.as_deref(), &message).await;
            }
            MumbleEvent::Disconnected { reason } => {
                log::warn!(
                    "mumble: disconnected: {}",
                    reason.as_deref().unwrap_or("no reason given")
                );
            }
        }
    }
    log::info!("mumble: event loop stopped");
}
