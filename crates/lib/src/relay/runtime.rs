//! Process-level wiring: connect both networks, run the relay until a signal
//! arrives or the Mumble connection ends.

use super::engine::{RelayCore, RelayInputs, RelayOptions};
use crate::channels::slack::start_rtm;
use crate::channels::{MumbleConfig, SlackClient, SlackWebClient};
use crate::config::Config;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Run the relay with a loaded config. Returns an error if the Mumble connection
/// cannot be established or drops; returns Ok on SIGINT/SIGTERM.
pub async fn run_relay(config: Config) -> Result<()> {
    let options = RelayOptions::from_config(&config);
    let web = SlackWebClient::new(config.slack_api_token.clone());
    let slack: Arc<dyn SlackClient> = Arc::new(web.clone());
    let core = RelayCore::new(options.clone(), slack);

    core.connecting();
    // Slack connects in the background while Mumble connects here.
    let (slack_events, rtm_task) = start_rtm(web, options.queue_capacity);

    let mumble_config = MumbleConfig {
        server: config.mumble.server.clone(),
        username: config.mumble.username.clone(),
        password: config.mumble.password.clone(),
        insecure: config.mumble.insecure,
    };
    let (mumble_tx, mumble_events) = mpsc::channel(options.queue_capacity);
    let (mumble_client, mut mumble_reader) =
        match mumble_channel::connect(&mumble_config, mumble_tx).await {
            Ok(connected) => connected,
            Err(e) => {
                rtm_task.abort();
                return Err(e).with_context(|| format!("connecting to mumble at {}", mumble_config.server));
            }
        };

    let tasks = core.start(RelayInputs {
        mumble_session: Arc::new(mumble_client),
        mumble_events,
        slack_events,
    });
    log::info!(
        "relaying between mumble {} and slack channel {}",
        mumble_config.server,
        options.slack_channel
    );

    let result = tokio::select! {
        _ = shutdown_signal() => Ok(()),
        _ = &mut mumble_reader => Err(anyhow::anyhow!("mumble connection closed")),
    };
    core.shutdown(tasks);
    mumble_reader.abort();
    rtm_task.abort();
    result
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping relay");
}
