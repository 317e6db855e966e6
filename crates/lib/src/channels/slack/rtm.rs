//! Slack RTM connection manager.
//!
//! Connects via rtm.connect, reads the websocket and forwards every frame as a
//! [`SlackEvent`] on a single ordered channel. Reconnects after network drops;
//! stops for good when the token is rejected or the receiver is dropped.

use super::api::{SlackError, SlackWebClient};
use super::events::{parse_frame, RtmFrame, SlackEvent};
use futures_util::{SinkExt, StreamExt};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::error::CapacityError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Start the RTM manager. Events arrive on the returned receiver in socket order.
pub fn start_rtm(
    api: SlackWebClient,
    capacity: usize,
) -> (mpsc::Receiver<SlackEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity);
    log::info!("slack: starting RTM connection manager");
    let handle = tokio::spawn(async move {
        manage_connection(api, tx).await;
        log::info!("slack: RTM connection manager stopped");
    });
    (rx, handle)
}

enum SocketEnd {
    /// Socket closed or failed; reconnect.
    Dropped,
    /// Event receiver is gone; stop.
    ReceiverGone,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

async fn manage_connection(api: SlackWebClient, tx: mpsc::Sender<SlackEvent>) {
    let mut backoff = MIN_BACKOFF;
    let mut connection_count: u32 = 0;
    loop {
        let session = match api.rtm_connect().await {
            Ok(s) => s,
            Err(SlackError::InvalidAuth(code)) => {
                log::error!("slack: rtm.connect rejected token: {}", code);
                let _ = tx.send(SlackEvent::InvalidAuth).await;
                return;
            }
            Err(e) => {
                log::warn!("slack: rtm.connect failed: {}", e);
                if emit(&tx, SlackEvent::Error { code: 0, message: e.to_string() }).await.is_err() {
                    return;
                }
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
                continue;
            }
        };

        let ws = match tokio_tungstenite::connect_async(session.url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                log::warn!("slack: websocket connect failed: {}", e);
                if emit(&tx, SlackEvent::Error { code: 0, message: e.to_string() }).await.is_err() {
                    return;
                }
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
                continue;
            }
        };

        connection_count += 1;
        backoff = MIN_BACKOFF;
        let connected = SlackEvent::Connected {
            self_name: session.self_name,
            team: session.team,
            connection_count,
        };
        if emit(&tx, connected).await.is_err() {
            return;
        }

        match run_socket(ws, &tx).await {
            SocketEnd::ReceiverGone => return,
            SocketEnd::Dropped => {
                if emit(&tx, SlackEvent::Disconnected { intentional: false }).await.is_err() {
                    return;
                }
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
        }
    }
}

async fn emit(tx: &mpsc::Sender<SlackEvent>, event: SlackEvent) -> Result<(), ()> {
    tx.send(event).await.map_err(|_| ())
}

async fn run_socket<S>(ws: S, tx: &mpsc::Sender<SlackEvent>) -> SocketEnd
where
    S: futures_util::Stream<Item = Result<Message, WsError>>
        + futures_util::Sink<Message, Error = WsError>
        + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let mut ticker = tokio::time::interval(PING_INTERVAL);
    ticker.tick().await;
    let mut ping_id: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ping_id += 1;
                let ping = serde_json::json!({ "id": ping_id, "type": "ping", "time": now_ms() });
                if let Err(e) = sink.send(Message::Text(ping.to_string())).await {
                    log::warn!("slack: ping failed: {}", e);
                    return SocketEnd::Dropped;
                }
            }
            frame = stream.next() => {
                let event = match frame {
                    Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                        RtmFrame::Event(event) => event,
                        RtmFrame::Pong { sent_at_ms } => match sent_at_ms {
                            Some(sent) => SlackEvent::Latency(Duration::from_millis(
                                (now_ms() - sent).max(0) as u64,
                            )),
                            None => continue,
                        },
                        RtmFrame::Goodbye => {
                            log::info!("slack: server said goodbye");
                            return SocketEnd::Dropped;
                        }
                        RtmFrame::Reply => continue,
                    },
                    Some(Ok(Message::Close(_))) | None => return SocketEnd::Dropped,
                    Some(Ok(_)) => continue,
                    Some(Err(WsError::Capacity(CapacityError::MessageTooLong { size, max_size }))) => {
                        let _ = emit(tx, SlackEvent::MessageTooLong { size, max_size }).await;
                        return SocketEnd::Dropped;
                    }
                    Some(Err(e)) => {
                        log::warn!("slack: websocket read failed: {}", e);
                        if emit(tx, SlackEvent::Error { code: 0, message: e.to_string() }).await.is_err() {
                            return SocketEnd::ReceiverGone;
                        }
                        return SocketEnd::Dropped;
                    }
                };
                if emit(tx, event).await.is_err() {
                    return SocketEnd::ReceiverGone;
                }
            }
        }
    }
}
