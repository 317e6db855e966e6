//! Mumble connection: TLS setup, authentication, reader loop and outbound writer.

use crate::proto::{self, Authenticate, Ping, Reject, ServerSync, TextMessage, UserRemove, UserState};
use crate::MumbleError;
use prost::Message;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DEFAULT_PORT: u16 = 64738;
const PING_INTERVAL: Duration = Duration::from_secs(15);
const OUTBOUND_QUEUE: usize = 64;

/// Connection settings for the Mumble server.
#[derive(Debug, Clone)]
pub struct MumbleConfig {
    /// `host` or `host:port` (default port 64738).
    pub server: String,
    pub username: String,
    pub password: Option<String>,
    /// Accept self-signed or mismatched server certificates.
    pub insecure: bool,
}

/// Events delivered by the reader loop, one at a time and in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MumbleEvent {
    /// Server finished the initial sync; the client may now send.
    Connected,
    /// Text message. `sender` is `None` when the server itself is the actor.
    TextMessage {
        sender: Option<String>,
        message: String,
    },
    /// Connection ended (rejected, closed or failed).
    Disconnected { reason: Option<String> },
}

#[derive(Debug, Default, Clone)]
struct UserEntry {
    name: String,
    channel_id: u32,
}

/// Users known on the server and our own session.
#[derive(Debug, Default)]
struct ServerState {
    own_session: Option<u32>,
    users: HashMap<u32, UserEntry>,
}

impl ServerState {
    fn apply_user_state(&mut self, update: &UserState) {
        let Some(session) = update.session else {
            return;
        };
        let entry = self.users.entry(session).or_default();
        if let Some(ref name) = update.name {
            entry.name = name.clone();
        }
        if let Some(channel_id) = update.channel_id {
            entry.channel_id = channel_id;
        }
    }

    fn remove_user(&mut self, session: u32) {
        self.users.remove(&session);
    }

    /// Display name for a text message actor. Actor 0 or absent is the server.
    fn sender_name(&self, actor: Option<u32>) -> Option<String> {
        let actor = actor.filter(|a| *a != 0)?;
        self.users
            .get(&actor)
            .map(|u| u.name.clone())
            .filter(|n| !n.is_empty())
    }

    fn own_channel(&self) -> Option<u32> {
        let session = self.own_session?;
        Some(self.users.get(&session).map(|u| u.channel_id).unwrap_or(0))
    }

    fn own_name(&self) -> Option<String> {
        let session = self.own_session?;
        self.users.get(&session).map(|u| u.name.clone())
    }
}

/// Handle to a live Mumble connection. Cheap to clone.
#[derive(Clone)]
pub struct MumbleClient {
    username: String,
    outbound: mpsc::Sender<Vec<u8>>,
    state: Arc<Mutex<ServerState>>,
}

impl MumbleClient {
    /// Name the server knows us by (falls back to the configured username before sync).
    pub fn self_name(&self) -> String {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.own_name())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.username.clone())
    }

    /// Send an HTML text message to the channel the relay user is currently in.
    pub async fn send_to_current_channel(&self, text: &str) -> Result<(), MumbleError> {
        let channel = self
            .state
            .lock()
            .map_err(|_| MumbleError::Closed)?
            .own_channel()
            .ok_or(MumbleError::NotSynced)?;
        let msg = TextMessage {
            actor: None,
            session: Vec::new(),
            channel_id: vec![channel],
            tree_id: Vec::new(),
            message: text.to_string(),
        };
        self.outbound
            .send(proto::encode_frame(proto::TEXT_MESSAGE, &msg))
            .await
            .map_err(|_| MumbleError::Closed)
    }
}

fn split_server(server: &str) -> (String, String) {
    let server = server.trim();
    match server.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() => (host.to_string(), server.to_string()),
        _ => (server.to_string(), format!("{}:{}", server, DEFAULT_PORT)),
    }
}

/// Connect, authenticate and start the reader loop. Events go to `events` in
/// arrival order; the returned handle finishes when the connection ends.
pub async fn connect(
    config: &MumbleConfig,
    events: mpsc::Sender<MumbleEvent>,
) -> Result<(MumbleClient, JoinHandle<()>), MumbleError> {
    let (host, addr) = split_server(&config.server);
    log::info!("mumble: connecting to {} as {}", addr, config.username);
    let tcp = TcpStream::connect(&addr).await?;
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(config.insecure)
        .danger_accept_invalid_hostnames(config.insecure)
        .build()?;
    let stream = tokio_native_tls::TlsConnector::from(tls)
        .connect(&host, tcp)
        .await?;
    let (mut reader, mut writer) = tokio::io::split(stream);

    writer
        .write_all(&proto::encode_frame(proto::VERSION, &proto::client_version()))
        .await?;
    let auth = Authenticate {
        username: Some(config.username.clone()),
        password: config.password.clone(),
        tokens: Vec::new(),
        celt_versions: Vec::new(),
        opus: Some(true),
    };
    writer
        .write_all(&proto::encode_frame(proto::AUTHENTICATE, &auth))
        .await?;
    writer.flush().await?;

    let (outbound, mut outbound_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_QUEUE);
    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = writer.write_all(&frame).await {
                log::warn!("mumble: write failed: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                log::warn!("mumble: flush failed: {}", e);
                break;
            }
        }
        log::debug!("mumble: writer stopped");
    });

    let ping_tx = outbound.clone();
    let pinger = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PING_INTERVAL);
        loop {
            ticker.tick().await;
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            let ping = Ping {
                timestamp: Some(timestamp),
            };
            if ping_tx
                .send(proto::encode_frame(proto::PING, &ping))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let state = Arc::new(Mutex::new(ServerState::default()));
    let client = MumbleClient {
        username: config.username.clone(),
        outbound,
        state: state.clone(),
    };

    let reader_handle = tokio::spawn(async move {
        let reason = run_reader(&mut reader, &state, &events).await;
        pinger.abort();
        match reason {
            ReaderEnd::ReceiverGone => {
                log::debug!("mumble: event receiver dropped, stopping reader");
            }
            ReaderEnd::Closed(reason) => {
                log::warn!(
                    "mumble: connection ended: {}",
                    reason.as_deref().unwrap_or("closed")
                );
                let _ = events.send(MumbleEvent::Disconnected { reason }).await;
            }
        }
    });

    Ok((client, reader_handle))
}

enum ReaderEnd {
    ReceiverGone,
    Closed(Option<String>),
}

async fn run_reader<R: AsyncRead + Unpin>(
    reader: &mut R,
    state: &Mutex<ServerState>,
    events: &mpsc::Sender<MumbleEvent>,
) -> ReaderEnd {
    loop {
        let (kind, payload) = match proto::read_frame(reader).await {
            Ok(frame) => frame,
            Err(e) => return ReaderEnd::Closed(Some(e.to_string())),
        };
        let event = match handle_frame(kind, &payload, state) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(MumbleError::Rejected(reason)) => return ReaderEnd::Closed(Some(reason)),
            Err(e) => {
                log::debug!("mumble: skipping frame type {}: {}", kind, e);
                continue;
            }
        };
        if events.send(event).await.is_err() {
            return ReaderEnd::ReceiverGone;
        }
    }
}

/// Apply one frame to the server state; returns the event it produces, if any.
fn handle_frame(
    kind: u16,
    payload: &[u8],
    state: &Mutex<ServerState>,
) -> Result<Option<MumbleEvent>, MumbleError> {
    let mut state = state.lock().map_err(|_| MumbleError::Closed)?;
    match kind {
        proto::SERVER_SYNC => {
            let sync = ServerSync::decode(payload)?;
            state.own_session = sync.session;
            log::info!("mumble: synchronised (session {:?})", sync.session);
            Ok(Some(MumbleEvent::Connected))
        }
        proto::USER_STATE => {
            state.apply_user_state(&UserState::decode(payload)?);
            Ok(None)
        }
        proto::USER_REMOVE => {
            state.remove_user(UserRemove::decode(payload)?.session);
            Ok(None)
        }
        proto::TEXT_MESSAGE => {
            let msg = TextMessage::decode(payload)?;
            Ok(Some(MumbleEvent::TextMessage {
                sender: state.sender_name(msg.actor),
                message: msg.message,
            }))
        }
        proto::REJECT => {
            let reject = Reject::decode(payload)?;
            Err(MumbleError::Rejected(
                reject.reason.unwrap_or_else(|| "no reason given".to_string()),
            ))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(session: u32, name: Option<&str>, channel: Option<u32>) -> UserState {
        UserState {
            session: Some(session),
            actor: None,
            name: name.map(str::to_string),
            user_id: None,
            channel_id: channel,
        }
    }

    #[test]
    fn split_server_adds_default_port() {
        assert_eq!(
            split_server("mumble.example.org"),
            ("mumble.example.org".to_string(), "mumble.example.org:64738".to_string())
        );
        assert_eq!(
            split_server("localhost:1234"),
            ("localhost".to_string(), "localhost:1234".to_string())
        );
    }

    #[test]
    fn text_message_resolves_sender_name() {
        let state = Mutex::new(ServerState::default());
        state.lock().unwrap().apply_user_state(&user(5, Some("alice"), Some(2)));
        let msg = TextMessage {
            actor: Some(5),
            session: vec![],
            channel_id: vec![2],
            tree_id: vec![],
            message: "hi".to_string(),
        };
        let event = handle_frame(proto::TEXT_MESSAGE, &msg.encode_to_vec(), &state).unwrap();
        assert_eq!(
            event,
            Some(MumbleEvent::TextMessage {
                sender: Some("alice".to_string()),
                message: "hi".to_string(),
            })
        );
    }

    #[test]
    fn server_message_has_no_sender() {
        let state = Mutex::new(ServerState::default());
        let msg = TextMessage {
            actor: None,
            session: vec![],
            channel_id: vec![],
            tree_id: vec![],
            message: "welcome".to_string(),
        };
        let event = handle_frame(proto::TEXT_MESSAGE, &msg.encode_to_vec(), &state).unwrap();
        assert_eq!(
            event,
            Some(MumbleEvent::TextMessage {
                sender: None,
                message: "welcome".to_string(),
            })
        );
    }

    #[test]
    fn user_state_updates_keep_previous_fields() {
        let mut state = ServerState::default();
        state.own_session = Some(1);
        state.apply_user_state(&user(1, Some("SlackRelay"), None));
        state.apply_user_state(&user(1, None, Some(9)));
        assert_eq!(state.own_channel(), Some(9));
        assert_eq!(state.own_name().as_deref(), Some("SlackRelay"));

        state.remove_user(1);
        assert_eq!(state.own_channel(), Some(0));
    }

    #[test]
    fn server_sync_emits_connected() {
        let state = Mutex::new(ServerState::default());
        let sync = ServerSync {
            session: Some(42),
            max_bandwidth: None,
            welcome_text: None,
            permissions: None,
        };
        let event = handle_frame(proto::SERVER_SYNC, &sync.encode_to_vec(), &state).unwrap();
        assert_eq!(event, Some(MumbleEvent::Connected));
        assert_eq!(state.lock().unwrap().own_session, Some(42));
    }

    #[test]
    fn reject_is_reported() {
        let state = Mutex::new(ServerState::default());
        let reject = Reject {
            kind: Some(4),
            reason: Some("wrong password".to_string()),
        };
        let err = handle_frame(proto::REJECT, &reject.encode_to_vec(), &state).unwrap_err();
        assert!(matches!(err, MumbleError::Rejected(r) if r == "wrong password"));
    }
}
