//! Configuration types and loading.
//!
//! Config is a JSON file (default `slumble.config` in the working directory)
//! holding the Slack credentials and target channel, plus optional Mumble
//! connection and relay settings. A missing or malformed file is fatal.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "slumble.config";

/// Top-level application config. Field names follow the original file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Slack API token. Overridden by SLACK_API_TOKEN env.
    #[serde(rename = "SlackAPIToken")]
    pub slack_api_token: String,

    /// Slack channel id (or name) the Mumble side is relayed into.
    #[serde(rename = "SlackChannel")]
    pub slack_channel: String,

    /// Mumble server connection.
    #[serde(rename = "Mumble", default)]
    pub mumble: MumbleSettings,

    /// Relay identities and tuning.
    #[serde(rename = "Relay", default)]
    pub relay: RelaySettings,
}

/// Mumble server, login and TLS settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MumbleSettings {
    /// `host` or `host:port` (default "localhost:64738").
    #[serde(default = "default_mumble_server")]
    pub server: String,

    /// Name the relay logs in with. Also the relay's own identity on Mumble.
    #[serde(default = "default_mumble_username")]
    pub username: String,

    pub password: Option<String>,

    /// Accept self-signed server certificates (default true; most Mumble servers use one).
    #[serde(default = "default_true")]
    pub insecure: bool,
}

/// Relay identity on Slack and message shaping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelaySettings {
    /// Slack user name the relay posts as. Messages from this user are not relayed back.
    #[serde(default = "default_slack_bot_name")]
    pub slack_bot_name: String,

    /// Title given to images uploaded from Mumble.
    #[serde(default = "default_upload_title")]
    pub upload_title: String,

    /// Label used when a Slack link carries an empty title.
    #[serde(default = "default_empty_link_label")]
    pub empty_link_label: String,

    /// Capacity of the Mumble -> Slack queue. Producers wait when it is full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_mumble_server() -> String {
    "localhost:64738".to_string()
}

fn default_mumble_username() -> String {
    "SlackRelay".to_string()
}

fn default_true() -> bool {
    true
}

fn default_slack_bot_name() -> String {
    "mumblerelay".to_string()
}

fn default_upload_title() -> String {
    "Mumble Image".to_string()
}

fn default_empty_link_label() -> String {
    "Link has no title? I didn't know Slack would even do that...".to_string()
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for MumbleSettings {
    fn default() -> Self {
        Self {
            server: default_mumble_server(),
            username: default_mumble_username(),
            password: None,
            insecure: default_true(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            slack_bot_name: default_slack_bot_name(),
            upload_title: default_upload_title(),
            empty_link_label: default_empty_link_label(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Resolve the Slack token: env SLACK_API_TOKEN overrides config.
pub fn resolve_slack_token(config: &Config) -> Option<String> {
    std::env::var("SLACK_API_TOKEN")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            let t = config.slack_api_token.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("SLUMBLE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load and validate config from `path` (or the default path).
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let mut config: Config = serde_json::from_str(&s)
        .with_context(|| format!("parsing config from {}", path.display()))?;
    config.slack_api_token = resolve_slack_token(&config)
        .with_context(|| format!("SlackAPIToken is empty in {}", path.display()))?;
    if config.slack_channel.trim().is_empty() {
        anyhow::bail!("SlackChannel is empty in {}", path.display());
    }
    if config.relay.queue_capacity == 0 {
        anyhow::bail!("Relay.QueueCapacity must be at least 1");
    }
    log::debug!("loaded config from {}", path.display());
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::File::create(&path)
            .and_then(|mut f| f.write_all(body.as_bytes()))
            .expect("write config");
        (dir, path)
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let (_dir, path) =
            write_config(r#"{ "SlackAPIToken": "xoxb-1", "SlackChannel": "C123" }"#);
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.slack_channel, "C123");
        assert_eq!(config.mumble.server, "localhost:64738");
        assert_eq!(config.mumble.username, "SlackRelay");
        assert!(config.mumble.insecure);
        assert_eq!(config.relay.slack_bot_name, "mumblerelay");
        assert_eq!(config.relay.queue_capacity, 64);
    }

    #[test]
    fn optional_sections_are_read() {
        let (_dir, path) = write_config(
            r#"{
                "SlackAPIToken": "xoxb-1",
                "SlackChannel": "C123",
                "Mumble": { "Server": "voice.example.org", "Username": "Bridge", "Insecure": false },
                "Relay": { "SlackBotName": "bridgebot", "QueueCapacity": 8 }
            }"#,
        );
        let (config, _) = load_config(Some(path)).unwrap();
        assert_eq!(config.mumble.server, "voice.example.org");
        assert_eq!(config.mumble.username, "Bridge");
        assert!(!config.mumble.insecure);
        assert_eq!(config.relay.slack_bot_name, "bridgebot");
        assert_eq!(config.relay.queue_capacity, 8);
        assert_eq!(config.relay.upload_title, "Mumble Image");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_config(Some(dir.path().join("absent.config"))).unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let (_dir, path) = write_config(r#"{ "SlackAPIToken": "xoxb-1" }"#);
        let err = load_config(Some(path)).unwrap_err();
        assert!(err.to_string().contains("parsing config"));
    }

    #[test]
    fn empty_channel_is_an_error() {
        let (_dir, path) = write_config(r#"{ "SlackAPIToken": "xoxb-1", "SlackChannel": " " }"#);
        assert!(load_config(Some(path)).is_err());
    }
}
