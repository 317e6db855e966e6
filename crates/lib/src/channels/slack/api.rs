//! Slack Web API calls used by the relay: post, upload, user lookup, RTM connect.

use async_trait::async_trait;
use serde::Deserialize;

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Error codes Slack returns when the token itself is unusable.
const AUTH_ERROR_CODES: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
];

#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("slack request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("slack api error: {0}")]
    Api(String),
    #[error("slack rejected credentials: {0}")]
    InvalidAuth(String),
    #[error("slack websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl SlackError {
    fn from_code(code: Option<String>) -> Self {
        let code = code.unwrap_or_else(|| "unknown error".to_string());
        if AUTH_ERROR_CODES.contains(&code.as_str()) {
            SlackError::InvalidAuth(code)
        } else {
            SlackError::Api(code)
        }
    }
}

/// File uploaded alongside a relayed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub title: String,
    pub filename: String,
    pub content: Vec<u8>,
    /// Channel to share the file into.
    pub channel: Option<String>,
}

/// Outbound Slack operations. Implemented by [`SlackWebClient`]; tests supply fakes.
#[async_trait]
pub trait SlackClient: Send + Sync {
    /// chat.postMessage. `as_user` posts under the token's own user instead of a bot identity.
    async fn post_message(&self, channel: &str, text: &str, as_user: bool) -> Result<(), SlackError>;

    /// files.getUploadURLExternal + files.completeUploadExternal.
    async fn upload_file(&self, upload: FileUpload) -> Result<(), SlackError>;

    /// users.info; returns the user's name.
    async fn user_name(&self, user_id: &str) -> Result<String, SlackError>;
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadUrlResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    upload_url: Option<String>,
    #[serde(default)]
    file_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<SlackUser>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RtmConnectResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "self")]
    me: Option<RtmSelf>,
    #[serde(default)]
    team: Option<RtmTeam>,
}

#[derive(Debug, Deserialize)]
struct RtmSelf {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RtmTeam {
    #[serde(default)]
    name: String,
    #[serde(default)]
    domain: String,
}

/// Result of rtm.connect: websocket URL and who we are.
#[derive(Debug, Clone)]
pub struct RtmSession {
    pub url: String,
    pub self_name: String,
    pub team: String,
}

/// Slack Web API client (bearer token auth).
#[derive(Clone)]
pub struct SlackWebClient {
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl SlackWebClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, slack_api_base())
    }

    pub fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// rtm.connect: get a websocket URL for the real-time event stream.
    pub async fn rtm_connect(&self) -> Result<RtmSession, SlackError> {
        let res = self
            .client
            .post(self.url("rtm.connect"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let data: RtmConnectResponse = res.json().await?;
        if !data.ok {
            return Err(SlackError::from_code(data.error));
        }
        let url = data
            .url
            .ok_or_else(|| SlackError::Api("rtm.connect returned no url".to_string()))?;
        let team = data
            .team
            .map(|t| if t.name.is_empty() { t.domain } else { t.name })
            .unwrap_or_default();
        Ok(RtmSession {
            url,
            self_name: data.me.map(|m| m.name).unwrap_or_default(),
            team,
        })
    }
}

#[async_trait]
impl SlackClient for SlackWebClient {
    async fn post_message(&self, channel: &str, text: &str, as_user: bool) -> Result<(), SlackError> {
        let body = serde_json::json!({
            "channel": channel,
            "text": text,
            "as_user": as_user,
        });
        let res = self
            .client
            .post(self.url("chat.postMessage"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let data: SlackResponse = res.json().await?;
        if !data.ok {
            return Err(SlackError::from_code(data.error));
        }
        Ok(())
    }

    /// Three calls: reserve an upload URL, send the bytes there, then complete the
    /// upload with its title and target channel.
    async fn upload_file(&self, upload: FileUpload) -> Result<(), SlackError> {
        let length = upload.content.len().to_string();
        let res = self
            .client
            .post(self.url("files.getUploadURLExternal"))
            .bearer_auth(&self.token)
            .form(&[("filename", upload.filename.as_str()), ("length", length.as_str())])
            .send()
            .await?;
        let data: UploadUrlResponse = res.json().await?;
        if !data.ok {
            return Err(SlackError::from_code(data.error));
        }
        let (Some(upload_url), Some(file_id)) = (data.upload_url, data.file_id) else {
            return Err(SlackError::Api(
                "files.getUploadURLExternal returned no upload url".to_string(),
            ));
        };

        self.client
            .post(&upload_url)
            .body(upload.content)
            .send()
            .await?
            .error_for_status()?;

        let mut body = serde_json::json!({
            "files": [{ "id": file_id, "title": upload.title }],
        });
        if let Some(channel) = upload.channel {
            body["channel_id"] = serde_json::Value::String(channel);
        }
        let res = self
            .client
            .post(self.url("files.completeUploadExternal"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let data: SlackResponse = res.json().await?;
        if !data.ok {
            return Err(SlackError::from_code(data.error));
        }
        Ok(())
    }

    async fn user_name(&self, user_id: &str) -> Result<String, SlackError> {
        let res = self
            .client
            .get(self.url("users.info"))
            .bearer_auth(&self.token)
            .query(&[("user", user_id)])
            .send()
            .await?;
        let data: UserInfoResponse = res.json().await?;
        if !data.ok {
            return Err(SlackError::from_code(data.error));
        }
        data.user
            .map(|u| u.name)
            .ok_or_else(|| SlackError::Api("users.info returned no user".to_string()))
    }
}

/// Resolve Slack API base URL (for tests or custom endpoints).
pub fn slack_api_base() -> String {
    std::env::var("SLACK_API_BASE").unwrap_or_else(|_| SLACK_API_BASE.to_string())
}
