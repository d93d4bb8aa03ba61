//! Channel membership lookups via the Bot API `getChatMember` method.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

/// Membership status reported for a user in the gated channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
    #[serde(other)]
    Unknown,
}

impl MemberStatus {
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Creator | Self::Administrator)
    }

    pub fn is_subscribed(self) -> bool {
        matches!(self, Self::Creator | Self::Administrator | Self::Member)
    }
}

#[derive(Debug)]
pub enum OracleError {
    Http(String),
    Timeout,
    /// `ok: false` or a non-success HTTP status.
    Api(String),
    Parse(String),
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleError::Http(e) => write!(f, "HTTP error: {e}"),
            OracleError::Timeout => write!(f, "membership check timed out"),
            OracleError::Api(e) => write!(f, "API error: {e}"),
            OracleError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for OracleError {}

/// Source of truth for channel membership.
pub trait MembershipOracle: Send + Sync {
    fn status(&self, user_id: i64) -> impl Future<Output = Result<MemberStatus, OracleError>> + Send;
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    result: Option<ChatMemberResult>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct ChatMemberResult {
    status: MemberStatus,
}

/// Parse a `getChatMember` response body.
pub fn parse_response(body: &str) -> Result<MemberStatus, OracleError> {
    let parsed: ApiResponse =
        serde_json::from_str(body).map_err(|e| OracleError::Parse(e.to_string()))?;

    if !parsed.ok {
        return Err(OracleError::Api(
            parsed.description.unwrap_or_else(|| "ok: false".to_string()),
        ));
    }

    parsed
        .result
        .map(|r| r.status)
        .ok_or_else(|| OracleError::Parse("missing result".to_string()))
}

/// Oracle backed by the Telegram Bot API over HTTP.
pub struct HttpOracle {
    client: reqwest::Client,
    api_base: String,
    token: String,
    channel: String,
}

impl HttpOracle {
    pub fn new(
        api_base: &str,
        token: &str,
        channel: &str,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            channel: channel.to_string(),
        })
    }

    fn url(&self, user_id: i64) -> String {
        format!(
            "{}/bot{}/getChatMember?chat_id={}&user_id={}",
            self.api_base,
            self.token,
            urlencoding::encode(&self.channel),
            user_id
        )
    }
}

impl MembershipOracle for HttpOracle {
    async fn status(&self, user_id: i64) -> Result<MemberStatus, OracleError> {
        let response = self.client.get(self.url(user_id)).send().await.map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout
            } else {
                // Strip the URL so the bot token never reaches the logs.
                OracleError::Http(e.without_url().to_string())
            }
        })?;

        let http_status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout
            } else {
                OracleError::Http(e.without_url().to_string())
            }
        })?;

        let status = match parse_response(&body) {
            Err(OracleError::Parse(_)) if !http_status.is_success() => {
                return Err(OracleError::Api(format!("{http_status}")));
            }
            other => other?,
        };

        debug!("Membership of user {} in {}: {:?}", user_id, self.channel, status);
        Ok(status)
    }
}
