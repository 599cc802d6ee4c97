use crate::env;
use crate::error::DeliveryError;
use crate::relay::MessageRelay;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_API_BASE: &str = "https://slack.com";
const BOT_TOKEN_PREFIX: &str = "xoxb-";

/// Slack Web API client posting plain-text messages as a bot.
#[derive(Clone)]
pub struct SlackClient {
    client: Client,
    token: Option<String>,
    api_base: String,
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl SlackClient {
    /// Build a client for a bot token. Tokens not starting with `xoxb-`
    /// are rejected.
    pub fn new(token: impl Into<String>) -> Result<Self, DeliveryError> {
        let token = token.into();
        if !token.starts_with(BOT_TOKEN_PREFIX) {
            return Err(DeliveryError::InvalidToken);
        }
        Ok(Self {
            client: Client::new(),
            token: Some(token),
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Build a client and check the token with `auth.test`.
    pub async fn connect(token: impl Into<String>) -> Result<Self, DeliveryError> {
        let client = Self::new(token)?;
        client.auth_test().await?;
        Ok(client)
    }

    /// A client that is not configured; every send fails with
    /// [`DeliveryError::NotConfigured`].
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            token: None,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Build from `SLACK_BOT_TOKEN` and verify it with `auth.test`.
    ///
    /// Any problem yields a disabled client and a warning, so a process can
    /// still start and log without Slack.
    pub async fn from_env() -> Self {
        let Some(token) = env::env_non_empty(env::SLACK_BOT_TOKEN_ENV) else {
            tracing::warn!(
                "{} environment variable is not set. Slack notifications will be disabled.",
                env::SLACK_BOT_TOKEN_ENV
            );
            return Self::disabled();
        };
        match Self::connect(token).await {
            Ok(client) => {
                tracing::info!("Slack integration initialized successfully");
                client
            }
            Err(e) => {
                tracing::warn!(error = %e, "Slack notifications will be disabled");
                Self::disabled()
            }
        }
    }

    /// Point the client at another API base, e.g. a mock server.
    pub fn with_api_base(self, api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            ..self
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Check the token with `auth.test`.
    pub async fn auth_test(&self) -> Result<(), DeliveryError> {
        self.call("auth.test", None).await.map(|_| ())
    }

    async fn call(&self, method: &str, body: Option<&PostMessage<'_>>) -> Result<ApiResponse, DeliveryError> {
        let token = self.token.as_deref().ok_or(DeliveryError::NotConfigured)?;
        let mut request = self
            .client
            .post(format!("{}/api/{}", self.api_base, method))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response: ApiResponse = request.send().await?.error_for_status()?.json().await?;
        if response.ok {
            Ok(response)
        } else {
            let code = response.error.unwrap_or_else(|| "unknown_error".to_string());
            Err(DeliveryError::from_api_code(&code))
        }
    }

    /// Post `text` to `channel` and return the message timestamp.
    pub async fn post_message(&self, channel: &str, text: &str) -> Result<String, DeliveryError> {
        if self.token.is_none() {
            return Err(DeliveryError::NotConfigured);
        }
        if channel.is_empty() {
            return Err(DeliveryError::MissingChannel);
        }

        let body = PostMessage { channel, text };
        let response = self.call("chat.postMessage", Some(&body)).await?;
        Ok(response.ts.unwrap_or_default())
    }
}

#[async_trait]
impl MessageRelay for SlackClient {
    async fn send(&self, channel: &str, text: &str) -> Result<String, DeliveryError> {
        self.post_message(channel, text).await
    }
}
