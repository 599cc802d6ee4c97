//! Relays Cloud Logging entries delivered over Pub/Sub to a chat channel.
//!
//! A log sink routes matching entries to a Pub/Sub topic; each message
//! carries one `LogEntry` as JSON. [`AlertRelay::handle`] turns it into a
//! one-line summary (plus text and a compact JSON excerpt), picks a channel
//! from the entry severity and sends it through a [`MessageRelay`].

use crate::config::LoggerConfig;
use crate::env;
use crate::error::{DeliveryError, RelayError};
use crate::logger::Logger;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt::Write;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Name, invoker and `service` label of the relay's own logger.
pub const RELAY_SERVICE_NAME: &str = "log-alert-relay";

/// Severity rendered when an entry carries none.
const DEFAULT_SEVERITY: &str = "DEFAULT";

/// Capability that delivers a text message to a destination and returns a
/// delivery token.
#[async_trait]
pub trait MessageRelay: Send + Sync {
    async fn send(&self, channel: &str, text: &str) -> Result<String, DeliveryError>;
}

/// A Pub/Sub message with its payload already base64-decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubSubMessage {
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Body of a Pub/Sub push delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Base64-encoded payload.
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub message_id: String,
}

impl PushEnvelope {
    pub fn from_slice(body: &[u8]) -> Result<Self, RelayError> {
        serde_json::from_slice(body).map_err(|e| RelayError::InvalidEnvelope(e.to_string()))
    }

    /// Decode the payload into a [`PubSubMessage`].
    pub fn into_message(self) -> Result<PubSubMessage, RelayError> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(self.message.data.trim())
            .map_err(|e| RelayError::InvalidEnvelope(format!("data is not base64: {}", e)))?;
        Ok(PubSubMessage {
            data,
            attributes: self.message.attributes,
        })
    }
}

/// Destination channels per severity bucket. Empty values count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelConfig {
    pub error: Option<String>,
    pub warning: Option<String>,
    pub default: Option<String>,
}

impl ChannelConfig {
    /// Read `SLACK_ERROR_CHANNEL_ID`, `SLACK_WARNING_CHANNEL_ID` and
    /// `SLACK_DEFAULT_CHANNEL_ID`.
    pub fn from_env() -> Self {
        Self {
            error: env::env_non_empty(env::SLACK_ERROR_CHANNEL_ENV),
            warning: env::env_non_empty(env::SLACK_WARNING_CHANNEL_ENV),
            default: env::env_non_empty(env::SLACK_DEFAULT_CHANNEL_ENV),
        }
    }

    /// Channel for a severity name, compared case-insensitively.
    ///
    /// Returns an empty string when nothing resolves; the relay capability
    /// rejects that as a missing destination.
    pub fn choose(&self, severity: &str) -> String {
        let bucket = match severity.to_ascii_uppercase().as_str() {
            "CRITICAL" | "ALERT" | "EMERGENCY" | "ERROR" => set(&self.error),
            "WARNING" | "NOTICE" => set(&self.warning),
            _ => None,
        };
        bucket
            .or_else(|| set(&self.default))
            .unwrap_or_default()
            .to_string()
    }
}

fn set(channel: &Option<String>) -> Option<&str> {
    channel.as_deref().filter(|c| !c.is_empty())
}

fn string_field<'a>(entry: &'a Map<String, Value>, key: &str) -> &'a str {
    entry.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Severity of a log entry as written in it, `DEFAULT` when absent.
pub fn entry_severity(entry: &Map<String, Value>) -> &str {
    match string_field(entry, "severity") {
        "" => DEFAULT_SEVERITY,
        severity => severity,
    }
}

/// Render `[SEVERITY] logName`, then the text payload and a compact JSON
/// payload on their own lines when present.
pub fn format_alert(entry: &Map<String, Value>) -> String {
    let mut text = format!("[{}] {}", entry_severity(entry), string_field(entry, "logName"));

    let text_payload = string_field(entry, "textPayload");
    if !text_payload.is_empty() {
        let _ = write!(text, "\n{}", text_payload);
    }
    if let Some(json_payload) = entry.get("jsonPayload").filter(|v| !v.is_null()) {
        if let Ok(compact) = serde_json::to_string(json_payload) {
            let _ = write!(text, "\njson: {}", compact);
        }
    }
    text
}

/// Outcome of a successful relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: String,
    /// Token returned by the relay capability (the Slack message `ts`).
    pub token: String,
}

/// Parses log-alert events and forwards them to a chat channel.
///
/// Stateless apart from its collaborators; every call is independent.
pub struct AlertRelay {
    logger: Arc<Logger>,
    relay: Arc<dyn MessageRelay>,
    channels: ChannelConfig,
}

impl AlertRelay {
    pub fn new(logger: Arc<Logger>, relay: Arc<dyn MessageRelay>, channels: ChannelConfig) -> Self {
        Self {
            logger,
            relay,
            channels,
        }
    }

    pub fn channels(&self) -> &ChannelConfig {
        &self.channels
    }

    /// Relay one message.
    ///
    /// Empty or non-JSON payloads are logged and rejected before any
    /// delivery is attempted. Delivery failures are logged and returned.
    pub async fn handle(&self, message: &PubSubMessage) -> Result<Delivery, RelayError> {
        let log = self.logger.for_request(None);

        if message.data.is_empty() {
            log.warning("empty pubsub data", None);
            return Err(RelayError::EmptyPayload);
        }

        let entry: Map<String, Value> = match serde_json::from_slice(&message.data) {
            Ok(entry) => entry,
            Err(e) => {
                log.error("failed to parse pubsub json", &e);
                return Err(RelayError::MalformedPayload(e));
            }
        };

        let text = format_alert(&entry);
        let channel = self.channels.choose(entry_severity(&entry));

        match self.relay.send(&channel, &text).await {
            Ok(token) => {
                log.info(
                    "slack message sent",
                    Some(json!({"ts": token, "channel": channel})),
                );
                Ok(Delivery { channel, token })
            }
            Err(e) => {
                log.error_with("slack send failed", &e, Some(json!({"channel": channel})));
                Err(RelayError::Delivery(e))
            }
        }
    }
}

/// Memoizes one shared [`Logger`], constructed on first use.
///
/// Concurrent first callers all wait for the single constructor run and
/// then observe the same instance.
#[derive(Default)]
pub struct LoggerCell {
    cell: OnceCell<Arc<Logger>>,
}

impl LoggerCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_init<F, Fut>(&self, init: F) -> Arc<Logger>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Logger>,
    {
        self.cell
            .get_or_init(move || async move { Arc::new(init().await) })
            .await
            .clone()
    }

    pub fn get(&self) -> Option<Arc<Logger>> {
        self.cell.get().cloned()
    }
}

/// Configuration of the relay's own logger.
pub fn relay_logger_config() -> LoggerConfig {
    LoggerConfig::new(RELAY_SERVICE_NAME)
        .with_invoker(RELAY_SERVICE_NAME)
        .with_common_labels([("service", RELAY_SERVICE_NAME)])
}

/// Build the relay logger: first insist on the remote sink, then fall back
/// to a stdout-only logger when it cannot be constructed.
pub async fn relay_logger(config: LoggerConfig) -> Logger {
    match Logger::new(config.clone().with_require_remote()).await {
        Ok(logger) => logger,
        Err(e) => {
            tracing::warn!(error = %e, "remote logger unavailable, logging to stdout");
            Logger::stdout(LoggerConfig {
                require_remote: false,
                ..config.with_stdout_only()
            })
        }
    }
}
