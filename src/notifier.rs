use crate::relay::MessageRelay;
use crate::severity::Severity;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::Write;
use std::sync::Arc;

/// Side-channel invoked for records at or above the configured threshold.
///
/// Failures are reported back to the logger, which logs and discards them:
/// a failing notifier never affects record emission.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        severity: Severity,
        execution_id: Option<&str>,
        message: &str,
        payload: Option<&Map<String, Value>>,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Posts high-severity log messages to a chat channel through a
/// [`MessageRelay`].
pub struct SlackNotifier {
    relay: Arc<dyn MessageRelay>,
    channel: String,
    source: String,
}

impl SlackNotifier {
    /// `source` names the service in the alert text, usually the invoker.
    pub fn new(relay: Arc<dyn MessageRelay>, channel: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            relay,
            channel: channel.into(),
            source: source.into(),
        }
    }

    fn format(
        &self,
        severity: Severity,
        execution_id: Option<&str>,
        message: &str,
        payload: Option<&Map<String, Value>>,
    ) -> String {
        let mut text = format!("[{}] {}: {}", severity, self.source, message);
        if let Some(id) = execution_id {
            let _ = write!(text, "\nexecution: {}", id);
        }
        if let Some(payload) = payload.filter(|p| !p.is_empty()) {
            if let Ok(compact) = serde_json::to_string(payload) {
                let _ = write!(text, "\njson: {}", compact);
            }
        }
        text
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(
        &self,
        severity: Severity,
        execution_id: Option<&str>,
        message: &str,
        payload: Option<&Map<String, Value>>,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let text = self.format(severity, execution_id, message, payload);
        self.relay.send(&self.channel, &text).await?;
        Ok(())
    }
}
