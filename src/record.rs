use crate::severity::Severity;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Label carrying the execution id of the request that produced a record.
pub const EXECUTION_ID_LABEL: &str = "execution_id";

/// A single structured log entry, built per log call and discarded once a
/// sink has accepted it.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub log_name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,
    pub labels: BTreeMap<String, String>,
    /// Fully qualified trace resource name when the project is known,
    /// the bare trace id otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

impl LogRecord {
    /// Render the record in the Cloud Logging structured-logging layout
    /// understood by the logging agents that scrape stdout.
    ///
    /// Payload fields are flattened into the top-level object; the reserved
    /// keys (`severity`, `message`, `time`, labels, trace) always win.
    pub fn to_structured_json(&self) -> Value {
        let mut obj = self.payload.clone().unwrap_or_default();

        obj.insert("severity".into(), Value::String(self.severity.to_string()));
        obj.insert("message".into(), Value::String(self.message.clone()));
        obj.insert(
            "time".into(),
            Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        obj.insert("logName".into(), Value::String(self.log_name.clone()));
        let labels = self.labels_with_execution_id();
        if !labels.is_empty() {
            obj.insert(
                "logging.googleapis.com/labels".into(),
                serde_json::to_value(&labels).unwrap_or_default(),
            );
        }
        if let Some(trace) = &self.trace {
            obj.insert("logging.googleapis.com/trace".into(), Value::String(trace.clone()));
        }
        if let Some(span) = &self.span_id {
            obj.insert("logging.googleapis.com/spanId".into(), Value::String(span.clone()));
        }

        Value::Object(obj)
    }

    /// Record labels plus the execution id under [`EXECUTION_ID_LABEL`],
    /// the way Cloud Functions tags its own entries.
    pub fn labels_with_execution_id(&self) -> BTreeMap<String, String> {
        let mut labels = self.labels.clone();
        if let Some(execution_id) = &self.execution_id {
            labels.insert(EXECUTION_ID_LABEL.to_string(), execution_id.clone());
        }
        labels
    }
}
