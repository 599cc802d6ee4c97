use crate::env;
use crate::notifier::Notifier;
use crate::severity::Severity;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::time::Duration;

/// Default execution-id header candidates, checked in order.
pub const DEFAULT_EXECUTION_ID_HEADERS: [&str; 3] =
    ["Function-Execution-Id", "X-Execution-Id", "X-Request-Id"];

/// Configuration of a [`Logger`](crate::logger::Logger).
///
/// Built once, either as a struct literal over [`LoggerConfig::default`]
/// or through the `with_*` methods, and frozen when the logger is
/// constructed.
///
/// **Fields**
/// - `project_id`: overrides project auto-detection.
/// - `log_name`: target log stream name.
/// - `invoker`: static `invoker` label identifying the calling service;
///   omitted when empty.
/// - `common_labels`: merged into every record; per-call labels win.
/// - `execution_id_headers`: ordered candidate header names.
/// - `notifier` / `notify_threshold`: side-channel alert hook, invoked for
///   records at or above the threshold.
/// - `stdout_only`: force the local JSON sink.
/// - `require_remote`: fail construction instead of falling back to stdout.
/// - `min_severity`: records below it are discarded.
/// - `channel_buffer`: maximum number of queued records before new ones
///   are dropped.
/// - `batch_size`: number of records per sink write.
/// - `flush_interval`: maximum delay before a partial batch is written.
/// - `request_timeout`: timeout for the remote sink and metadata requests.
/// - `metadata_host`: metadata server `host[:port]`; defaults to
///   `GCE_METADATA_HOST` or `metadata.google.internal`.
#[derive(Clone)]
pub struct LoggerConfig {
    pub project_id: Option<String>,
    pub log_name: String,
    pub invoker: String,
    pub common_labels: BTreeMap<String, String>,
    pub execution_id_headers: Vec<String>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub notify_threshold: Severity,
    pub stdout_only: bool,
    pub require_remote: bool,
    pub min_severity: Severity,
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub request_timeout: Duration,
    pub metadata_host: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            log_name: "logv2".to_string(),
            invoker: String::new(),
            common_labels: BTreeMap::new(),
            execution_id_headers: DEFAULT_EXECUTION_ID_HEADERS
                .iter()
                .map(|h| h.to_string())
                .collect(),
            notifier: None,
            notify_threshold: Severity::Error,
            stdout_only: false,
            require_remote: false,
            min_severity: Severity::Default,
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            metadata_host: None,
        }
    }
}

impl LoggerConfig {
    pub fn new(log_name: impl Into<String>) -> Self {
        Self {
            log_name: log_name.into(),
            ..Default::default()
        }
    }

    /// Defaults overlaid with `LOGV2_LOG_NAME`, `LOGV2_INVOKER` and
    /// `LOGV2_STDOUT_ONLY`. The project id is left to auto-detection.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(name) = env::env_non_empty(env::LOG_NAME_ENV) {
            config.log_name = name;
        }
        if let Some(invoker) = env::env_non_empty(env::INVOKER_ENV) {
            config.invoker = invoker;
        }
        config.stdout_only = env::env_flag(env::STDOUT_ONLY_ENV);
        config
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_log_name(mut self, log_name: impl Into<String>) -> Self {
        self.log_name = log_name.into();
        self
    }

    pub fn with_invoker(mut self, invoker: impl Into<String>) -> Self {
        self.invoker = invoker.into();
        self
    }

    /// Adds to the common labels; later calls overwrite equal keys.
    pub fn with_common_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.common_labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Replaces the execution-id header candidates.
    pub fn with_execution_id_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.execution_id_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, threshold: Severity) -> Self {
        self.notifier = Some(notifier);
        self.notify_threshold = threshold;
        self
    }

    pub fn with_stdout_only(mut self) -> Self {
        self.stdout_only = true;
        self
    }

    pub fn with_require_remote(mut self) -> Self {
        self.require_remote = true;
        self
    }

    pub fn with_metadata_host(mut self, host: impl Into<String>) -> Self {
        self.metadata_host = Some(host.into());
        self
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }
}

impl fmt::Debug for LoggerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerConfig")
            .field("project_id", &self.project_id)
            .field("log_name", &self.log_name)
            .field("invoker", &self.invoker)
            .field("common_labels", &self.common_labels)
            .field("execution_id_headers", &self.execution_id_headers)
            .field("notifier", &self.notifier.is_some())
            .field("notify_threshold", &self.notify_threshold)
            .field("stdout_only", &self.stdout_only)
            .field("require_remote", &self.require_remote)
            .field("min_severity", &self.min_severity)
            .field("channel_buffer", &self.channel_buffer)
            .field("batch_size", &self.batch_size)
            .field("flush_interval", &self.flush_interval)
            .field("request_timeout", &self.request_timeout)
            .field("metadata_host", &self.metadata_host)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let config = LoggerConfig::new("orders")
            .with_project_id("acme-prod")
            .with_invoker("orders-fn")
            .with_common_labels([("service", "orders"), ("env", "prod")])
            .with_common_labels([("env", "staging")])
            .with_execution_id_headers(["X-Exec"])
            .with_stdout_only();

        assert_eq!(config.log_name, "orders");
        assert_eq!(config.project_id.as_deref(), Some("acme-prod"));
        assert_eq!(config.invoker, "orders-fn");
        assert_eq!(config.common_labels["env"], "staging");
        assert_eq!(config.execution_id_headers, vec!["X-Exec".to_string()]);
        assert!(config.stdout_only);
        assert!(!config.require_remote);
    }

    #[test]
    fn defaults_are_documented_values() {
        let config = LoggerConfig::default();
        assert_eq!(config.notify_threshold, Severity::Error);
        assert_eq!(config.min_severity, Severity::Default);
        assert_eq!(config.execution_id_headers[0], "Function-Execution-Id");
        assert!(config.notifier.is_none());
    }
}
