use crate::config::LoggerConfig;
use crate::correlation::{CorrelationContext, HeaderSource};
use crate::error::Error;
use crate::notifier::Notifier;
use crate::record::LogRecord;
use crate::request::RequestLogger;
use crate::severity::Severity;
use crate::sink::LogSink;
use crate::stdout_sink::StdoutSink;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration, MissedTickBehavior};

/// Label carrying the configured invoker name.
pub const INVOKER_LABEL: &str = "invoker";

const MAX_WRITE_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

#[cfg(feature = "cloud")]
const PROJECT_DETECT_TIMEOUT: Duration = Duration::from_secs(2);

enum Command {
    Record(LogRecord),
    Flush(oneshot::Sender<()>),
    Close(oneshot::Sender<()>),
}

/// Snapshot of the logger counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggerStats {
    /// Log calls at or above the minimum severity.
    pub total: u64,
    /// Records handed to the worker.
    pub enqueued: u64,
    /// Records dropped because the queue was full or the logger closed.
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

/// Structured logger with request correlation and an optional notifier.
///
/// The sink is moved into a background task that batches records and owns
/// it for the lifetime of the logger. Leveled calls only build a
/// [`LogRecord`] and queue it, so they never block on I/O and never fail:
/// when the queue is full the record is dropped and counted.
///
/// Construct it once per process and share it (it is `Send + Sync`). Call
/// [`Logger::close`] before exiting to flush; dropping the logger also
/// closes the queue, after which the worker drains, flushes and stops on its
/// own as long as the runtime is still alive.
pub struct Logger {
    sender: mpsc::Sender<Command>,
    project_id: Option<String>,
    log_name: String,
    base_labels: BTreeMap<String, String>,
    execution_id_headers: Vec<String>,
    min_severity: Severity,
    stdout_only: bool,
    counters: Counters,
}

impl Logger {
    /// Build a logger from `config`, selecting the sink.
    ///
    /// The project id is resolved from the config, then the environment,
    /// then the metadata server. Without a project, or with `stdout_only`,
    /// records go to stdout as JSON lines. Construction only fails when
    /// `require_remote` is set and the remote sink cannot be built.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn new(config: LoggerConfig) -> Result<Self, Error> {
        let selected = select_sink(&config).await?;
        Ok(Self::start(config, selected))
    }

    /// Build a logger around a caller-supplied sink.
    ///
    /// Only an explicit `project_id` is used (for trace names); no detection
    /// happens. Must be called from within a Tokio runtime.
    pub fn with_sink(config: LoggerConfig, sink: Arc<dyn LogSink>) -> Self {
        let selected = SelectedSink {
            project_id: config.project_id.clone(),
            sink,
            fallback: None,
            stdout_only: false,
        };
        Self::start(config, selected)
    }

    /// Build a logger writing JSON lines to stdout, without any detection.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn stdout(config: LoggerConfig) -> Self {
        let project_id = config.project_id.clone();
        Self::start(config, SelectedSink::stdout(project_id))
    }

    fn start(config: LoggerConfig, selected: SelectedSink) -> Self {
        let buffer = config.channel_buffer.max(16);
        let flush_interval = config.flush_interval.max(Duration::from_millis(10));
        let (sender, receiver) = mpsc::channel(buffer);

        let worker = Worker {
            sink: selected.sink,
            fallback: selected.fallback,
            notifier: config.notifier,
            notify_threshold: config.notify_threshold,
            batch: Vec::with_capacity(config.batch_size.max(1)),
            batch_size: config.batch_size.max(1),
            notifications: JoinSet::new(),
        };
        tokio::spawn(worker.run(receiver, flush_interval));

        let mut base_labels = config.common_labels;
        if !config.invoker.is_empty() {
            base_labels.insert(INVOKER_LABEL.to_string(), config.invoker);
        }

        Self {
            sender,
            project_id: selected.project_id,
            log_name: config.log_name,
            base_labels,
            execution_id_headers: config.execution_id_headers,
            min_severity: config.min_severity,
            stdout_only: selected.stdout_only,
            counters: Counters::default(),
        }
    }

    /// Project the records are attributed to, if one was resolved.
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    /// `true` when the logger fell back to (or was asked for) the stdout sink.
    pub fn is_stdout_only(&self) -> bool {
        self.stdout_only
    }

    pub fn stats(&self) -> LoggerStats {
        LoggerStats {
            total: self.counters.total.load(Ordering::Relaxed),
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Correlation context of a request, using the configured
    /// execution-id header candidates.
    pub fn correlation(&self, headers: Option<&dyn HeaderSource>) -> CorrelationContext {
        CorrelationContext::extract(headers, &self.execution_id_headers)
    }

    /// Bind a view to the correlation context of one request.
    pub fn for_request(&self, headers: Option<&dyn HeaderSource>) -> RequestLogger<'_> {
        RequestLogger::new(self, self.correlation(headers))
    }

    /// Log `message` at `severity`.
    ///
    /// `payload` may be any JSON value; objects become the record payload,
    /// anything else is stored under `data`.
    pub fn log(
        &self,
        severity: Severity,
        headers: Option<&dyn HeaderSource>,
        message: &str,
        payload: Option<Value>,
    ) {
        self.log_with_labels(severity, headers, message, payload, BTreeMap::new());
    }

    /// Like [`Logger::log`] with per-call labels, which win over the common
    /// labels on conflict.
    pub fn log_with_labels(
        &self,
        severity: Severity,
        headers: Option<&dyn HeaderSource>,
        message: &str,
        payload: Option<Value>,
        labels: BTreeMap<String, String>,
    ) {
        let correlation = self.correlation(headers);
        self.emit(severity, &correlation, &labels, message, payload_fields(payload));
    }

    pub fn debug(&self, headers: Option<&dyn HeaderSource>, message: &str, payload: Option<Value>) {
        self.log(Severity::Debug, headers, message, payload);
    }

    pub fn info(&self, headers: Option<&dyn HeaderSource>, message: &str, payload: Option<Value>) {
        self.log(Severity::Info, headers, message, payload);
    }

    pub fn warning(&self, headers: Option<&dyn HeaderSource>, message: &str, payload: Option<Value>) {
        self.log(Severity::Warning, headers, message, payload);
    }

    /// Log at `ERROR`. The error is stringified under `error`, never
    /// serialized as a structure.
    pub fn error(&self, headers: Option<&dyn HeaderSource>, message: &str, err: impl fmt::Display) {
        self.error_with(headers, message, err, None);
    }

    /// [`Logger::error`] with extra payload fields.
    pub fn error_with(
        &self,
        headers: Option<&dyn HeaderSource>,
        message: &str,
        err: impl fmt::Display,
        payload: Option<Value>,
    ) {
        let correlation = self.correlation(headers);
        self.emit(
            Severity::Error,
            &correlation,
            &BTreeMap::new(),
            message,
            Some(error_fields(err, payload)),
        );
    }

    pub(crate) fn emit(
        &self,
        severity: Severity,
        correlation: &CorrelationContext,
        labels: &BTreeMap<String, String>,
        message: &str,
        payload: Option<Map<String, Value>>,
    ) {
        if severity < self.min_severity {
            return;
        }
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        let mut merged = self.base_labels.clone();
        merged.extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));

        let record = LogRecord {
            timestamp: Utc::now(),
            severity,
            log_name: self.log_name.clone(),
            message: message.to_string(),
            payload,
            labels: merged,
            trace: correlation.trace_id.as_deref().map(|t| self.trace_name(t)),
            span_id: correlation.span_id.clone(),
            execution_id: correlation.execution_id.clone(),
        };

        match self.sender.try_send(Command::Record(record)) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("log queue full, dropping log record");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("logger closed, dropping log record");
            }
        }
    }

    fn trace_name(&self, trace_id: &str) -> String {
        match &self.project_id {
            Some(project) => format!("projects/{}/traces/{}", project, trace_id),
            None => trace_id.to_string(),
        }
    }

    /// Wait until every record queued before this call has been written.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Command::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Flush, wait for in-flight notifications, flush the sink and stop the
    /// worker. Records logged afterwards are dropped. Calling it again is a
    /// no-op.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Command::Close(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("project_id", &self.project_id)
            .field("log_name", &self.log_name)
            .field("stdout_only", &self.stdout_only)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Normalize a caller payload into record fields.
pub(crate) fn payload_fields(payload: Option<Value>) -> Option<Map<String, Value>> {
    match payload {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(other) => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            Some(map)
        }
    }
}

pub(crate) fn error_fields(err: impl fmt::Display, payload: Option<Value>) -> Map<String, Value> {
    let mut fields = payload_fields(payload).unwrap_or_default();
    fields.insert("error".to_string(), Value::String(err.to_string()));
    fields
}

struct SelectedSink {
    project_id: Option<String>,
    sink: Arc<dyn LogSink>,
    fallback: Option<Arc<dyn LogSink>>,
    stdout_only: bool,
}

impl SelectedSink {
    fn stdout(project_id: Option<String>) -> Self {
        Self {
            project_id,
            sink: Arc::new(StdoutSink::new()),
            fallback: None,
            stdout_only: true,
        }
    }
}

async fn select_sink(config: &LoggerConfig) -> Result<SelectedSink, Error> {
    let known_project = config
        .project_id
        .clone()
        .filter(|p| !p.is_empty())
        .or_else(crate::env::project_id_from_env);

    if config.stdout_only {
        if config.require_remote {
            return Err(Error::StdoutOnlyConflict);
        }
        return Ok(SelectedSink::stdout(known_project));
    }

    select_remote(config, known_project).await
}

#[cfg(feature = "cloud")]
async fn select_remote(config: &LoggerConfig, known_project: Option<String>) -> Result<SelectedSink, Error> {
    use crate::cloud::{CloudLoggingSink, MetadataClient};

    let client = match reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
    {
        Ok(client) => client,
        Err(e) if config.require_remote => return Err(Error::HttpClient(e)),
        Err(e) => {
            tracing::warn!(error = %e, "could not build HTTP client, logging to stdout");
            return Ok(SelectedSink::stdout(known_project));
        }
    };
    let metadata = MetadataClient::new(client.clone(), config.metadata_host.as_deref());

    let project_id = match known_project {
        Some(project) => Some(project),
        None => detect_project_id(&metadata).await,
    };

    match project_id {
        Some(project) => {
            let sink = CloudLoggingSink::new(client, metadata, project.clone());
            Ok(SelectedSink {
                project_id: Some(project),
                sink: Arc::new(sink),
                fallback: Some(Arc::new(StdoutSink::new())),
                stdout_only: false,
            })
        }
        None if config.require_remote => Err(Error::NoProject),
        None => {
            tracing::info!("no project id resolved, logging to stdout");
            Ok(SelectedSink::stdout(None))
        }
    }
}

#[cfg(not(feature = "cloud"))]
async fn select_remote(config: &LoggerConfig, known_project: Option<String>) -> Result<SelectedSink, Error> {
    if config.require_remote {
        return Err(Error::CloudFeatureDisabled);
    }
    Ok(SelectedSink::stdout(known_project))
}

#[cfg(feature = "cloud")]
async fn detect_project_id(metadata: &crate::cloud::MetadataClient) -> Option<String> {
    match tokio::time::timeout(PROJECT_DETECT_TIMEOUT, metadata.project_id()).await {
        Ok(Ok(project)) if !project.is_empty() => Some(project),
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "project id not available from metadata server");
            None
        }
        Err(_) => {
            tracing::debug!("timed out detecting project id from metadata server");
            None
        }
    }
}

struct Worker {
    sink: Arc<dyn LogSink>,
    fallback: Option<Arc<dyn LogSink>>,
    notifier: Option<Arc<dyn Notifier>>,
    notify_threshold: Severity,
    batch: Vec<LogRecord>,
    batch_size: usize,
    notifications: JoinSet<()>,
}

impl Worker {
    async fn run(mut self, mut receiver: mpsc::Receiver<Command>, flush_interval: Duration) {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = receiver.recv() => match command {
                    Some(Command::Record(record)) => {
                        self.notify(&record);
                        self.batch.push(record);
                        if self.batch.len() >= self.batch_size {
                            self.write_batch().await;
                        }
                    }
                    Some(Command::Flush(done)) => {
                        self.write_batch().await;
                        let _ = done.send(());
                    }
                    Some(Command::Close(done)) => {
                        receiver.close();
                        // records queued before the close request still count
                        let mut waiters = vec![done];
                        while let Ok(command) = receiver.try_recv() {
                            match command {
                                Command::Record(record) => {
                                    self.notify(&record);
                                    self.batch.push(record);
                                }
                                Command::Flush(done) | Command::Close(done) => waiters.push(done),
                            }
                        }
                        self.shutdown().await;
                        for done in waiters {
                            let _ = done.send(());
                        }
                        return;
                    }
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },
                _ = ticker.tick() => {
                    self.write_batch().await;
                    self.reap_notifications();
                }
            }
        }
    }

    fn notify(&mut self, record: &LogRecord) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if record.severity < self.notify_threshold {
            return;
        }

        let notifier = Arc::clone(notifier);
        let severity = record.severity;
        let execution_id = record.execution_id.clone();
        let message = record.message.clone();
        let payload = record.payload.clone();

        self.notifications.spawn(async move {
            if let Err(e) = notifier
                .notify(severity, execution_id.as_deref(), &message, payload.as_ref())
                .await
            {
                tracing::warn!(error = %e, %severity, "notifier failed, alert dropped");
            }
        });
    }

    fn reap_notifications(&mut self) {
        while let Some(result) = self.notifications.try_join_next() {
            if let Err(e) = result {
                tracing::warn!(error = %e, "notifier task failed");
            }
        }
    }

    async fn write_batch(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        let mut backoff = INITIAL_BACKOFF;
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            match self.sink.send_batch(&self.batch).await {
                Ok(()) => {
                    self.batch.clear();
                    return;
                }
                Err(e) if attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::warn!(error = %e, attempt, "log sink write failed, retrying in {:?}", backoff);
                    sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
                }
                Err(e) => {
                    tracing::error!(error = %e, records = self.batch.len(), "log sink write failed");
                }
            }
        }

        if let Some(fallback) = &self.fallback {
            if let Err(e) = fallback.send_batch(&self.batch).await {
                tracing::error!(error = %e, "fallback sink write failed, dropping batch");
            }
        }
        self.batch.clear();
    }

    async fn shutdown(&mut self) {
        self.write_batch().await;
        while let Some(result) = self.notifications.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "notifier task failed");
            }
        }
        if let Err(e) = self.sink.flush().await {
            tracing::warn!(error = %e, "log sink flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_object_payload_is_wrapped() {
        assert_eq!(payload_fields(None), None);
        assert_eq!(payload_fields(Some(Value::Null)), None);
        let wrapped = payload_fields(Some(json!([1, 2]))).unwrap();
        assert_eq!(wrapped["data"], json!([1, 2]));
        let object = payload_fields(Some(json!({"a": 1}))).unwrap();
        assert_eq!(object["a"], 1);
    }

    #[test]
    fn error_is_always_a_string() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such bucket");
        let fields = error_fields(&err, Some(json!({"bucket": "b1"})));
        assert_eq!(fields["error"], Value::String("no such bucket".into()));
        assert_eq!(fields["bucket"], "b1");
    }
}
