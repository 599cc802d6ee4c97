//! Remote sink for the [Cloud Logging API](https://cloud.google.com/logging/docs/reference/v2/rest)
//! and the metadata-server helpers it depends on.
//!
//! Credentials come from the metadata server of the runtime (Cloud
//! Functions, Cloud Run, GKE with workload identity). Outside such an
//! environment project detection fails and the logger falls back to stdout.

use crate::env;
use crate::error::SinkError;
use crate::record::LogRecord;
use crate::sink::LogSink;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::error::Error;
use tokio::sync::Mutex;

const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const DEFAULT_LOGGING_ENDPOINT: &str = "https://logging.googleapis.com";

/// Client for the instance metadata server.
#[derive(Clone, Debug)]
pub struct MetadataClient {
    client: Client,
    base_url: String,
}

impl MetadataClient {
    /// `host` may be a bare `host[:port]` or a full base URL. `None` uses
    /// `GCE_METADATA_HOST`, then the documented metadata hostname.
    pub fn new(client: Client, host: Option<&str>) -> Self {
        let host = host
            .map(str::to_string)
            .or_else(|| env::env_non_empty(env::METADATA_HOST_ENV))
            .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string());
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host)
        };
        Self { client, base_url }
    }

    async fn get(&self, suffix: &str, context: &str) -> Result<Response, SinkError> {
        let url = format!("{}/computeMetadata/v1/{}", self.base_url, suffix);
        let response = self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| SinkError::Reqwest {
                context: context.to_string(),
                source: e,
            })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_response(response, context.to_string()).await)
        }
    }

    /// Project id of the environment the process runs in.
    pub async fn project_id(&self) -> Result<String, SinkError> {
        let response = self
            .get("project/project-id", "fetching project id from metadata server")
            .await?;
        let body = response.text().await.map_err(|e| SinkError::Reqwest {
            context: "consuming project id response body".to_string(),
            source: e,
        })?;
        Ok(body.trim().to_string())
    }

    async fn token(&self) -> Result<TokenResponse, SinkError> {
        let response = self
            .get(
                "instance/service-accounts/default/token",
                "fetching access token from metadata server",
            )
            .await?;
        let token: TokenResponse = response.json().await.map_err(|e| SinkError::Reqwest {
            context: "deserializing token data".to_string(),
            source: e,
        })?;
        if token.access_token.is_empty() {
            return Err(SinkError::TokenNotFound);
        }
        Ok(token)
    }
}

/// Tokens are never cached for longer than a day, whatever the server says.
const MAX_TOKEN_LIFETIME_SECS: u64 = 86_400;

// {"access_token": "ya29.c.Ks0...", "expires_in": 3166, "token_type": "Bearer"}
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Token caching
#[derive(Default)]
struct Token {
    token: Option<String>,
    renew_after: DateTime<Utc>,
}

impl Token {
    fn renew_after_from_expires_in(expires_in: u64) -> DateTime<Utc> {
        let seconds = expires_in.min(MAX_TOKEN_LIFETIME_SECS).saturating_sub(60);
        Utc::now() + TimeDelta::seconds(seconds as i64)
    }

    async fn fetch(&mut self, metadata: &MetadataClient) -> Result<String, SinkError> {
        if let Some(token) = &self.token {
            if Utc::now() < self.renew_after {
                return Ok(token.clone());
            }
        }

        let response = metadata.token().await?;
        self.renew_after = Self::renew_after_from_expires_in(response.expires_in);
        self.token = Some(response.access_token.clone());
        Ok(response.access_token)
    }
}

async fn error_response(response: Response, context: String) -> SinkError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => format!("could not decode body of HTTP Error response: {e}"),
    };

    SinkError::HttpResponse {
        context,
        status,
        body,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteLogEntriesRequest<'a> {
    resource: &'a MonitoredResource,
    entries: Vec<LogEntry>,
}

#[derive(Clone, Debug, Serialize)]
struct MonitoredResource {
    #[serde(rename = "type")]
    type_: String,
    labels: BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogEntry {
    log_name: String,
    severity: String,
    timestamp: String,
    json_payload: Map<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    span_id: Option<String>,
}

/// Cloud Logging implementation of [`LogSink`] using the REST
/// `entries:write` method.
pub struct CloudLoggingSink {
    client: Client,
    metadata: MetadataClient,
    token: Mutex<Token>,
    project_id: String,
    endpoint: String,
    resource: MonitoredResource,
}

impl CloudLoggingSink {
    /// Construct a sink writing into `project_id` as a `global` resource.
    pub fn new(client: Client, metadata: MetadataClient, project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        Self {
            client,
            metadata,
            token: Mutex::new(Token::default()),
            resource: MonitoredResource {
                type_: "global".to_string(),
                labels: BTreeMap::from([("project_id".to_string(), project_id.clone())]),
            },
            project_id,
            endpoint: DEFAULT_LOGGING_ENDPOINT.to_string(),
        }
    }

    /// Point the sink at another API base, e.g. a local emulator.
    pub fn with_api_base(self, api_base: impl Into<String>) -> Self {
        Self {
            endpoint: api_base.into().trim_end_matches('/').to_string(),
            ..self
        }
    }

    /// Sets the `type` and labels of the monitored resource, for example
    /// `cloud_function` with a `function_name` label.
    pub fn with_resource(self, resource_type: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        Self {
            resource: MonitoredResource {
                type_: resource_type.into(),
                labels,
            },
            ..self
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// `projects/{project}/logs/{url-encoded log id}`
    pub fn full_log_name(&self, log_name: &str) -> String {
        if log_name.starts_with("projects/") {
            return log_name.to_string();
        }
        format!(
            "projects/{}/logs/{}",
            self.project_id,
            urlencoding::encode(log_name)
        )
    }

    fn map_record(&self, record: &LogRecord) -> LogEntry {
        let mut json_payload = record.payload.clone().unwrap_or_default();
        json_payload.insert("message".to_string(), Value::String(record.message.clone()));

        LogEntry {
            log_name: self.full_log_name(&record.log_name),
            severity: record.severity.to_string(),
            timestamp: record.timestamp.to_rfc3339(),
            json_payload,
            labels: record.labels_with_execution_id(),
            trace: record.trace.clone(),
            span_id: record.span_id.clone(),
        }
    }

    async fn write_entries(&self, records: &[LogRecord]) -> Result<(), SinkError> {
        let token = self.token.lock().await.fetch(&self.metadata).await?;
        let body = WriteLogEntriesRequest {
            resource: &self.resource,
            entries: records.iter().map(|r| self.map_record(r)).collect(),
        };

        let response = self
            .client
            .post(format!("{}/v2/entries:write", self.endpoint))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SinkError::Reqwest {
                context: "performing HTTP POST request to the Cloud Logging API".to_string(),
                source: e,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_response(
                response,
                "response when sending log entries to the Cloud Logging API".to_string(),
            )
            .await)
        }
    }
}

#[async_trait]
impl LogSink for CloudLoggingSink {
    async fn send(&self, record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(self.write_entries(std::slice::from_ref(record)).await?)
    }

    async fn send_batch(&self, records: &[LogRecord]) -> Result<(), Box<dyn Error + Send + Sync>> {
        if records.is_empty() {
            return Ok(());
        }
        Ok(self.write_entries(records).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_id_is_url_encoded() {
        let metadata = MetadataClient::new(Client::new(), Some("127.0.0.1:1"));
        let sink = CloudLoggingSink::new(Client::new(), metadata, "acme");
        assert_eq!(sink.full_log_name("ieos-slack-logs"), "projects/acme/logs/ieos-slack-logs");
        assert_eq!(sink.full_log_name("app/errors"), "projects/acme/logs/app%2Ferrors");
        assert_eq!(
            sink.full_log_name("projects/other/logs/x"),
            "projects/other/logs/x"
        );
    }

    #[test]
    fn metadata_host_accepts_bare_host_and_url() {
        let a = MetadataClient::new(Client::new(), Some("10.0.0.1:8080"));
        assert_eq!(a.base_url, "http://10.0.0.1:8080");
        let b = MetadataClient::new(Client::new(), Some("http://127.0.0.1:9000/"));
        assert_eq!(b.base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn token_renews_a_minute_early() {
        let renew = Token::renew_after_from_expires_in(3600);
        let delta = renew - Utc::now();
        assert!(delta <= TimeDelta::seconds(3540));
        assert!(delta > TimeDelta::seconds(3500));
        // expires_in below the margin must not underflow
        let _ = Token::renew_after_from_expires_in(10);
    }

    #[test]
    fn huge_expiry_is_capped() {
        let renew = Token::renew_after_from_expires_in(u64::MAX);
        let delta = renew - Utc::now();
        assert!(delta <= TimeDelta::seconds(86_340));
        assert!(delta > TimeDelta::seconds(86_000));
    }
}
