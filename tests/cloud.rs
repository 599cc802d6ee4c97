#![cfg(feature = "cloud")]

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use logv2::cloud::{CloudLoggingSink, MetadataClient};
use logv2::{Logger, LoggerConfig};

async fn mount_metadata(server: &MockServer, token_fetches: u64) {
    Mock::given(method("GET"))
        .and(path("/computeMetadata/v1/project/project-id"))
        .and(header("Metadata-Flavor", "Google"))
        .respond_with(ResponseTemplate::new(200).set_body_string("test-proj"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/computeMetadata/v1/instance/service-accounts/default/token"))
        .and(header("Metadata-Flavor", "Google"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.test",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(token_fetches)
        .mount(server)
        .await;
}

#[tokio::test]
async fn detects_project_from_metadata_server() {
    let server = MockServer::start().await;
    mount_metadata(&server, 0).await;

    let logger = Logger::new(LoggerConfig::new("detect").with_metadata_host(server.uri()))
        .await
        .unwrap();

    assert_eq!(logger.project_id(), Some("test-proj"));
    assert!(!logger.is_stdout_only());
    logger.close().await;
}

#[tokio::test]
async fn writes_entries_with_cached_token() {
    let server = MockServer::start().await;
    mount_metadata(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/v2/entries:write"))
        .and(header("authorization", "Bearer ya29.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let metadata = MetadataClient::new(client.clone(), Some(server.uri().as_str()));
    let sink = CloudLoggingSink::new(client, metadata, "test-proj").with_api_base(server.uri());
    let config = LoggerConfig::new("app/errors")
        .with_project_id("test-proj")
        .with_common_labels([("service", "api")]);
    let logger = Logger::with_sink(config, Arc::new(sink));

    let headers = std::collections::HashMap::from([
        ("X-Cloud-Trace-Context".to_string(), "t1/99;o=1".to_string()),
        ("Function-Execution-Id".to_string(), "exec-3".to_string()),
    ]);
    logger.error(Some(&headers), "write failed", "disk full");
    logger.flush().await;
    logger.info(None, "second batch", None);
    logger.close().await;

    let requests = server.received_requests().await.unwrap();
    let writes: Vec<Value> = requests
        .iter()
        .filter(|r| r.url.path() == "/v2/entries:write")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(writes.len(), 2);

    let entry = &writes[0]["entries"][0];
    assert_eq!(entry["logName"], "projects/test-proj/logs/app%2Ferrors");
    assert_eq!(entry["severity"], "ERROR");
    assert_eq!(entry["jsonPayload"]["message"], "write failed");
    assert_eq!(entry["jsonPayload"]["error"], "disk full");
    assert_eq!(entry["labels"]["service"], "api");
    assert_eq!(entry["labels"]["execution_id"], "exec-3");
    assert_eq!(entry["trace"], "projects/test-proj/traces/t1");
    assert_eq!(entry["spanId"], "99");
    assert_eq!(writes[0]["resource"]["type"], "global");
    assert_eq!(writes[0]["resource"]["labels"]["project_id"], "test-proj");
}
