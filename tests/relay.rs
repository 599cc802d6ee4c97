use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use logv2::memory_sink::MemorySink;
use logv2::noop_sink::NoopSink;
use logv2::relay::{
    relay_logger, relay_logger_config, AlertRelay, ChannelConfig, LoggerCell, MessageRelay, PubSubMessage,
};
use logv2::slack::SlackClient;
use logv2::{DeliveryError, Logger, LoggerConfig, RelayError, Severity};

/// Records every send and answers with a sequential token.
#[derive(Default)]
struct StubRelay {
    sent: Mutex<Vec<(String, String)>>,
    fail_with: Mutex<Option<fn() -> DeliveryError>>,
}

#[async_trait]
impl MessageRelay for StubRelay {
    async fn send(&self, channel: &str, text: &str) -> Result<String, DeliveryError> {
        if let Some(make_err) = *self.fail_with.lock().unwrap() {
            return Err(make_err());
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((channel.to_string(), text.to_string()));
        Ok(format!("1700000000.{:06}", sent.len()))
    }
}

fn channels() -> ChannelConfig {
    ChannelConfig {
        error: Some("C1".into()),
        warning: Some("C2".into()),
        default: Some("C3".into()),
    }
}

fn setup(channels: ChannelConfig) -> (AlertRelay, Arc<StubRelay>, Arc<Logger>, MemorySink) {
    let sink = MemorySink::new();
    let logger = Arc::new(Logger::with_sink(relay_logger_config(), Arc::new(sink.clone())));
    let stub = Arc::new(StubRelay::default());
    let relay = AlertRelay::new(Arc::clone(&logger), stub.clone(), channels);
    (relay, stub, logger, sink)
}

fn message(data: &str) -> PubSubMessage {
    PubSubMessage {
        data: data.as_bytes().to_vec(),
        ..Default::default()
    }
}

#[tokio::test]
async fn relays_error_entry_to_error_channel() {
    let (relay, stub, logger, sink) = setup(channels());

    let delivery = relay
        .handle(&message(
            r#"{"severity":"ERROR","logName":"projects/p/logs/l","textPayload":"boom"}"#,
        ))
        .await
        .unwrap();
    logger.flush().await;

    assert_eq!(delivery.channel, "C1");
    let sent = stub.sent.lock().unwrap().clone();
    assert_eq!(sent, vec![("C1".to_string(), "[ERROR] projects/p/logs/l\nboom".to_string())]);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].severity, Severity::Info);
    assert_eq!(records[0].message, "slack message sent");
    let payload = records[0].payload.as_ref().unwrap();
    assert_eq!(payload["ts"], delivery.token.as_str());
    assert_eq!(payload["channel"], "C1");
    assert_eq!(records[0].labels["service"], "log-alert-relay");
}

#[tokio::test]
async fn routes_by_case_insensitive_severity() {
    let (relay, stub, _logger, _sink) = setup(channels());

    for severity in ["error", "notice", "info"] {
        let body = format!(r#"{{"severity":"{}","logName":"l"}}"#, severity);
        relay.handle(&message(&body)).await.unwrap();
    }

    let channels: Vec<String> = stub.sent.lock().unwrap().iter().map(|(c, _)| c.clone()).collect();
    assert_eq!(channels, vec!["C1", "C2", "C3"]);
}

#[tokio::test]
async fn json_payload_is_appended_compactly() {
    let (relay, stub, _logger, _sink) = setup(channels());

    relay
        .handle(&message(
            r#"{"severity":"WARNING","logName":"l","jsonPayload":{ "a" : 1, "b" : [true] }}"#,
        ))
        .await
        .unwrap();

    let sent = stub.sent.lock().unwrap();
    assert_eq!(sent[0].1, "[WARNING] l\njson: {\"a\":1,\"b\":[true]}");
}

#[tokio::test]
async fn identical_input_is_delivered_twice() {
    let (relay, stub, _logger, _sink) = setup(channels());
    let input = message(r#"{"severity":"ERROR","logName":"l","textPayload":"again"}"#);

    let first = relay.handle(&input).await.unwrap();
    let second = relay.handle(&input).await.unwrap();

    assert_ne!(first.token, second.token);
    assert_eq!(stub.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn empty_payload_is_rejected_and_logged() {
    let (relay, stub, logger, sink) = setup(channels());

    let err = relay.handle(&PubSubMessage::default()).await.unwrap_err();
    logger.flush().await;

    assert!(matches!(err, RelayError::EmptyPayload));
    assert!(stub.sent.lock().unwrap().is_empty());
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].severity, Severity::Warning);
    assert_eq!(records[0].message, "empty pubsub data");
}

#[tokio::test]
async fn malformed_payload_is_rejected_and_logged() {
    let (relay, stub, logger, sink) = setup(channels());

    let err = relay.handle(&message("{not json")).await.unwrap_err();
    logger.flush().await;

    assert!(matches!(err, RelayError::MalformedPayload(_)));
    assert!(stub.sent.lock().unwrap().is_empty());
    let records = sink.records();
    assert_eq!(records[0].severity, Severity::Error);
    assert!(records[0].payload.as_ref().unwrap()["error"].is_string());
}

#[tokio::test]
async fn delivery_errors_are_logged_then_propagated() {
    let (relay, stub, logger, sink) = setup(channels());
    *stub.fail_with.lock().unwrap() = Some(|| DeliveryError::NotInChannel);

    let err = relay
        .handle(&message(r#"{"severity":"ERROR","logName":"l"}"#))
        .await
        .unwrap_err();
    logger.flush().await;

    assert!(matches!(err, RelayError::Delivery(DeliveryError::NotInChannel)));
    assert_eq!(
        err.to_string(),
        "slack bot is not in the specified channel - please invite the bot to the channel"
    );
    let records = sink.records();
    assert_eq!(records[0].message, "slack send failed");
    assert_eq!(records[0].payload.as_ref().unwrap()["channel"], "C1");
}

#[tokio::test]
async fn no_resolvable_channel_is_rejected_by_slack_client() {
    let sink = MemorySink::new();
    let logger = Arc::new(Logger::with_sink(relay_logger_config(), Arc::new(sink.clone())));
    let slack = SlackClient::new("xoxb-test")
        .unwrap()
        .with_api_base("http://127.0.0.1:1");
    let relay = AlertRelay::new(Arc::clone(&logger), Arc::new(slack), ChannelConfig::default());

    let err = relay
        .handle(&message(r#"{"severity":"info","logName":"l"}"#))
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Delivery(DeliveryError::MissingChannel)));
}

#[tokio::test]
async fn relay_logger_falls_back_to_stdout_when_remote_is_impossible() {
    let logger = relay_logger(relay_logger_config().with_project_id("acme").with_stdout_only()).await;
    assert!(logger.is_stdout_only());
    assert_eq!(logger.project_id(), Some("acme"));
    assert_eq!(logger.log_name(), "log-alert-relay");
    logger.close().await;

    let unreachable = relay_logger_config().with_metadata_host("127.0.0.1:1");
    if logv2::env::project_id_from_env().is_none() {
        let logger = relay_logger(unreachable).await;
        assert!(logger.is_stdout_only());
        logger.close().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cached_logger_is_constructed_once() {
    let cell = Arc::new(LoggerCell::new());
    let constructions = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let cell = Arc::clone(&cell);
        let constructions = Arc::clone(&constructions);
        tasks.push(tokio::spawn(async move {
            cell.get_or_init(|| async move {
                constructions.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Logger::with_sink(LoggerConfig::new("cached"), Arc::new(NoopSink))
            })
            .await
        }));
    }

    let mut loggers = Vec::new();
    for task in tasks {
        loggers.push(task.await.unwrap());
    }

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert!(loggers.iter().all(|l| Arc::ptr_eq(l, &loggers[0])));
    assert!(Arc::ptr_eq(&cell.get().unwrap(), &loggers[0]));
}
