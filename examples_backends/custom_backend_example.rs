use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use logv2::record::LogRecord;
use logv2::sink::LogSink;
use logv2::{Logger, LoggerConfig};

/// Example of plugging a custom destination into the logger by
/// implementing the `LogSink` trait directly. Imagine this talks to some
/// proprietary store for which this crate does not provide a sink.
struct MyCustomDbSink;

#[async_trait]
impl LogSink for MyCustomDbSink {
    async fn send(&self, record: &LogRecord) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Here you would call your own client library for the target store.
        println!("[my-custom-db] {}", record.to_structured_json());
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let config = LoggerConfig::new("custom-backend").with_common_labels([("db", "my-custom-db")]);
    let logger = Logger::with_sink(config, Arc::new(MyCustomDbSink));

    logger.info(None, "custom backend example started", None);
    logger.error_with(None, "simulated error sent via custom backend", "connection reset", Some(json!({"attempt": 3})));

    logger.close().await;
}
