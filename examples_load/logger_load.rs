use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio::time::Duration;

use logv2::init::init_diagnostics;
use logv2::noop_sink::NoopSink;
use logv2::{Logger, LoggerConfig};

#[tokio::main]
async fn main() {
    let _ = init_diagnostics();

    let config = LoggerConfig {
        channel_buffer: 50_000,
        batch_size: 1_000,
        flush_interval: Duration::from_millis(200),
        ..LoggerConfig::new("load")
    };
    let logger = Logger::with_sink(config, Arc::new(NoopSink));

    let headers = HashMap::from([
        ("X-Cloud-Trace-Context".to_string(), "105445aa7843bc8bf206b12000100000/1;o=1".to_string()),
        ("Function-Execution-Id".to_string(), "load-exec".to_string()),
    ]);

    let n: u64 = 100_000;
    let start = Instant::now();

    let log = logger.for_request(Some(&headers));
    for i in 0..n {
        log.error_with("load test error", "simulated", Some(json!({ "iteration": i })));
    }

    let elapsed = start.elapsed();
    logger.close().await;

    let stats = logger.stats();
    println!(
        "sent {} records in {:?} (~{:.0} rec/s), enqueued {}, dropped {}",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64(),
        stats.enqueued,
        stats.dropped
    );
}
