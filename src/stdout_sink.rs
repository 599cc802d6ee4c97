use crate::record::LogRecord;
use crate::sink::LogSink;
use async_trait::async_trait;
use std::error::Error;
use std::io::Write;
use std::sync::Mutex;

/// Local fallback sink writing one JSON object per line.
///
/// Used when no project can be resolved or stdout-only mode is requested.
/// The layout is the Cloud Logging structured-logging format, so an agent
/// scraping the process output still gets severity, labels and trace.
pub struct StdoutSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    /// Write to an arbitrary destination instead of the process stdout.
    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    fn write_lines(&self, records: &[LogRecord]) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, &record.to_structured_json())?;
            buf.push(b'\n');
        }
        let mut writer = self.writer.lock().map_err(|_| "stdout sink lock poisoned")?;
        writer.write_all(&buf)?;
        writer.flush()?;
        Ok(())
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogSink for StdoutSink {
    async fn send(&self, record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.write_lines(std::slice::from_ref(record))
    }

    async fn send_batch(&self, records: &[LogRecord]) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.write_lines(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::Severity;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn record(message: &str) -> LogRecord {
        LogRecord {
            timestamp: Utc::now(),
            severity: Severity::Info,
            log_name: "test".into(),
            message: message.into(),
            payload: None,
            labels: BTreeMap::new(),
            trace: None,
            span_id: None,
            execution_id: None,
        }
    }

    #[tokio::test]
    async fn writes_one_json_object_per_line() {
        let out = Shared::default();
        let sink = StdoutSink::with_writer(Box::new(out.clone()));

        sink.send_batch(&[record("one"), record("two")]).await.unwrap();

        let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["message"], "one");
        assert_eq!(first["severity"], "INFO");
    }
}
