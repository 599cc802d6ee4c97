use crate::record::LogRecord;
use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for [`LogRecord`]s produced by the logger.
///
/// Implementations are responsible for transporting records to a concrete
/// backend (Cloud Logging, stdout, memory, etc). The logger owns its sink
/// exclusively and drives it from a background task, so log calls on the
/// application side never await it.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Send a single log record to the underlying backend.
    ///
    /// **Parameters**
    /// - `record`: fully-populated [`LogRecord`] produced by the logger.
    ///
    /// **Returns**
    /// - `Ok(())` if the record was accepted by the backend.
    /// - `Err(..)` if the backend failed (network error, serialization
    ///   error, HTTP status, etc.). The worker treats this as a transient
    ///   failure and retries the batch a bounded number of times.
    async fn send(&self, record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Send a batch of records.
    ///
    /// Backends with a bulk API override this to ship the whole batch in
    /// one request. The default sends records one by one and stops at the
    /// first failure.
    async fn send_batch(&self, records: &[LogRecord]) -> Result<(), Box<dyn Error + Send + Sync>> {
        for record in records {
            self.send(record).await?;
        }
        Ok(())
    }

    /// Flush any buffered records, if the backend implements buffering.
    ///
    /// **Returns**
    /// - `Ok(())` if all local buffers were successfully flushed.
    /// - `Err(..)` if the backend reported an error during flush.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
