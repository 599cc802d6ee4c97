use crate::correlation::CorrelationContext;
use crate::logger::{error_fields, payload_fields, Logger};
use crate::severity::Severity;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A [`Logger`] bound to the correlation context of one request.
///
/// Borrows the logger; it never owns or closes the sink.
#[derive(Debug, Clone)]
pub struct RequestLogger<'a> {
    logger: &'a Logger,
    correlation: CorrelationContext,
    labels: BTreeMap<String, String>,
}

impl<'a> RequestLogger<'a> {
    pub fn new(logger: &'a Logger, correlation: CorrelationContext) -> Self {
        Self {
            logger,
            correlation,
            labels: BTreeMap::new(),
        }
    }

    /// Attach a label to every record logged through this view.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn correlation(&self) -> &CorrelationContext {
        &self.correlation
    }

    pub fn log(&self, severity: Severity, message: &str, payload: Option<Value>) {
        self.logger.emit(
            severity,
            &self.correlation,
            &self.labels,
            message,
            payload_fields(payload),
        );
    }

    pub fn debug(&self, message: &str, payload: Option<Value>) {
        self.log(Severity::Debug, message, payload);
    }

    pub fn info(&self, message: &str, payload: Option<Value>) {
        self.log(Severity::Info, message, payload);
    }

    pub fn warning(&self, message: &str, payload: Option<Value>) {
        self.log(Severity::Warning, message, payload);
    }

    pub fn error(&self, message: &str, err: impl fmt::Display) {
        self.error_with(message, err, None);
    }

    pub fn error_with(&self, message: &str, err: impl fmt::Display, payload: Option<Value>) {
        self.logger.emit(
            Severity::Error,
            &self.correlation,
            &self.labels,
            message,
            Some(error_fields(err, payload)),
        );
    }
}
