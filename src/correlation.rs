use reqwest::header::HeaderMap;
use std::collections::HashMap;

/// Cloud Trace propagation header, `TRACE_ID/SPAN_ID;o=FLAG`.
pub const TRACE_CONTEXT_HEADER: &str = "X-Cloud-Trace-Context";

/// W3C trace context header, consulted when [`TRACE_CONTEXT_HEADER`] is absent.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Read access to request headers, independent of the transport that
/// delivered them.
///
/// Implemented for HTTP header maps and for plain string maps such as
/// Pub/Sub message attributes. Lookups are case-insensitive.
pub trait HeaderSource {
    fn header(&self, name: &str) -> Option<&str>;
}

impl HeaderSource for HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.to_str().ok())
    }
}

impl HeaderSource for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        if let Some(v) = self.get(name) {
            return Some(v.as_str());
        }
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Trace, span and execution identifiers attached to every record emitted
/// for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationContext {
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub execution_id: Option<String>,
}

impl CorrelationContext {
    /// Derive the correlation fields of a request.
    ///
    /// `None` yields an empty context. A missing trace header is not an
    /// error, the record is simply emitted without trace fields. The
    /// execution id comes from the first candidate header that is present
    /// and non-empty, in the order given.
    pub fn extract(headers: Option<&dyn HeaderSource>, execution_id_headers: &[String]) -> Self {
        let Some(headers) = headers else {
            return Self::default();
        };

        let (trace_id, span_id) = match non_empty(headers.header(TRACE_CONTEXT_HEADER)) {
            Some(value) => parse_trace_header(value),
            None => non_empty(headers.header(TRACEPARENT_HEADER))
                .map(parse_traceparent)
                .unwrap_or_default(),
        };

        let execution_id = execution_id_headers
            .iter()
            .find_map(|name| non_empty(headers.header(name)))
            .map(str::to_string);

        Self {
            trace_id,
            span_id,
            execution_id,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.trace_id.is_none() && self.span_id.is_none() && self.execution_id.is_none()
    }
}

/// Split an `X-Cloud-Trace-Context` value into trace and span ids.
///
/// The sampling flag after `;` is discarded. Empty parts yield `None`.
pub fn parse_trace_header(value: &str) -> (Option<String>, Option<String>) {
    let value = value.trim();
    let (trace, rest) = match value.split_once('/') {
        Some((trace, rest)) => (trace, Some(rest)),
        None => (value.split(';').next().unwrap_or_default(), None),
    };
    let span = rest.and_then(|rest| rest.split(';').next());

    (owned(trace), span.and_then(owned))
}

// version-traceid-parentid-flags
fn parse_traceparent(value: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = value.trim().split('-').collect();
    if parts.len() != 4 {
        return (None, None);
    }
    (owned(parts[1]), owned(parts[2]))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn owned(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
