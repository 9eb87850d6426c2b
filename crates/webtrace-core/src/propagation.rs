//! Distributed trace-context propagation
//!
//! A [`TraceContext`] links an inbound request to the caller's trace: the
//! request span becomes a child of `span_id` within `trace_id`. The wire
//! format is a pluggable seam behind [`ContextExtractor`]; extraction is
//! infallible by contract, any decode problem is simply "no context".

use serde::{Deserialize, Serialize};

use crate::request::RequestMeta;

/// Default header carrying the trace id.
pub const TRACE_ID_HEADER: &str = "x-trace-id";
/// Default header carrying the parent span id.
pub const PARENT_ID_HEADER: &str = "x-parent-id";

/// A remote trace identity decoded from inbound request metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Trace the caller is part of.
    pub trace_id: u64,
    /// Span on the caller's side that the request span should parent on.
    pub span_id: u64,
}

/// Decodes a distributed trace context from request metadata.
///
/// Implementations must never fail: a context that cannot be decoded is
/// reported as absent.
pub trait ContextExtractor: Send + Sync {
    /// Attempt to decode a context from the request.
    fn extract(&self, meta: &RequestMeta) -> Option<TraceContext>;
}

/// Extractor reading decimal trace and parent ids from a pair of headers.
///
/// # Example
///
/// ```rust,ignore
/// let extractor = HeaderContextExtractor::new()
///     .with_headers("x-upstream-trace", "x-upstream-span");
/// ```
#[derive(Debug, Clone)]
pub struct HeaderContextExtractor {
    trace_id_header: String,
    parent_id_header: String,
}

impl HeaderContextExtractor {
    /// Extractor using the default header names.
    pub fn new() -> Self {
        Self {
            trace_id_header: TRACE_ID_HEADER.to_string(),
            parent_id_header: PARENT_ID_HEADER.to_string(),
        }
    }

    /// Use custom header names.
    pub fn with_headers(
        mut self,
        trace_id_header: impl Into<String>,
        parent_id_header: impl Into<String>,
    ) -> Self {
        self.trace_id_header = trace_id_header.into();
        self.parent_id_header = parent_id_header.into();
        self
    }
}

impl Default for HeaderContextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextExtractor for HeaderContextExtractor {
    fn extract(&self, meta: &RequestMeta) -> Option<TraceContext> {
        let trace_id = parse_id(meta.header(&self.trace_id_header))?;
        let span_id = parse_id(meta.header(&self.parent_id_header))?;
        Some(TraceContext { trace_id, span_id })
    }
}

fn parse_id(raw: Option<&str>) -> Option<u64> {
    let raw = raw?.trim();
    match raw.parse::<u64>() {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::debug!(value = raw, "ignoring malformed trace-context id");
            None
        }
    }
}
