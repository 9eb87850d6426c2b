//! Post-handler span enrichment
//!
//! After the wrapped handler has returned (or failed), the request span is
//! filled in with baseline HTTP tags. Every step is first-write-wins: a
//! value the handler already put on the span is authoritative, the enricher
//! only guarantees a floor. Status-dependent steps are skipped when the
//! handler failed before producing a status.

use http::StatusCode;

use crate::config::TraceConfig;
use crate::quantize::quantize_url;
use crate::request::{RequestSnapshot, RequestState};
use crate::span::{tag, SpanHandle, SpanStatus};

/// Enrich the request span with HTTP semantics.
///
/// `state` is the live request state after handling (the handler may have
/// mutated its metadata); `snapshot` is the identity captured before the
/// handler ran; `status` is `None` when the handler failed without
/// producing a response.
pub fn enrich(
    span: &SpanHandle,
    state: &RequestState,
    status: Option<StatusCode>,
    snapshot: &RequestSnapshot,
    config: &TraceConfig,
) {
    let meta = state.meta();

    if span.resource().is_none() {
        let resource = match state.middleware_identifier() {
            Some(identifier) if config.middleware_names => {
                format!("{identifier}#{}", meta.method())
            }
            _ => {
                let status_text = status.map(|s| s.as_str().to_string()).unwrap_or_default();
                format!("{} {}", meta.method(), status_text).trim().to_string()
            }
        };
        span.set_resource(resource);
    }

    if span.get_tag(tag::HTTP_METHOD).is_none() {
        span.set_tag(tag::HTTP_METHOD, meta.method().as_str());
    }

    if span.get_tag(tag::HTTP_URL).is_none() {
        // The live path is untrustworthy here: error handlers rewrite it.
        // Prefer the transport's full request-URI, fall back to the
        // pre-handler snapshot.
        let url = meta
            .raw_uri()
            .map(str::to_string)
            .unwrap_or_else(|| snapshot.path().to_string());
        span.set_tag(tag::HTTP_URL, quantize_url(&url, &config.quantize));
    }

    if span.get_tag(tag::HTTP_BASE_URL).is_none() {
        span.set_tag(tag::HTTP_BASE_URL, meta.base_url());
    }

    if let Some(status) = status {
        if span.get_tag(tag::HTTP_STATUS_CODE).is_none() {
            span.set_tag(tag::HTTP_STATUS_CODE, status.as_str());
        }
        if status.is_server_error() && span.status() == SpanStatus::Unset {
            span.mark_error();
        }
    }
}
