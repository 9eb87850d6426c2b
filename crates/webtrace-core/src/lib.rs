//! # webtrace-core
//!
//! Request-tracing interceptor for HTTP services: wraps the handling of one
//! inbound request in an APM-style span, chains it under an upstream
//! queue-time span when the front-end server reported one, parents it on a
//! distributed trace context when one arrived with the request, enriches it
//! with baseline HTTP tags after the handler ran, and guarantees cleanup of
//! the ambient tracing context on every exit path.
//!
//! The entry point is [`TraceInterceptor::intercept`]; everything else is
//! the machinery it composes.

mod config;
mod enrich;
mod interceptor;
mod propagation;
mod quantize;
mod queue_time;
mod request;
mod span;
mod tracer;

// Public API
pub use config::{QuantizeOptions, TraceConfig, DEFAULT_SERVICE_NAME, DEFAULT_WEB_SERVICE_NAME};
pub use enrich::enrich;
pub use interceptor::{
    BoxError, BoxedHandler, HandlerOutput, TraceInterceptor, QUEUE_SPAN_NAME, REQUEST_SPAN_NAME,
};
pub use propagation::{
    ContextExtractor, HeaderContextExtractor, TraceContext, PARENT_ID_HEADER, TRACE_ID_HEADER,
};
pub use quantize::quantize_url;
pub use queue_time::{request_start, QUEUE_START, REQUEST_START};
pub use request::{RequestMeta, RequestSnapshot, RequestState, ScopedState};
pub use span::{tag, FinishedSpan, SpanHandle, SpanKind, SpanOptions, SpanStatus};
pub use tracer::Tracer;
