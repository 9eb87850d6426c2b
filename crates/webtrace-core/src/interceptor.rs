//! Request-tracing interceptor
//!
//! [`TraceInterceptor`] wraps the handling of one inbound request in a
//! request span, optionally chained under a queue-time span anchored at the
//! front-end server's timestamp, and parented on a distributed trace
//! context when one arrives with the request.
//!
//! The sequencing is strict: queue-time check, context propagation, span
//! open, handler invocation, then a terminal cleanup that runs exactly once
//! on every exit path: normal return, handler error, or panic. The cleanup
//! enriches the span, finishes the request span and then the queue span,
//! and resets the tracer's ambient context so a reused worker never leaks
//! one request's trace identity into the next.
//!
//! Tracing is an observational side channel only: the handler's response is
//! returned untouched, its error is returned untouched, and a panic is
//! resumed untouched after cleanup.
//!
//! # Example
//!
//! ```rust,ignore
//! let interceptor = TraceInterceptor::new(
//!     TraceConfig::new().with_request_queuing(true),
//!     Tracer::new(),
//! );
//!
//! let handler: BoxedHandler = Arc::new(|state| {
//!     Box::pin(async move {
//!         let method = state.lock().unwrap().meta().method().clone();
//!         Ok((StatusCode::OK, HeaderMap::new(), Bytes::from(format!("{method}"))))
//!     })
//! });
//!
//! let result = interceptor.intercept(meta, handler).await;
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, PoisonError};

use bytes::Bytes;
use futures_util::FutureExt;
use http::{HeaderMap, StatusCode};

use crate::config::TraceConfig;
use crate::enrich::enrich;
use crate::propagation::{ContextExtractor, HeaderContextExtractor};
use crate::queue_time;
use crate::request::{RequestMeta, RequestSnapshot, RequestState, ScopedState};
use crate::span::{SpanKind, SpanOptions};
use crate::tracer::Tracer;

/// Name of the span wrapping the handler invocation.
pub const REQUEST_SPAN_NAME: &str = "http.request";
/// Name of the span covering time spent queued in the front-end server.
pub const QUEUE_SPAN_NAME: &str = "http.queue";

/// Boxed error type produced by a failing handler.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler produces on success.
pub type HandlerOutput = (StatusCode, HeaderMap, Bytes);

/// A boxed async handler: the opaque application being wrapped.
///
/// The handler receives the request-scoped state, may mutate its metadata,
/// read the request span via [`RequestState::request_span`], and may fail
/// with any error type (or panic).
pub type BoxedHandler = Arc<
    dyn Fn(ScopedState) -> Pin<Box<dyn Future<Output = Result<HandlerOutput, BoxError>> + Send>>
        + Send
        + Sync,
>;

/// Wraps handler invocations in request spans.
#[derive(Clone)]
pub struct TraceInterceptor {
    config: TraceConfig,
    tracer: Tracer,
    extractor: Arc<dyn ContextExtractor>,
}

impl TraceInterceptor {
    /// Create an interceptor with the default header-based context
    /// extractor.
    pub fn new(config: TraceConfig, tracer: Tracer) -> Self {
        Self {
            config,
            tracer,
            extractor: Arc::new(HeaderContextExtractor::new()),
        }
    }

    /// Swap in a different distributed-context decoder.
    pub fn with_extractor<E: ContextExtractor + 'static>(mut self, extractor: E) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    /// The tracer this interceptor feeds.
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Handle one request: open spans, run the handler, enrich, finish,
    /// reset. The terminal cleanup runs on every exit path.
    pub async fn intercept(
        &self,
        meta: RequestMeta,
        handler: BoxedHandler,
    ) -> Result<HandlerOutput, BoxError> {
        // Queue-time check: an upstream timestamp opens a span anchored
        // there, which the request span then parents on.
        let queue_span = if self.config.request_queuing {
            queue_time::request_start(&meta).map(|start| {
                self.tracer.trace(
                    QUEUE_SPAN_NAME,
                    SpanOptions::new()
                        .with_service(&self.config.web_service_name)
                        .with_start_time(start),
                )
            })
        } else {
            None
        };

        // Context propagation: a valid remote context replaces whatever is
        // active (possibly the queue span) before the request span opens.
        if self.config.distributed_tracing {
            if let Some(ctx) = self.extractor.extract(&meta) {
                if ctx.trace_id != 0 {
                    self.tracer.set_active_context(ctx);
                }
            }
        }

        // Span open. Resource stays unset; enrichment fills it in later.
        let span = self.tracer.trace(
            REQUEST_SPAN_NAME,
            SpanOptions::new()
                .with_service(&self.config.service_name)
                .with_kind(SpanKind::Server),
        );
        let snapshot = RequestSnapshot::capture(&meta);

        let state: ScopedState = {
            let mut state = RequestState::new(meta);
            state.set_request_span(span.clone());
            state.set_snapshot(snapshot.clone());
            state.into_scoped()
        };

        // Handler invocation. Panics are caught only so the terminal
        // cleanup below runs; they are resumed unchanged afterwards.
        let outcome = AssertUnwindSafe(handler(state.clone())).catch_unwind().await;

        let status = match &outcome {
            Ok(Ok((status, _headers, _body))) => Some(*status),
            Ok(Err(err)) => {
                span.set_error(err.as_ref());
                None
            }
            Err(payload) => {
                span.set_error_message(panic_message(payload.as_ref()));
                None
            }
        };

        // Terminal cleanup: enrich, finish request span, finish queue span,
        // reset the ambient context. Runs exactly once whatever happened
        // above.
        {
            let state = state.lock().unwrap_or_else(PoisonError::into_inner);
            enrich(&span, &state, status, &snapshot, &self.config);
        }
        span.finish();
        if let Some(queue_span) = queue_span {
            queue_span.finish();
        }
        self.tracer.reset();

        match outcome {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

impl std::fmt::Debug for TraceInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceInterceptor")
            .field("config", &self.config)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
