//! Span model for webtrace
//!
//! A [`SpanHandle`] is a cheaply cloneable, shared handle to one span. The
//! interceptor stores the request span's handle in the request-scoped state,
//! so the wrapped handler and the post-handler enrichment both see the same
//! span. Once [`SpanHandle::finish`] has run the span is sealed: further
//! mutation is ignored and the finished record is handed to the tracer's
//! sink.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

/// Well-known span tag keys.
pub mod tag {
    /// HTTP request method, e.g. `GET`.
    pub const HTTP_METHOD: &str = "http.method";
    /// Request URL (quantized), e.g. `/users?id=?`.
    pub const HTTP_URL: &str = "http.url";
    /// Scheme, host and non-default port, e.g. `https://api.example.com`.
    pub const HTTP_BASE_URL: &str = "http.base_url";
    /// Numeric HTTP response status code.
    pub const HTTP_STATUS_CODE: &str = "http.status_code";
    /// Error message recorded from a failed handler.
    pub const ERROR_MESSAGE: &str = "error.message";
    /// Debug representation of the failure value.
    pub const ERROR_TYPE: &str = "error.type";
    /// Source chain of the failure, outermost first.
    pub const ERROR_STACK: &str = "error.stack";
}

/// Kind of work a span represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    /// Span wraps the server side of an HTTP exchange.
    Server,
    /// Span wraps an outbound client call.
    Client,
}

impl SpanKind {
    /// Wire representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Server => "server",
            SpanKind::Client => "client",
        }
    }
}

/// Tri-state error flag for a span.
///
/// `Unset` means nothing has claimed the span's outcome yet; it is distinct
/// from an explicit `Ok` so that a handler marking its span healthy is never
/// confused with a span nobody looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpanStatus {
    /// No outcome recorded.
    #[default]
    Unset,
    /// Explicitly marked successful.
    Ok,
    /// Marked failed.
    Error,
}

/// Options accepted by [`Tracer::trace`](crate::Tracer::trace).
///
/// # Example
///
/// ```rust,ignore
/// let opts = SpanOptions::new()
///     .with_service("billing")
///     .with_kind(SpanKind::Server);
/// let span = tracer.trace("http.request", opts);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SpanOptions {
    pub(crate) service: Option<String>,
    pub(crate) kind: Option<SpanKind>,
    pub(crate) start_time: Option<SystemTime>,
    pub(crate) resource: Option<String>,
}

impl SpanOptions {
    /// Create empty options: start time defaults to now, no service, no
    /// kind, resource left unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service the span is attributed to.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Set the span kind.
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Anchor the span at an explicit start time instead of now.
    pub fn with_start_time(mut self, start: SystemTime) -> Self {
        self.start_time = Some(start);
        self
    }

    /// Pre-set the resource name.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

#[derive(Debug)]
pub(crate) struct SpanInner {
    pub(crate) name: String,
    pub(crate) service: Option<String>,
    pub(crate) kind: Option<SpanKind>,
    pub(crate) trace_id: u64,
    pub(crate) span_id: u64,
    pub(crate) parent_id: Option<u64>,
    pub(crate) start: SystemTime,
    pub(crate) end: Option<SystemTime>,
    pub(crate) resource: Option<String>,
    pub(crate) tags: HashMap<String, String>,
    pub(crate) status: SpanStatus,
}

/// Immutable record of a completed span, handed to the tracer's sink by
/// [`SpanHandle::finish`]. This is the seam where an export pipeline would
/// attach; it is also what tests observe.
#[derive(Debug, Clone)]
pub struct FinishedSpan {
    pub name: String,
    pub service: Option<String>,
    pub kind: Option<SpanKind>,
    pub trace_id: u64,
    pub span_id: u64,
    pub parent_id: Option<u64>,
    pub start: SystemTime,
    pub end: SystemTime,
    pub resource: Option<String>,
    pub tags: HashMap<String, String>,
    pub status: SpanStatus,
}

pub(crate) type SpanSink = Arc<Mutex<Vec<FinishedSpan>>>;

/// Shared handle to a live span.
#[derive(Clone)]
pub struct SpanHandle {
    inner: Arc<Mutex<SpanInner>>,
    sink: SpanSink,
}

impl SpanHandle {
    pub(crate) fn new(inner: SpanInner, sink: SpanSink) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
            sink,
        }
    }

    // A poisoned span lock only means some other holder panicked mid-write;
    // the data is still usable for cleanup, which must not panic again.
    fn lock(&self) -> MutexGuard<'_, SpanInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Span name, fixed at creation.
    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    /// Trace this span belongs to.
    pub fn trace_id(&self) -> u64 {
        self.lock().trace_id
    }

    /// This span's own id.
    pub fn span_id(&self) -> u64 {
        self.lock().span_id
    }

    /// Parent span id, if the span was created under an active context.
    pub fn parent_id(&self) -> Option<u64> {
        self.lock().parent_id
    }

    /// Start time (explicit or creation time).
    pub fn start_time(&self) -> SystemTime {
        self.lock().start
    }

    /// Whether `finish` has already run.
    pub fn is_finished(&self) -> bool {
        self.lock().end.is_some()
    }

    /// Set a tag, overwriting any previous value.
    ///
    /// First-write-wins semantics for HTTP enrichment are enforced by the
    /// enricher (it checks [`get_tag`](Self::get_tag) first), not by the
    /// span itself: handlers may overwrite their own tags freely.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut inner = self.lock();
        if inner.end.is_some() {
            return;
        }
        inner.tags.insert(key.into(), value.into());
    }

    /// Read a tag.
    pub fn get_tag(&self, key: &str) -> Option<String> {
        self.lock().tags.get(key).cloned()
    }

    /// Resource name, if set.
    pub fn resource(&self) -> Option<String> {
        self.lock().resource.clone()
    }

    /// Set the resource name, overwriting any previous value.
    pub fn set_resource(&self, resource: impl Into<String>) {
        let mut inner = self.lock();
        if inner.end.is_some() {
            return;
        }
        inner.resource = Some(resource.into());
    }

    /// Current error flag.
    pub fn status(&self) -> SpanStatus {
        self.lock().status
    }

    /// Set the error flag explicitly.
    pub fn set_status(&self, status: SpanStatus) {
        let mut inner = self.lock();
        if inner.end.is_some() {
            return;
        }
        inner.status = status;
    }

    /// Flag the span as failed without recording failure details.
    pub fn mark_error(&self) {
        self.set_status(SpanStatus::Error);
    }

    /// Record a failure on the span: message, debug representation, and the
    /// source chain when one exists. Also sets the error flag.
    pub fn set_error<E>(&self, err: &E)
    where
        E: std::error::Error + ?Sized,
    {
        let mut inner = self.lock();
        if inner.end.is_some() {
            return;
        }
        inner.status = SpanStatus::Error;
        inner.tags.insert(tag::ERROR_MESSAGE.into(), err.to_string());
        inner.tags.insert(tag::ERROR_TYPE.into(), format!("{err:?}"));

        let mut frames = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            frames.push(cause.to_string());
            source = cause.source();
        }
        if !frames.is_empty() {
            inner.tags.insert(tag::ERROR_STACK.into(), frames.join("\n"));
        }
    }

    /// Record a failure from a bare message (no source error value).
    pub fn set_error_message(&self, message: impl Into<String>) {
        let mut inner = self.lock();
        if inner.end.is_some() {
            return;
        }
        inner.status = SpanStatus::Error;
        inner.tags.insert(tag::ERROR_MESSAGE.into(), message.into());
    }

    /// Seal the span and hand it to the tracer's sink.
    ///
    /// The first call wins; a second call is a logged no-op so a buggy
    /// caller can never produce two finished records for one span.
    pub fn finish(&self) {
        let mut inner = self.lock();
        if inner.end.is_some() {
            tracing::warn!(span = %inner.name, "span already finished, ignoring second finish");
            return;
        }
        let end = SystemTime::now();
        inner.end = Some(end);

        let record = FinishedSpan {
            name: inner.name.clone(),
            service: inner.service.clone(),
            kind: inner.kind,
            trace_id: inner.trace_id,
            span_id: inner.span_id,
            parent_id: inner.parent_id,
            start: inner.start,
            end,
            resource: inner.resource.clone(),
            tags: inner.tags.clone(),
            status: inner.status,
        };
        drop(inner);

        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

impl std::fmt::Debug for SpanHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("SpanHandle")
            .field("name", &inner.name)
            .field("trace_id", &inner.trace_id)
            .field("span_id", &inner.span_id)
            .field("finished", &inner.end.is_some())
            .finish()
    }
}
