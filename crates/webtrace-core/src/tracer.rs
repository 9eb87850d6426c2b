//! Tracer capability: span creation, the ambient active context, and the
//! finished-span sink.
//!
//! The tracer is the one piece of shared mutable state in this crate. The
//! active-context register is worker-scoped: whichever span was created last
//! is the implicit parent of the next one, and a remote context installed by
//! the propagator takes its place. The interceptor resets the register at
//! the end of every request so a reused worker never starts a new request
//! inside the previous request's trace.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use crate::propagation::TraceContext;
use crate::span::{FinishedSpan, SpanHandle, SpanInner, SpanOptions, SpanSink};

/// Creates spans and owns the ambient tracing context.
///
/// Cloning a `Tracer` is cheap and shares the same context register and
/// sink, so one tracer can be handed to an interceptor per worker.
///
/// # Example
///
/// ```rust,ignore
/// let tracer = Tracer::new();
/// let span = tracer.trace("http.request", SpanOptions::new().with_service("web"));
/// span.finish();
/// let finished = tracer.drain_finished();
/// ```
#[derive(Clone, Default)]
pub struct Tracer {
    active: Arc<Mutex<Option<TraceContext>>>,
    sink: SpanSink,
}

impl Tracer {
    /// Create a tracer with an empty active context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new span.
    ///
    /// The span is parented on the current active context (same trace id,
    /// parent = the context's span id) or starts a fresh trace when the
    /// context is empty. Either way the new span becomes the active context,
    /// so the next span created on this tracer is its child.
    pub fn trace(&self, name: impl Into<String>, options: SpanOptions) -> SpanHandle {
        let mut active = self.lock_active();

        let (trace_id, parent_id) = match *active {
            Some(ctx) => (ctx.trace_id, Some(ctx.span_id)),
            None => (next_id(), None),
        };
        let span_id = next_id();
        *active = Some(TraceContext { trace_id, span_id });
        drop(active);

        SpanHandle::new(
            SpanInner {
                name: name.into(),
                service: options.service,
                kind: options.kind,
                trace_id,
                span_id,
                parent_id,
                start: options.start_time.unwrap_or_else(SystemTime::now),
                end: None,
                resource: options.resource,
                tags: Default::default(),
                status: Default::default(),
            },
            self.sink.clone(),
        )
    }

    /// Current active context, if any.
    pub fn active_context(&self) -> Option<TraceContext> {
        *self.lock_active()
    }

    /// Replace the active context, e.g. with one decoded from an inbound
    /// request. Spans created afterwards become children of `ctx.span_id`.
    pub fn set_active_context(&self, ctx: TraceContext) {
        *self.lock_active() = Some(ctx);
    }

    /// Install a fresh empty context.
    pub fn reset(&self) {
        *self.lock_active() = None;
    }

    /// Take all finished spans collected so far, oldest first.
    pub fn drain_finished(&self) -> Vec<FinishedSpan> {
        std::mem::take(&mut *self.sink.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Snapshot of the finished spans without draining them.
    pub fn finished(&self) -> Vec<FinishedSpan> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<TraceContext>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("active", &self.active_context())
            .finish()
    }
}

/// Nonzero 64-bit id derived from a v4 UUID.
fn next_id() -> u64 {
    loop {
        let id = uuid::Uuid::new_v4().as_u128() as u64;
        if id != 0 {
            return id;
        }
    }
}
