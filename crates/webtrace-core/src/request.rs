//! Request metadata and request-scoped state
//!
//! [`RequestMeta`] is the interceptor's view of an inbound request.
//! [`RequestState`] is the per-request mutable store shared between the
//! interceptor and the wrapped handler: it carries the live metadata (which
//! the handler may mutate), the request span, a pre-handler snapshot of the
//! original metadata, and the middleware identifier an application layer may
//! report for resource naming. One instance exists per request and is never
//! shared across requests.

use std::sync::{Arc, Mutex};

use http::{HeaderMap, Method, Uri};

/// Metadata of an inbound HTTP request.
///
/// `uri` holds the path and query as routed; `raw_uri` is the full
/// request-URI exactly as the transport supplied it, when it did. The two
/// are kept separate because the URL tag prefers the raw value and some
/// transports never provide one.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    method: Method,
    uri: Uri,
    raw_uri: Option<String>,
    scheme: String,
    host: String,
    port: u16,
    headers: HeaderMap,
}

impl RequestMeta {
    /// Create metadata for `method` and `uri` with default transport
    /// details (`http://localhost:80`, empty headers).
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            raw_uri: None,
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 80,
            headers: HeaderMap::new(),
        }
    }

    /// Attach the full request-URI as supplied by the transport.
    pub fn with_raw_uri(mut self, raw_uri: impl Into<String>) -> Self {
        self.raw_uri = Some(raw_uri.into());
        self
    }

    /// Set scheme, host and port.
    pub fn with_origin(mut self, scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        self.scheme = scheme.into();
        self.host = host.into();
        self.port = port;
        self
    }

    /// Add a header. Invalid names or values are ignored rather than
    /// rejected; metadata construction never fails.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::try_from(name),
            http::header::HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Routed URI (path and query).
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Replace the routed URI. Handlers use this during error handling;
    /// the URL tag falls back to the pre-handler snapshot for that reason.
    pub fn set_uri(&mut self, uri: Uri) {
        self.uri = uri;
    }

    /// Request path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Full request-URI from the transport, if supplied.
    pub fn raw_uri(&self) -> Option<&str> {
        self.raw_uri.as_deref()
    }

    /// Headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Scheme, host and non-default port, e.g. `https://api.example.com`.
    pub fn base_url(&self) -> String {
        let default_port = match self.scheme.as_str() {
            "https" => 443,
            _ => 80,
        };
        if self.port == default_port {
            format!("{}://{}", self.scheme, self.host)
        } else {
            format!("{}://{}:{}", self.scheme, self.host, self.port)
        }
    }
}

/// Copy of the request identity taken before the handler runs.
///
/// Handlers may rewrite the live path while producing an error page; the
/// snapshot keeps the original so the URL tag never reports a post-mutation
/// path.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    method: Method,
    path: String,
}

impl RequestSnapshot {
    /// Capture the snapshot from live metadata.
    pub fn capture(meta: &RequestMeta) -> Self {
        Self {
            method: meta.method().clone(),
            path: meta.path().to_string(),
        }
    }

    /// Method at capture time.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path at capture time.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Request-scoped state shared with the wrapped handler.
pub struct RequestState {
    meta: RequestMeta,
    span: Option<crate::span::SpanHandle>,
    snapshot: Option<RequestSnapshot>,
    middleware_identifier: Option<String>,
    legacy_span_warned: bool,
}

/// Shared handle to one request's [`RequestState`].
pub type ScopedState = Arc<Mutex<RequestState>>;

impl RequestState {
    /// Create state for one request.
    pub fn new(meta: RequestMeta) -> Self {
        Self {
            meta,
            span: None,
            snapshot: None,
            middleware_identifier: None,
            legacy_span_warned: false,
        }
    }

    /// Wrap the state for sharing with the handler.
    pub fn into_scoped(self) -> ScopedState {
        Arc::new(Mutex::new(self))
    }

    /// Live request metadata.
    pub fn meta(&self) -> &RequestMeta {
        &self.meta
    }

    /// Mutable live metadata; handlers may rewrite it.
    pub fn meta_mut(&mut self) -> &mut RequestMeta {
        &mut self.meta
    }

    /// The request span, once the interceptor has opened it.
    pub fn request_span(&self) -> Option<crate::span::SpanHandle> {
        self.span.clone()
    }

    /// Deprecated name for [`request_span`](Self::request_span).
    ///
    /// Logs a deprecation warning the first time it is used on a given
    /// request's state, then behaves exactly like `request_span`.
    #[deprecated(note = "use `request_span` instead")]
    pub fn active_span(&mut self) -> Option<crate::span::SpanHandle> {
        if !self.legacy_span_warned {
            self.legacy_span_warned = true;
            tracing::warn!("`active_span` is deprecated, use `request_span` instead");
        }
        self.request_span()
    }

    pub(crate) fn set_request_span(&mut self, span: crate::span::SpanHandle) {
        self.span = Some(span);
    }

    /// Snapshot of the metadata taken before the handler ran.
    pub fn snapshot(&self) -> Option<&RequestSnapshot> {
        self.snapshot.as_ref()
    }

    pub(crate) fn set_snapshot(&mut self, snapshot: RequestSnapshot) {
        self.snapshot = Some(snapshot);
    }

    /// Middleware identifier reported by the application layer, if any.
    pub fn middleware_identifier(&self) -> Option<&str> {
        self.middleware_identifier.as_deref()
    }

    /// Report the middleware that handled the request, used for resource
    /// naming when middleware-name resolution is enabled.
    pub fn set_middleware_identifier(&mut self, identifier: impl Into<String>) {
        self.middleware_identifier = Some(identifier.into());
    }
}

impl std::fmt::Debug for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestState")
            .field("method", self.meta.method())
            .field("uri", self.meta.uri())
            .field("has_span", &self.span.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_elides_default_ports() {
        let meta = RequestMeta::new(Method::GET, "/".parse().unwrap())
            .with_origin("http", "example.com", 80);
        assert_eq!(meta.base_url(), "http://example.com");

        let meta = RequestMeta::new(Method::GET, "/".parse().unwrap())
            .with_origin("https", "example.com", 443);
        assert_eq!(meta.base_url(), "https://example.com");

        let meta = RequestMeta::new(Method::GET, "/".parse().unwrap())
            .with_origin("http", "example.com", 8080);
        assert_eq!(meta.base_url(), "http://example.com:8080");
    }

    #[test]
    fn test_header_lookup() {
        let meta = RequestMeta::new(Method::GET, "/".parse().unwrap())
            .with_header("x-request-start", "t=1512379167.574")
            .with_header("bad header name!", "ignored");
        assert_eq!(meta.header("x-request-start"), Some("t=1512379167.574"));
        assert_eq!(meta.header("X-Request-Start"), Some("t=1512379167.574"));
        assert!(meta.header("missing").is_none());
    }

    #[test]
    fn test_snapshot_survives_path_mutation() {
        let meta = RequestMeta::new(Method::GET, "/users?id=5".parse().unwrap());
        let snapshot = RequestSnapshot::capture(&meta);

        let mut state = RequestState::new(meta);
        state.meta_mut().set_uri("/error".parse().unwrap());

        assert_eq!(snapshot.path(), "/users");
        assert_eq!(state.meta().path(), "/error");
    }

    #[test]
    fn test_deprecated_accessor_warns_once() {
        let mut state = RequestState::new(RequestMeta::new(Method::GET, "/".parse().unwrap()));
        assert!(!state.legacy_span_warned);
        #[allow(deprecated)]
        {
            let _ = state.active_span();
            assert!(state.legacy_span_warned);
            // second call must not re-arm the flag
            let _ = state.active_span();
            assert!(state.legacy_span_warned);
        }
    }

    /// Counts warn-level events emitted while installed.
    #[derive(Clone, Default)]
    struct WarnCounter {
        warns: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl<S> tracing_subscriber::Layer<S> for WarnCounter
    where
        S: tracing::Subscriber,
    {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.warns.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_deprecated_accessor_logs_single_warning() {
        use tracing_subscriber::layer::SubscriberExt;

        let counter = WarnCounter::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut state = RequestState::new(RequestMeta::new(Method::GET, "/".parse().unwrap()));
        #[allow(deprecated)]
        {
            let _ = state.active_span();
            let _ = state.active_span();
            let _ = state.active_span();
        }

        assert_eq!(counter.warns.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
