//! Configuration for the request-tracing interceptor
//!
//! A [`TraceConfig`] is a read-only bag of toggles consumed once per
//! request. It is built with the usual `with_*` chain and can also be
//! deserialized from a deployment's config file.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = TraceConfig::new()
//!     .with_service_name("billing")
//!     .with_request_queuing(true)
//!     .with_distributed_tracing(true);
//! ```

use serde::{Deserialize, Serialize};

/// Default service name for the request span.
pub const DEFAULT_SERVICE_NAME: &str = "web";
/// Default service name for the queue-time span (the front-end server).
pub const DEFAULT_WEB_SERVICE_NAME: &str = "web-server";

/// Toggles consumed by [`TraceInterceptor`](crate::TraceInterceptor).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Open a queue-time span when the front-end server reported a request
    /// start timestamp.
    pub request_queuing: bool,
    /// Honor a distributed trace context extracted from inbound metadata.
    pub distributed_tracing: bool,
    /// Build the resource name from an application-supplied middleware
    /// identifier when one is present.
    pub middleware_names: bool,
    /// Service attributed to the request span.
    pub service_name: String,
    /// Service attributed to the queue-time span.
    pub web_service_name: String,
    /// URL quantization options applied to the `http.url` tag.
    pub quantize: QuantizeOptions,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            request_queuing: false,
            distributed_tracing: false,
            middleware_names: false,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            web_service_name: DEFAULT_WEB_SERVICE_NAME.to_string(),
            quantize: QuantizeOptions::default(),
        }
    }
}

impl TraceConfig {
    /// Create a config with all features off and default service names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable queue-time span reporting.
    pub fn with_request_queuing(mut self, enabled: bool) -> Self {
        self.request_queuing = enabled;
        self
    }

    /// Enable or disable distributed context propagation.
    pub fn with_distributed_tracing(mut self, enabled: bool) -> Self {
        self.distributed_tracing = enabled;
        self
    }

    /// Enable or disable middleware-name resource resolution.
    pub fn with_middleware_names(mut self, enabled: bool) -> Self {
        self.middleware_names = enabled;
        self
    }

    /// Set the request span's service name.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the queue-time span's service name.
    pub fn with_web_service_name(mut self, name: impl Into<String>) -> Self {
        self.web_service_name = name.into();
        self
    }

    /// Set the URL quantization options.
    pub fn with_quantize(mut self, options: QuantizeOptions) -> Self {
        self.quantize = options;
        self
    }
}

/// Options for [`quantize_url`](crate::quantize_url).
///
/// By default every query value collapses to `?` and the fragment is
/// dropped; `show` whitelists query keys whose values are kept, `exclude`
/// removes a key entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizeOptions {
    /// Query keys whose values survive quantization.
    pub show: Vec<String>,
    /// Query keys dropped from the URL altogether.
    pub exclude: Vec<String>,
    /// Keep the URL fragment instead of stripping it.
    pub fragment: bool,
}

impl QuantizeOptions {
    /// Default options: collapse every value, drop the fragment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the values of the given query keys.
    pub fn with_show(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.show = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Drop the given query keys from the URL.
    pub fn with_exclude(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Keep the fragment.
    pub fn with_fragment(mut self, keep: bool) -> Self {
        self.fragment = keep;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_all_off() {
        let config = TraceConfig::new();
        assert!(!config.request_queuing);
        assert!(!config.distributed_tracing);
        assert!(!config.middleware_names);
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
        assert_eq!(config.web_service_name, DEFAULT_WEB_SERVICE_NAME);
    }

    #[test]
    fn test_builder_chain() {
        let config = TraceConfig::new()
            .with_request_queuing(true)
            .with_distributed_tracing(true)
            .with_middleware_names(true)
            .with_service_name("billing")
            .with_web_service_name("nginx")
            .with_quantize(QuantizeOptions::new().with_show(["page"]));

        assert!(config.request_queuing);
        assert!(config.distributed_tracing);
        assert!(config.middleware_names);
        assert_eq!(config.service_name, "billing");
        assert_eq!(config.web_service_name, "nginx");
        assert_eq!(config.quantize.show, vec!["page".to_string()]);
    }
}
