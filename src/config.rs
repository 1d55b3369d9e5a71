//! Client configuration.
//!
//! A [`Config`] carries the call defaults for one logical linked service:
//! timeout, TLS verification, default headers, trace naming, retry bounds and
//! the archive-tracing flag. It is built once, then copied into an immutable
//! snapshot when a client is instantiated; builder methods may adjust the
//! copy before first use, never after.
//!
//! The struct is deserializable so it can be embedded in an application's
//! own configuration surface; actually loading it is the caller's problem.

use crate::hartrace::HarSpan;
use crate::trace::Span;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Placeholder substituted with the operation name in request span names.
pub const OP_NAME_PLACEHOLDER: &str = "{op-name}";
/// Placeholder substituted with the request id in request span names.
pub const REQUEST_ID_PLACEHOLDER: &str = "{req-id}";

/// Span tag carrying the operation name.
pub const OP_NAME_TAG: &str = "op-name";
/// Span tag carrying the request id.
pub const REQUEST_ID_TAG: &str = "req-id";
/// Span tag carrying the long-running-action correlation id.
pub const LRA_ID_TAG: &str = "long-running-action";
/// Span tag cross-referencing the archive span from the generic span.
pub const HAR_SPAN_ID_TAG: &str = "har-trace-id";
/// Span tag carrying the target URL.
pub const HTTP_URL_TAG: &str = "http.url";
/// Span tag carrying the HTTP method.
pub const HTTP_METHOD_TAG: &str = "http.method";
/// Span tag carrying the resulting status code.
pub const HTTP_STATUS_CODE_TAG: &str = "http.status_code";
/// Span tag flagging an errored exchange.
pub const ERROR_TAG: &str = "error";
/// Span tag carrying the error message of a failed exchange.
pub const ERROR_MESSAGE_TAG: &str = "error.message";

/// A default header applied to every request built by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Call defaults for one linked service.
///
/// The two optional spans are externally owned tracing parents: the client
/// never finishes a span it did not start.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Per-request timeout enforced by the transport.
    pub timeout: Option<Duration>,
    /// Skip TLS certificate verification.
    pub skip_verify: bool,
    /// Headers prepended to every request, in order.
    pub headers: Vec<Header>,
    /// Name of the client-level span. When non-empty the client starts (and
    /// owns) a group span at construction time.
    pub trace_group_name: String,
    /// Template for per-request span names; supports
    /// [`OP_NAME_PLACEHOLDER`] and [`REQUEST_ID_PLACEHOLDER`].
    pub trace_request_name: String,
    /// Number of retries the transport may attempt. Zero disables retries.
    pub retry_count: u32,
    /// Minimum wait between retries.
    pub retry_wait: Option<Duration>,
    /// Maximum wait between retries.
    pub retry_max_wait: Option<Duration>,
    /// Status codes the retry predicate treats as retriable. An empty list
    /// makes the predicate permissive.
    pub retry_on_http_errors: Vec<u16>,
    /// Record archive-tracing spans alongside the generic spans.
    pub har_tracing_enabled: bool,
    /// Externally supplied parent for the client-level span.
    #[serde(skip)]
    pub span: Option<Arc<dyn Span>>,
    /// Externally supplied archive-tracing parent; never finished here.
    #[serde(skip)]
    pub har_span: Option<Arc<dyn HarSpan>>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("timeout", &self.timeout)
            .field("skip_verify", &self.skip_verify)
            .field("headers", &self.headers)
            .field("trace_group_name", &self.trace_group_name)
            .field("trace_request_name", &self.trace_request_name)
            .field("retry_count", &self.retry_count)
            .field("retry_wait", &self.retry_wait)
            .field("retry_max_wait", &self.retry_max_wait)
            .field("retry_on_http_errors", &self.retry_on_http_errors)
            .field("har_tracing_enabled", &self.har_tracing_enabled)
            .field("span", &self.span.is_some())
            .field("har_span", &self.har_span.is_some())
            .finish()
    }
}
