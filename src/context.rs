//! Per-call execution context.

use crate::hartrace::HarSpan;
use crate::trace::Span;
use std::fmt;
use std::sync::Arc;

/// Per-call value object, constructed fresh for every `execute` and never
/// persisted.
///
/// Carries the correlation ids tagged onto the request span, plus optional
/// externally supplied parent spans for both tracing systems. A parent set
/// here takes precedence over the client's group span.
///
/// # Examples
///
/// ```
/// use harcall::ExecutionContext;
///
/// let ctx = ExecutionContext::new()
///     .with_op_name("create-token")
///     .with_request_id("req-1")
///     .with_lra_id("lra-42");
///
/// assert_eq!(ctx.op_name, "create-token");
/// assert!(ctx.span.is_none());
/// ```
#[derive(Clone, Default)]
pub struct ExecutionContext {
    /// Logical operation name, used in span naming and tagging.
    pub op_name: String,
    /// Correlation id of this request; recorded as the entry comment.
    pub request_id: String,
    /// Long-running-action id spanning multiple related calls.
    pub lra_id: String,
    /// Parent for the request span; overrides the client's group span.
    pub span: Option<Arc<dyn Span>>,
    /// Parent for the archive span; overrides the client's archive parent.
    pub har_span: Option<Arc<dyn HarSpan>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_op_name(mut self, op_name: impl Into<String>) -> Self {
        self.op_name = op_name.into();
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_lra_id(mut self, lra_id: impl Into<String>) -> Self {
        self.lra_id = lra_id.into();
        self
    }

    pub fn with_span(mut self, span: Arc<dyn Span>) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_har_span(mut self, span: Arc<dyn HarSpan>) -> Self {
        self.har_span = Some(span);
        self
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("op_name", &self.op_name)
            .field("request_id", &self.request_id)
            .field("lra_id", &self.lra_id)
            .field("span", &self.span.is_some())
            .field("har_span", &self.har_span.is_some())
            .finish()
    }
}
