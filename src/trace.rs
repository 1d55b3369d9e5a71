//! Generic distributed-tracing boundary.
//!
//! The client never talks to a process-global tracer registry: it holds a
//! [`Tracer`] injected at construction time, with [`NoopTracer`] as the
//! convenience default. Back-ends implement the two traits; the built-in
//! [`W3cTracer`] generates ids locally and propagates them as a W3C
//! `traceparent` header, which is enough for header propagation and tests.
//!
//! Spans started during a call are wrapped in a [`SpanGuard`], so they are
//! finished exactly once on every exit path.

use http::{HeaderMap, HeaderValue};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Header used by [`W3cTracer`] to propagate trace context.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// The propagatable identity of a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanContext {
    pub trace_id: String,
    pub span_id: String,
}

/// A span tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Str(s) => f.write_str(s),
            TagValue::Int(i) => write!(f, "{i}"),
            TagValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A named, timed unit of work in a distributed trace.
///
/// Tagging and finishing take `&self`: one span may be shared as a tracing
/// parent across concurrent calls, so implementations must be internally
/// synchronized per their back-end's contract.
pub trait Span: Send + Sync {
    fn context(&self) -> SpanContext;
    fn set_tag(&self, key: &str, value: TagValue);
    fn finish(&self);
}

/// A tracing back-end: starts spans and injects their context into outbound
/// headers.
pub trait Tracer: Send + Sync {
    /// Starts a span, as a child of `parent` when one is given.
    fn start_span(&self, name: &str, parent: Option<&SpanContext>) -> Arc<dyn Span>;
    /// Encodes a span's identity into the outbound header set.
    fn inject(&self, context: &SpanContext, headers: &mut HeaderMap);
}

/// Finishes the wrapped span when dropped.
///
/// Guarantees the span is closed exactly once regardless of success, error
/// or panic between span start and the end of the call.
pub struct SpanGuard {
    span: Arc<dyn Span>,
}

impl SpanGuard {
    pub fn new(span: Arc<dyn Span>) -> Self {
        Self { span }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.span.finish();
    }
}

/// Tracer that records nothing. The default when no back-end is injected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

struct NoopSpan;

impl Span for NoopSpan {
    fn context(&self) -> SpanContext {
        SpanContext {
            trace_id: String::new(),
            span_id: String::new(),
        }
    }

    fn set_tag(&self, _key: &str, _value: TagValue) {}

    fn finish(&self) {}
}

impl Tracer for NoopTracer {
    fn start_span(&self, _name: &str, _parent: Option<&SpanContext>) -> Arc<dyn Span> {
        Arc::new(NoopSpan)
    }

    fn inject(&self, _context: &SpanContext, _headers: &mut HeaderMap) {}
}

/// Minimal tracer propagating W3C trace context.
///
/// Child spans inherit the parent's trace id; root spans get a fresh one.
/// Tags and finishes are emitted as `tracing` events rather than shipped to
/// a collector, which makes this suitable as a top-level default where no
/// real back-end is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct W3cTracer;

struct W3cSpan {
    name: String,
    context: SpanContext,
    started: Instant,
}

impl Span for W3cSpan {
    fn context(&self) -> SpanContext {
        self.context.clone()
    }

    fn set_tag(&self, key: &str, value: TagValue) {
        tracing::trace!(span = %self.name, span_id = %self.context.span_id, key, value = %value, "span tag");
    }

    fn finish(&self) {
        tracing::trace!(
            span = %self.name,
            span_id = %self.context.span_id,
            elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0,
            "span finished"
        );
    }
}

impl Tracer for W3cTracer {
    fn start_span(&self, name: &str, parent: Option<&SpanContext>) -> Arc<dyn Span> {
        let trace_id = match parent {
            Some(parent) => parent.trace_id.clone(),
            None => format!("{:032x}", rand::thread_rng().gen::<u128>()),
        };
        let span_id = format!("{:016x}", rand::thread_rng().gen::<u64>());
        Arc::new(W3cSpan {
            name: name.to_owned(),
            context: SpanContext { trace_id, span_id },
            started: Instant::now(),
        })
    }

    fn inject(&self, context: &SpanContext, headers: &mut HeaderMap) {
        let value = format!("00-{}-{}-01", context.trace_id, context.span_id);
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(TRACEPARENT_HEADER, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSpan {
        finished: Arc<AtomicUsize>,
    }

    impl Span for CountingSpan {
        fn context(&self) -> SpanContext {
            SpanContext {
                trace_id: "t".to_owned(),
                span_id: "s".to_owned(),
            }
        }

        fn set_tag(&self, _key: &str, _value: TagValue) {}

        fn finish(&self) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn guard_finishes_span_exactly_once() {
        let finished = Arc::new(AtomicUsize::new(0));
        let span: Arc<dyn Span> = Arc::new(CountingSpan {
            finished: finished.clone(),
        });

        {
            let _guard = SpanGuard::new(span.clone());
            assert_eq!(finished.load(Ordering::SeqCst), 0);
        }
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        // the original handle can still be used for tagging, but the guard
        // was the only finisher
        span.set_tag("k", TagValue::Bool(true));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn child_spans_share_the_parent_trace_id() {
        let tracer = W3cTracer;
        let root = tracer.start_span("root", None);
        let child = tracer.start_span("child", Some(&root.context()));

        let root_ctx = root.context();
        let child_ctx = child.context();
        assert_eq!(root_ctx.trace_id, child_ctx.trace_id);
        assert_ne!(root_ctx.span_id, child_ctx.span_id);
        assert_eq!(root_ctx.trace_id.len(), 32);
        assert_eq!(child_ctx.span_id.len(), 16);
    }

    #[test]
    fn inject_writes_a_traceparent_header() {
        let tracer = W3cTracer;
        let context = SpanContext {
            trace_id: "0123456789abcdef0123456789abcdef".to_owned(),
            span_id: "0123456789abcdef".to_owned(),
        };

        let mut headers = HeaderMap::new();
        tracer.inject(&context, &mut headers);

        assert_eq!(
            headers.get(TRACEPARENT_HEADER).unwrap(),
            "00-0123456789abcdef0123456789abcdef-0123456789abcdef-01"
        );
    }

    #[test]
    fn noop_tracer_injects_nothing() {
        let tracer = NoopTracer;
        let span = tracer.start_span("whatever", None);
        let mut headers = HeaderMap::new();
        tracer.inject(&span.context(), &mut headers);
        assert!(headers.is_empty());
    }
}
