//! Archive-tracing boundary.
//!
//! A parallel, independently rooted span tree specific to HTTP-archive
//! recording. Archive spans propagate through their own header format and
//! accept the completed [`Entry`](crate::har::Entry) of each exchange, so a
//! downstream collector can assemble a full HAR document per trace.

use crate::har::Entry;
use http::{HeaderMap, HeaderValue};
use rand::Rng;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Header used to propagate archive-trace context.
pub const HAR_TRACE_HEADER: &str = "x-har-trace-id";

/// The propagatable identity of an archive span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarSpanContext {
    pub trace_id: String,
    pub span_id: String,
}

impl HarSpanContext {
    /// Wire encoding used in the propagation header.
    pub fn encode(&self) -> String {
        format!("{}:{}", self.trace_id, self.span_id)
    }
}

impl fmt::Display for HarSpanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// An archive-tracing span: a correlated container for recorded entries.
pub trait HarSpan: Send + Sync {
    /// Identifier used to cross-reference this span from the generic trace.
    fn id(&self) -> String;
    fn context(&self) -> HarSpanContext;
    /// Attaches a completed archive entry to this span.
    fn add_entry(&self, entry: &Entry);
    fn finish(&self);
}

/// An archive-tracing back-end.
pub trait HarTracer: Send + Sync {
    /// Starts a span, as a child of `parent` when one is given.
    fn start_span(&self, parent: Option<&HarSpanContext>) -> Arc<dyn HarSpan>;
    /// Encodes a span's identity into the outbound header set using the
    /// archive tracer's own header format.
    fn inject(&self, context: &HarSpanContext, headers: &mut HeaderMap);
}

/// Finishes the wrapped archive span when dropped.
pub struct HarSpanGuard {
    span: Arc<dyn HarSpan>,
}

impl HarSpanGuard {
    pub fn new(span: Arc<dyn HarSpan>) -> Self {
        Self { span }
    }
}

impl Drop for HarSpanGuard {
    fn drop(&mut self) {
        self.span.finish();
    }
}

/// Archive tracer that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHarTracer;

struct NoopHarSpan;

impl HarSpan for NoopHarSpan {
    fn id(&self) -> String {
        String::new()
    }

    fn context(&self) -> HarSpanContext {
        HarSpanContext {
            trace_id: String::new(),
            span_id: String::new(),
        }
    }

    fn add_entry(&self, _entry: &Entry) {}

    fn finish(&self) {}
}

impl HarTracer for NoopHarTracer {
    fn start_span(&self, _parent: Option<&HarSpanContext>) -> Arc<dyn HarSpan> {
        Arc::new(NoopHarSpan)
    }

    fn inject(&self, _context: &HarSpanContext, _headers: &mut HeaderMap) {}
}

/// Archive tracer that accumulates attached entries in memory.
///
/// Useful for callers that persist a HAR file at the end of a run, and as a
/// test double. Clones share the same entry store.
#[derive(Clone, Default)]
pub struct InMemoryHarTracer {
    entries: Arc<Mutex<Vec<Entry>>>,
}

struct InMemoryHarSpan {
    context: HarSpanContext,
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl InMemoryHarTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries attached so far, in attachment order.
    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().expect("har entry store poisoned").clone()
    }
}

impl HarSpan for InMemoryHarSpan {
    fn id(&self) -> String {
        self.context.encode()
    }

    fn context(&self) -> HarSpanContext {
        self.context.clone()
    }

    fn add_entry(&self, entry: &Entry) {
        self.entries
            .lock()
            .expect("har entry store poisoned")
            .push(entry.clone());
    }

    fn finish(&self) {
        tracing::trace!(span_id = %self.context.span_id, "har span finished");
    }
}

impl HarTracer for InMemoryHarTracer {
    fn start_span(&self, parent: Option<&HarSpanContext>) -> Arc<dyn HarSpan> {
        let trace_id = match parent {
            Some(parent) => parent.trace_id.clone(),
            None => format!("{:024x}", rand::thread_rng().gen::<u128>() >> 32),
        };
        let span_id = format!("{:016x}", rand::thread_rng().gen::<u64>());
        Arc::new(InMemoryHarSpan {
            context: HarSpanContext { trace_id, span_id },
            entries: self.entries.clone(),
        })
    }

    fn inject(&self, context: &HarSpanContext, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&context.encode()) {
            headers.insert(HAR_TRACE_HEADER, value);
        }
    }
}
