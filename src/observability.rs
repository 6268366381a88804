//! Trace identifiers for lifecycle spans
//!
//! Every provider call opens one `lifecycle` span tagged with a fresh trace
//! id, the step name and the node it talks to. Once the operation is
//! injected its hash is recorded on the same span, so a log consumer can
//! join the prepare, inject and confirm lines of one call.

use std::fmt;
use tracing::field;
use uuid::Uuid;

/// Identifier shared by every log line of one provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(Uuid);

impl TraceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable
        write!(f, "{}", &self.0.simple().to_string()[..16])
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleTrace {
    trace_id: TraceId,
    step: &'static str,
    node: String,
}

impl LifecycleTrace {
    pub fn new(step: &'static str, node: impl Into<String>) -> Self {
        Self {
            trace_id: TraceId::new(),
            step,
            node: node.into(),
        }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn step(&self) -> &'static str {
        self.step
    }

    /// Span for the whole call; `hash` is filled by [`LifecycleTrace::record_hash`]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "lifecycle",
            step = self.step,
            trace_id = %self.trace_id,
            node = %self.node,
            hash = field::Empty,
        )
    }

    pub fn record_hash(span: &tracing::Span, hash: &str) {
        span.record("hash", hash);
    }
}
