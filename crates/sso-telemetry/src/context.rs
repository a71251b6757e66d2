//! Per-request tracing context, for correlating the log lines a single
//! RPC call (or plugin session operation) produces.

use tracing::Span;
use uuid::Uuid;

/// Correlates every log line emitted while handling one request.
///
/// Built once at an RPC entry point (or when Session Core dispatches a
/// request to the Plugin Host) and entered for the duration of that
/// operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: Uuid,
    component: String,
    operation: Option<String>,
}

impl RequestContext {
    /// Start a context for `component` (e.g. `"session-core"`,
    /// `"credentials-store"`).
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            component: component.into(),
            operation: None,
        }
    }

    /// Attach an operation name (e.g. `"process"`, `"cancel"`).
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// The correlation id for this request.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Build the `tracing::Span` this context describes.
    #[must_use]
    pub fn span(&self) -> Span {
        match &self.operation {
            Some(op) => tracing::info_span!("request", request_id = %self.id, component = %self.component, operation = %op),
            None => tracing::info_span!("request", request_id = %self.id, component = %self.component),
        }
    }

    /// Enter the span for the lifetime of the returned guard.
    #[must_use]
    pub fn enter(&self) -> RequestGuard {
        RequestGuard {
            _span_guard: self.span().entered(),
        }
    }
}

/// Keeps a [`RequestContext`]'s span entered until dropped.
pub struct RequestGuard {
    _span_guard: tracing::span::EnteredSpan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_operation_is_visible_on_the_built_span() {
        let ctx = RequestContext::new("session-core").with_operation("process");
        let _guard = ctx.enter();
        tracing::info!("inside request span");
    }
}
