//! Diagnostics context handed to a pool at creation.

use tracing::Span;

/// Where a pool reports what it does.
///
/// Every event the pool, its provider helpers and the built-in cleanup handlers
/// emit is parented to this span, so callers can route a pool's diagnostics
/// (e.g. tag them with the request that owns the pool) without any global state.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    span: Span,
}

impl Diagnostics {
    /// A context named `name`, e.g. the request or connection the pool belongs to.
    pub fn new(name: &str) -> Self {
        Self {
            span: tracing::debug_span!("pool", name),
        }
    }

    /// Events are still emitted, but attached to no parent span.
    pub fn disabled() -> Self {
        Self { span: Span::none() }
    }

    /// Uses an existing span as the parent of every event.
    pub fn from_span(span: Span) -> Self {
        Self { span }
    }

    #[inline]
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for Diagnostics {
    /// Inherits whatever span is current where the pool is created.
    fn default() -> Self {
        Self::from_span(Span::current())
    }
}
