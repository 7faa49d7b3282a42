//! Request dispatch span helpers.
//!
//! Provides span creation and outcome recording for requests flowing
//! through the scheduler.

use tracing::Span;

/// Start a span covering one transport call.
///
/// The `request.outcome` field is declared empty and filled by
/// [`record_outcome`].
pub fn start_dispatch_span(id: &str, priority: i32) -> Span {
    tracing::info_span!(
        "request.dispatch",
        "request.id" = id,
        "request.priority" = priority,
        "request.outcome" = tracing::field::Empty,
    )
}

/// Record a state transition event on the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::debug!(from = from, to = to, "state_transition");
    });
}

/// Record the final outcome ("completed" | "failed") on the span.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("request.outcome", outcome);
}
