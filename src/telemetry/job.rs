//! Job execution span helpers.
//!
//! Provides span creation and state-transition recording for jobs
//! flowing through a worker.

use tracing::Span;

use crate::model::{JobId, WorkerId};

/// Start a span for one claim-execute-apply cycle of a job.
///
/// The `job.attempt` field is declared empty and filled once the job
/// is claimed and its attempt count is known.
pub fn start_job_span(job_id: &JobId, worker_id: &WorkerId) -> Span {
    tracing::info_span!(
        "job.execute",
        "job.id" = %job_id,
        "worker.id" = %worker_id,
        "job.attempt" = tracing::field::Empty,
    )
}

/// Record the 1-based attempt number being executed.
pub fn record_attempt(span: &Span, attempt: u32) {
    span.record("job.attempt", attempt);
}

/// Record a state transition event on the given span.
///
/// `failed` is a valid label here even though it is never stored.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
