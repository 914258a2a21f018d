//! Metric instrument factories for queuectl.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"queuectl"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for queuectl instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("queuectl")
}

/// Counter: jobs submitted.
/// Labels: `result` ("ok" | "duplicate" | "invalid").
pub fn jobs_submitted() -> Counter<u64> {
    meter()
        .u64_counter("queuectl.jobs.submitted")
        .with_description("Number of jobs submitted")
        .build()
}

/// Counter: claim attempts.
/// Labels: `result` ("claimed" | "empty").
pub fn job_claims() -> Counter<u64> {
    meter()
        .u64_counter("queuectl.jobs.claims")
        .with_description("Number of claim attempts against the job table")
        .build()
}

/// Counter: job state transitions.
/// Labels: `from`, `to`.
pub fn job_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("queuectl.jobs.state_transitions")
        .with_description("Number of job state transitions")
        .build()
}

/// Bucket bounds for job run time, 10ms up to one hour.
pub const EXECUTION_BUCKETS_MS: [f64; 14] = [
    10.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 30_000.0,
    60_000.0, 300_000.0, 900_000.0, 3_600_000.0,
];

/// Histogram: command execution time in milliseconds.
/// Labels: `result` ("success" | "failure").
pub fn job_execution_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("queuectl.jobs.execution.duration_ms")
        .with_description("Job command execution time in milliseconds")
        .with_unit("ms")
        .with_boundaries(EXECUTION_BUCKETS_MS.to_vec())
        .build()
}

/// Counter: processing jobs released back to pending by recovery.
/// Labels: `mode` ("expired_leases" | "all").
pub fn jobs_recovered() -> Counter<u64> {
    meter()
        .u64_counter("queuectl.jobs.recovered")
        .with_description("Number of processing jobs released by recovery")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_buckets_are_strictly_increasing() {
        assert!(EXECUTION_BUCKETS_MS.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(EXECUTION_BUCKETS_MS.last(), Some(&3_600_000.0));
    }
}
