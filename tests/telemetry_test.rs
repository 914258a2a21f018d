//! Integration tests for telemetry initialization and span helpers.

use queuectl::model::{JobId, WorkerId};
use queuectl::telemetry::job::{record_attempt, record_state_transition, start_job_span};

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process; init uses
    // try_init so a second call returns an error instead of panicking.
    let config = queuectl::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "queuectl-test".to_string(),
        log_level: "debug".to_string(),
    };
    if let Ok(guard) = queuectl::telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
    }
}

#[test]
fn job_span_records_attempt_and_transitions() {
    let span = start_job_span(&JobId::new("job-1"), &WorkerId::new());
    record_attempt(&span, 1);
    record_state_transition(&span, "pending", "processing");
    record_state_transition(&span, "processing", "failed");
    record_state_transition(&span, "failed", "pending");
}

#[test]
fn metric_instruments_build_without_a_provider() {
    use opentelemetry::KeyValue;
    use queuectl::telemetry::metrics;

    metrics::jobs_submitted().add(1, &[KeyValue::new("result", "ok")]);
    metrics::job_claims().add(1, &[KeyValue::new("result", "empty")]);
    metrics::job_execution_duration_ms().record(1.5, &[KeyValue::new("result", "success")]);
    metrics::jobs_recovered().add(0, &[KeyValue::new("mode", "all")]);
}
