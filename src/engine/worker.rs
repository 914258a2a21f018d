//! Worker loop: claim → execute → complete, retry, or dead-letter.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{Instrument, Span, debug, error, info, trace, warn};

use super::executor::{ExecutionFailure, check_status, shell};
use super::retry::RetryPolicy;
use crate::config::Settings;
use crate::db::Db;
use crate::error::Result;
use crate::model::{Job, JobId, WorkerId};
use crate::telemetry::job::{record_attempt, record_state_transition, start_job_span};
use crate::telemetry::metrics;

const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

/// Configuration for a worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Idle wait when no job is claimable or the store errored.
    pub poll_interval: Duration,
    /// Processing lease; renewed every third of its length while running.
    pub lease: Duration,
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl WorkerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            lease: settings.lease(),
            retry: settings.retry_policy(),
        }
    }
}

/// What a worker did with a job after running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Completed,
    /// Back to pending, claimable from `run_at`.
    Retried {
        attempts: u32,
        run_at: DateTime<Utc>,
    },
    /// Moved to the DLQ.
    Dead { attempts: u32 },
}

/// Result of one claim-execute-apply cycle.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: JobId,
    pub disposition: Disposition,
    pub duration_ms: u64,
}

/// A single job-processing loop. Runs one job at a time.
pub struct Worker {
    id: WorkerId,
    db: Db,
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    /// Create a worker; it stops once `shutdown` carries `true`.
    pub fn new(db: Db, config: WorkerConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            id: WorkerId::new(),
            db,
            config,
            shutdown,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Process jobs until shutdown.
    ///
    /// Store errors never end the loop; they are logged and the worker
    /// tries again on the next tick. An in-flight job is always finished
    /// before shutdown is honoured.
    pub async fn run(mut self) {
        info!(worker = %self.id, "worker started");

        while !*self.shutdown.borrow() {
            let idle = match self.run_once().await {
                Ok(Some(_)) => false,
                Ok(None) => {
                    trace!("no claimable job, polling again in {:?}", self.config.poll_interval);
                    true
                }
                Err(e) => {
                    warn!(worker = %self.id, error = %e, "job store error, retrying next tick");
                    true
                }
            };

            if idle {
                tokio::select! {
                    changed = self.shutdown.changed() => {
                        if changed.is_err() {
                            // sender gone: nobody can ask us to stop any more
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!(worker = %self.id, "worker stopped");
    }

    /// Claim and run one job, if one is claimable.
    ///
    /// Returns `Ok(None)` when nothing was claimed.
    pub async fn run_once(&self) -> Result<Option<JobReport>> {
        let Some(job) = self
            .db
            .claim_oldest_pending(&self.id, self.config.lease)
            .await?
        else {
            return Ok(None);
        };

        let span = start_job_span(&job.id, &self.id);
        record_attempt(&span, job.attempts.saturating_add(1));
        record_state_transition(&span, "pending", "processing");

        async {
            info!(command = %job.command, "executing job");
            let start = Instant::now();
            let outcome = self.execute(&job).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            metrics::job_execution_duration_ms().record(
                duration_ms as f64,
                &[KeyValue::new(
                    "result",
                    if outcome.is_ok() { "success" } else { "failure" },
                )],
            );

            let disposition = self.apply(&job, outcome, &span).await?;
            Ok(Some(JobReport {
                job_id: job.id.clone(),
                disposition,
                duration_ms,
            }))
        }
        .instrument(span.clone())
        .await
    }

    /// Run the job's command to completion, renewing the lease meanwhile.
    async fn execute(&self, job: &Job) -> std::result::Result<(), ExecutionFailure> {
        let mut child = shell(&job.command)
            .spawn()
            .map_err(|e| ExecutionFailure::Launch(e.to_string()))?;

        let mut heartbeat = tokio::time::interval((self.config.lease / 3).max(MIN_HEARTBEAT));
        heartbeat.tick().await; // first tick fires immediately

        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                _ = heartbeat.tick() => {
                    match self.db.renew_lease(&job.id, &self.id, self.config.lease).await {
                        Ok(until) => debug!(lease_until = %until, "lease renewed"),
                        Err(e) => warn!(error = %e, "lease renewal failed"),
                    }
                }
            }
        };

        let status = status.map_err(|e| ExecutionFailure::Wait(e.to_string()))?;
        check_status(status)
    }

    /// Write the attempt's outcome back to the store.
    async fn apply(
        &self,
        job: &Job,
        outcome: std::result::Result<(), ExecutionFailure>,
        span: &Span,
    ) -> Result<Disposition> {
        let failure = match outcome {
            Ok(()) => {
                self.db.mark_completed(&job.id, &self.id).await?;
                record_state_transition(span, "processing", "completed");
                info!("job completed");
                return Ok(Disposition::Completed);
            }
            Err(failure) => failure,
        };

        record_state_transition(span, "processing", "failed");
        let attempts = job.attempts.saturating_add(1);
        let error = failure.to_string();

        if attempts >= job.max_retries {
            self.db
                .mark_dead(&job.id, &self.id, attempts, &error)
                .await
                .inspect_err(|e| error!(error = %e, "failed to dead-letter job"))?;
            record_state_transition(span, "failed", "dead");
            warn!(
                attempts,
                max_retries = job.max_retries,
                %error,
                "job failed permanently, moved to DLQ"
            );
            return Ok(Disposition::Dead { attempts });
        }

        let delay = self.config.retry.delay(attempts);
        let run_at = self.config.retry.retry_at(attempts, Utc::now());
        self.db
            .mark_retry(&job.id, &self.id, attempts, run_at, &error)
            .await
            .inspect_err(|e| error!(error = %e, "failed to schedule retry"))?;
        record_state_transition(span, "failed", "pending");
        warn!(
            attempts,
            max_retries = job.max_retries,
            %error,
            "job failed, retrying in {delay:?}"
        );
        Ok(Disposition::Retried { attempts, run_at })
    }
}
