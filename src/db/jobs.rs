//! Job store operations: insert, atomic claim, lease-guarded outcome writes,
//! DLQ requeue, operator queries, and crash recovery.
//!
//! Every operation is a single statement, so each is atomic on its own.
//! Nothing spans claim, execution and outcome: commands can run for as
//! long as they like without holding a database lock.

use chrono::{DateTime, Datelike, Utc};
use opentelemetry::KeyValue;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::*;
use crate::telemetry::metrics;

const JOB_COLUMNS: &str = "id, command, state, attempts, max_retries, created_at, updated_at, \
                           run_at, worker_id, lease_until, last_error";

fn record_transition(from: State, to: State, count: u64) {
    if count == 0 {
        return;
    }
    metrics::job_state_transitions().add(
        count,
        &[
            KeyValue::new("from", from.as_str()),
            KeyValue::new("to", to.as_str()),
        ],
    );
}

/// `now + duration`, rejecting deadlines past year 9999.
///
/// Lease expiry is compared as RFC 3339 text, which only orders correctly
/// for four-digit years.
fn deadline(now: DateTime<Utc>, duration: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .filter(|at| at.year() <= 9999)
        .ok_or_else(|| Error::Other(format!("duration out of range: {duration:?}")))
}

impl super::Db {
    /// Validate a submission and insert it as a pending job.
    ///
    /// `default_max_retries` applies when the submission doesn't set its own.
    pub async fn submit(&self, new: NewJob, default_max_retries: u32) -> Result<Job> {
        let (id, max_retries) = match new.validate(default_max_retries) {
            Ok(resolved) => resolved,
            Err(e) => {
                metrics::jobs_submitted().add(1, &[KeyValue::new("result", "invalid")]);
                return Err(e);
            }
        };
        self.insert_job(&id, &new.command, max_retries).await
    }

    /// Insert a new pending job with zero attempts.
    ///
    /// Fails with [`Error::DuplicateJob`] if the id is taken; the existing
    /// row is left untouched.
    pub async fn insert_job(&self, id: &JobId, command: &str, max_retries: u32) -> Result<Job> {
        let now = Utc::now();
        let inserted = sqlx::query(
            "INSERT INTO jobs (id, command, state, attempts, max_retries, created_at, updated_at, run_at)
             VALUES (?, ?, 'pending', 0, ?, ?, ?, ?)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(id.as_str())
        .bind(command)
        .bind(i64::from(max_retries))
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            metrics::jobs_submitted().add(1, &[KeyValue::new("result", "duplicate")]);
            return Err(Error::DuplicateJob(id.to_string()));
        }

        metrics::jobs_submitted().add(1, &[KeyValue::new("result", "ok")]);
        self.get_job(id).await
    }

    /// Claim the oldest eligible pending job for `worker`.
    ///
    /// Selection and the pending → processing write are one conditional
    /// statement; the row comes back only if this statement is the one that
    /// flipped it. `None` covers both an empty queue and a lost race.
    pub async fn claim_oldest_pending(
        &self,
        worker: &WorkerId,
        lease: Duration,
    ) -> Result<Option<Job>> {
        let now = Utc::now();
        let lease_until = deadline(now, lease)?;

        let row: Option<JobRow> = sqlx::query_as(&format!(
            "UPDATE jobs SET state = 'processing', updated_at = ?, worker_id = ?, lease_until = ?
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE state = 'pending' AND run_at <= ?
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT 1
             )
             AND state = 'pending'
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now)
        .bind(worker.0.to_string())
        .bind(lease_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        metrics::job_claims().add(
            1,
            &[KeyValue::new(
                "result",
                if row.is_some() { "claimed" } else { "empty" },
            )],
        );

        match row {
            Some(row) => {
                record_transition(State::Pending, State::Processing, 1);
                row.try_into_job().map(Some)
            }
            None => Ok(None),
        }
    }

    /// Extend the lease `worker` holds on a processing job.
    pub async fn renew_lease(
        &self,
        id: &JobId,
        worker: &WorkerId,
        lease: Duration,
    ) -> Result<DateTime<Utc>> {
        let lease_until = deadline(Utc::now(), lease)?;
        let renewed = sqlx::query(
            "UPDATE jobs SET lease_until = ?
             WHERE id = ? AND state = 'processing' AND worker_id = ?",
        )
        .bind(lease_until)
        .bind(id.as_str())
        .bind(worker.0.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if renewed == 0 {
            return Err(self.lease_error(id).await);
        }
        Ok(lease_until)
    }

    /// Processing → Completed. A job that is already completed is left as is.
    pub async fn mark_completed(&self, id: &JobId, worker: &WorkerId) -> Result<()> {
        let now = Utc::now();
        let updated = sqlx::query(
            "UPDATE jobs SET state = 'completed', updated_at = ?, worker_id = NULL,
                 lease_until = NULL, last_error = NULL
             WHERE id = ? AND state = 'processing' AND worker_id = ?",
        )
        .bind(now)
        .bind(id.as_str())
        .bind(worker.0.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return match self.get_job(id).await {
                Ok(job) if job.state == State::Completed => Ok(()),
                Ok(_) => Err(Error::LeaseLost(id.to_string())),
                Err(e) => Err(e),
            };
        }
        record_transition(State::Processing, State::Completed, 1);
        Ok(())
    }

    /// Processing → Pending after a failed attempt, eligible again at `run_at`.
    pub async fn mark_retry(
        &self,
        id: &JobId,
        worker: &WorkerId,
        attempts: u32,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE jobs SET state = 'pending', attempts = ?, run_at = ?, updated_at = ?,
                 worker_id = NULL, lease_until = NULL, last_error = ?
             WHERE id = ? AND state = 'processing' AND worker_id = ?",
        )
        .bind(i64::from(attempts))
        .bind(run_at)
        .bind(Utc::now())
        .bind(error)
        .bind(id.as_str())
        .bind(worker.0.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(self.lease_error(id).await);
        }
        record_transition(State::Processing, State::Pending, 1);
        Ok(())
    }

    /// Processing → Dead once the failed-attempt ceiling is reached.
    pub async fn mark_dead(
        &self,
        id: &JobId,
        worker: &WorkerId,
        attempts: u32,
        error: &str,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE jobs SET state = 'dead', attempts = ?, updated_at = ?,
                 worker_id = NULL, lease_until = NULL, last_error = ?
             WHERE id = ? AND state = 'processing' AND worker_id = ?",
        )
        .bind(i64::from(attempts))
        .bind(Utc::now())
        .bind(error)
        .bind(id.as_str())
        .bind(worker.0.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(self.lease_error(id).await);
        }
        record_transition(State::Processing, State::Dead, 1);
        Ok(())
    }

    /// Dead → Pending with attempts reset to zero, eligible immediately.
    pub async fn requeue_dead(&self, id: &JobId) -> Result<Job> {
        let now = Utc::now();
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "UPDATE jobs SET state = 'pending', attempts = 0, run_at = ?, updated_at = ?,
                 last_error = NULL
             WHERE id = ? AND state = 'dead'
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now)
        .bind(now)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                record_transition(State::Dead, State::Pending, 1);
                row.try_into_job()
            }
            None => {
                let job = self.get_job(id).await?;
                Err(Error::NotInDlq {
                    id: id.to_string(),
                    state: job.state,
                })
            }
        }
    }

    /// Get a job by id.
    pub async fn get_job(&self, id: &JobId) -> Result<Job> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| Error::NotFound(id.to_string()))?
            .try_into_job()
    }

    /// List jobs, oldest first, optionally only those in `state`.
    pub async fn list_jobs(&self, state: Option<State>) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = match state {
            Some(state) => {
                sqlx::query_as(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE state = ?
                     ORDER BY created_at ASC, rowid ASC"
                ))
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at ASC, rowid ASC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(JobRow::try_into_job).collect()
    }

    /// Number of jobs in each state, every state included.
    pub async fn counts_by_state(&self) -> Result<Vec<(State, u64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await?;

        let mut counts: Vec<(State, u64)> = State::ALL.iter().map(|s| (*s, 0)).collect();
        for (state, n) in rows {
            let state: State = state.parse()?;
            if let Some(entry) = counts.iter_mut().find(|(s, _)| *s == state) {
                entry.1 = u64::try_from(n).unwrap_or(0);
            }
        }
        Ok(counts)
    }

    /// Move every processing job back to pending, attempts unchanged.
    ///
    /// Only safe when no worker is alive: a live worker's job would be
    /// released and could run twice.
    pub async fn reset_stuck_processing(&self) -> Result<u64> {
        let released = sqlx::query(
            "UPDATE jobs SET state = 'pending', updated_at = ?, worker_id = NULL, lease_until = NULL
             WHERE state = 'processing'",
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        record_transition(State::Processing, State::Pending, released);
        Ok(released)
    }

    /// Move processing jobs whose lease has expired back to pending,
    /// attempts unchanged. Jobs under a live, heartbeating lease are kept.
    pub async fn reclaim_expired_leases(&self) -> Result<u64> {
        let now = Utc::now();
        let released = sqlx::query(
            "UPDATE jobs SET state = 'pending', updated_at = ?, worker_id = NULL, lease_until = NULL
             WHERE state = 'processing' AND (lease_until IS NULL OR lease_until <= ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        record_transition(State::Processing, State::Pending, released);
        Ok(released)
    }

    /// Explain why a lease-guarded write touched no row.
    async fn lease_error(&self, id: &JobId) -> Error {
        match self.get_job(id).await {
            Ok(_) => Error::LeaseLost(id.to_string()),
            Err(e) => e,
        }
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: String,
    attempts: i64,
    max_retries: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    run_at: DateTime<Utc>,
    worker_id: Option<String>,
    lease_until: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl JobRow {
    fn try_into_job(self) -> Result<Job> {
        let count = |n: i64, column: &str| {
            u32::try_from(n)
                .map_err(|_| Error::Other(format!("job {}: bad {column} value {n}", self.id)))
        };
        Ok(Job {
            attempts: count(self.attempts, "attempts")?,
            max_retries: count(self.max_retries, "max_retries")?,
            state: self.state.parse()?,
            id: JobId(self.id),
            command: self.command,
            created_at: self.created_at,
            updated_at: self.updated_at,
            run_at: self.run_at,
            worker_id: self.worker_id,
            lease_until: self.lease_until,
            last_error: self.last_error,
        })
    }
}
