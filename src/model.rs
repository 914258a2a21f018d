//! Core data model.
//!
//! A job is a shell command identified by a caller-supplied key. It moves
//! through `pending → processing → {completed | pending | dead}`; operators
//! can move a dead job back to pending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A shell-command job tracked by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Caller-supplied unique key.
    pub id: JobId,

    /// Shell command line, run through the platform shell.
    pub command: String,

    /// Current lifecycle state.
    pub state: State,

    /// Number of attempts that have failed so far.
    pub attempts: u32,

    /// Failed-attempt ceiling. Reaching it moves the job to the DLQ.
    pub max_retries: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Not-before timestamp. A pending job is only claimable once this passes.
    pub run_at: DateTime<Utc>,

    /// Lease holder while processing.
    pub worker_id: Option<String>,

    /// Lease expiry while processing.
    pub lease_until: Option<DateTime<Utc>>,

    /// Description of the most recent failed attempt.
    pub last_error: Option<String>,
}

/// Newtype for job keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Worker identity
// ---------------------------------------------------------------------------

/// Identity of a worker, recorded as the lease owner of the job it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Persisted lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Waiting for a worker (possibly not before `run_at`).
    Pending,
    /// Claimed by a worker holding a lease.
    Processing,
    /// Exited zero. Terminal.
    Completed,
    /// Exhausted retries. Sits in the DLQ until requeued.
    Dead,
}

impl State {
    pub const ALL: [State; 4] = [
        State::Pending,
        State::Processing,
        State::Completed,
        State::Dead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::Processing => "processing",
            State::Completed => "completed",
            State::Dead => "dead",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for State {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(State::Pending),
            "processing" => Ok(State::Processing),
            "completed" => Ok(State::Completed),
            "dead" => Ok(State::Dead),
            _ => Err(Error::Other(format!("unknown state: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// A job submission. Deserializes from `{"id", "command", "max_retries"?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub(crate) id: String,
    pub(crate) command: String,
    #[serde(default, deserialize_with = "count_or_numeric_string")]
    pub(crate) max_retries: Option<u32>,
}

/// Accept `3` as well as `"3"` for an optional count.
fn count_or_numeric_string<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u32),
        Text(String),
    }

    match Option::<Count>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Count::Number(n)) => Ok(Some(n)),
        Some(Count::Text(text)) => text.trim().parse().map(Some).map_err(|_| {
            serde::de::Error::custom(format!(
                "max_retries must be a non-negative integer, got \"{text}\""
            ))
        }),
    }
}

impl NewJob {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            max_retries: None,
        }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Parse a JSON submission.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidJob(format!("bad job JSON: {e}")))
    }

    /// Check required fields and resolve `max_retries` against the default.
    pub(crate) fn validate(&self, default_max_retries: u32) -> Result<(JobId, u32)> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidJob("'id' is required".to_string()));
        }
        if self.command.trim().is_empty() {
            return Err(Error::InvalidJob("'command' is required".to_string()));
        }
        let max_retries = self.max_retries.unwrap_or(default_max_retries);
        if max_retries == 0 {
            return Err(Error::InvalidJob("'max_retries' must be at least 1".to_string()));
        }
        Ok((JobId(self.id.clone()), max_retries))
    }
}
