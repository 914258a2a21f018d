//! Crash recovery: release processing jobs left behind by dead workers.
//!
//! Every processing row carries a lease that its worker renews while the
//! command runs. A lease that has run out belongs to a worker that crashed
//! or was killed, so its job can safely go back to pending.

use opentelemetry::KeyValue;
use tracing::{debug, warn};

use crate::db::Db;
use crate::error::Result;
use crate::telemetry::metrics;

/// Which processing jobs recovery may release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryMode {
    /// Only jobs whose lease has expired. Safe while workers are running.
    #[default]
    ExpiredLeases,
    /// Every processing job. Only correct when no worker is alive.
    All,
}

impl std::fmt::Display for RecoveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecoveryMode::ExpiredLeases => "expired_leases",
            RecoveryMode::All => "all",
        };
        write!(f, "{s}")
    }
}

/// Move orphaned processing jobs back to pending. Attempts are unchanged.
///
/// Returns how many jobs were released.
pub async fn recover(db: &Db, mode: RecoveryMode) -> Result<u64> {
    let released = match mode {
        RecoveryMode::ExpiredLeases => db.reclaim_expired_leases().await?,
        RecoveryMode::All => db.reset_stuck_processing().await?,
    };

    metrics::jobs_recovered().add(released, &[KeyValue::new("mode", mode.to_string())]);
    if released > 0 {
        warn!(released, %mode, "released orphaned processing jobs");
    } else {
        debug!(%mode, "no orphaned processing jobs");
    }
    Ok(released)
}
