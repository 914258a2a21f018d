//! A set of workers sharing one database, plus a lease reaper.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info_span, warn};

use super::recovery::{RecoveryMode, recover};
use super::worker::{Worker, WorkerConfig};
use crate::db::Db;

/// Running workers and the shutdown signal they share.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawn `count` workers and a reaper that releases expired leases
    /// once per lease period.
    pub fn start(db: Db, config: WorkerConfig, count: usize) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(count + 1);

        for index in 1..=count {
            let worker = Worker::new(db.clone(), config.clone(), rx.clone());
            let span = info_span!("worker", worker.id = %worker.id(), worker.index = index);
            handles.push(tokio::spawn(worker.run().instrument(span)));
        }

        let reaper = reap_expired_leases(db, config.lease, rx);
        handles.push(tokio::spawn(reaper.instrument(info_span!("lease_reaper"))));

        Self { handles, shutdown }
    }

    /// Ask every worker to stop after its current job.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for all workers to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("worker task failed: {e}");
            }
        }
    }
}

async fn reap_expired_leases(db: Db, period: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("lease reaper stopping");
                    return;
                }
            }
            _ = tokio::time::sleep(period) => {
                if let Err(e) = recover(&db, RecoveryMode::ExpiredLeases).await {
                    warn!(error = %e, "lease reaper pass failed");
                }
            }
        }
    }
}
