//! Lifecycle engine: claim a job, run its command, write the outcome back.
//!
//! Workers coordinate only through the job store. Any number of them, in
//! one process or many, can share a database.

pub mod executor;
pub mod pool;
pub mod recovery;
pub mod retry;
pub mod worker;

pub use executor::ExecutionFailure;
pub use pool::WorkerPool;
pub use recovery::{RecoveryMode, recover};
pub use retry::RetryPolicy;
pub use worker::{Disposition, JobReport, Worker, WorkerConfig};
