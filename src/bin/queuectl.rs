//! queuectl CLI: submit jobs, run workers, inspect and repair the queue.

use clap::{Parser, Subcommand};
use queuectl::config::{Config, Settings, settings};
use queuectl::db::Db;
use queuectl::engine::{RecoveryMode, WorkerConfig, WorkerPool, recover};
use queuectl::model::{JobId, NewJob, State};
use queuectl::telemetry::{TelemetryConfig, init_telemetry};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "queuectl", about = "Persistent job queue for shell commands")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue a job, e.g. '{"id":"job1","command":"echo hi","max_retries":3}'
    Enqueue {
        /// Job as JSON: id, command, optional max_retries
        job: String,
    },
    /// Run workers in the foreground until Ctrl-C
    Worker {
        /// Number of concurrent workers
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Show job counts by state
    Status,
    /// List jobs, oldest first
    List {
        /// Filter by state (pending, processing, completed, dead)
        #[arg(long)]
        state: Option<String>,
    },
    /// Show a single job
    Show {
        /// Job id
        id: String,
    },
    /// Dead-letter queue operations
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },
    /// Read or change queue settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Release processing jobs held by crashed workers
    Recover {
        /// Release every processing job, not only expired leases.
        /// Only use this when no worker is running.
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum DlqAction {
    /// List dead jobs
    List,
    /// Move a dead job back to pending with attempts reset
    Retry {
        /// Job id
        id: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a setting
    Get { key: String },
    /// Change a setting
    Set { key: String, value: String },
    /// Print every setting
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "queuectl".to_string(),
        log_level: config.log_level.clone(),
    })?;

    match cli.command {
        Command::Enqueue { job } => cmd_enqueue(&config, &job).await,
        Command::Worker { count } => cmd_worker(&config, count).await,
        Command::Status => cmd_status(&config).await,
        Command::List { state } => cmd_list(&config, state).await,
        Command::Show { id } => cmd_show(&config, id).await,
        Command::Dlq { action } => match action {
            DlqAction::List => cmd_dlq_list(&config).await,
            DlqAction::Retry { id } => cmd_dlq_retry(&config, id).await,
        },
        Command::Config { action } => cmd_config(&config, action),
        Command::Recover { all } => cmd_recover(&config, all).await,
    }
}

async fn open_db(config: &Config) -> anyhow::Result<Db> {
    let db = Db::connect(&config.database_url).await?;
    db.migrate().await?;
    Ok(db)
}

async fn cmd_enqueue(config: &Config, json: &str) -> anyhow::Result<()> {
    let settings = Settings::load(&config.settings_path)?;
    let db = open_db(config).await?;

    let job = db.submit(NewJob::from_json(json)?, settings.max_retries).await?;
    println!(
        "Enqueued job '{}' (max_retries: {}): {}",
        job.id, job.max_retries, job.command
    );
    Ok(())
}

async fn cmd_worker(config: &Config, count: usize) -> anyhow::Result<()> {
    anyhow::ensure!(count > 0, "--count must be at least 1");
    let settings = Settings::load(&config.settings_path)?;
    let db = open_db(config).await?;

    recover(&db, RecoveryMode::ExpiredLeases).await?;

    let pool = WorkerPool::start(db.clone(), WorkerConfig::from_settings(&settings), count);
    info!(count, "workers running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down after in-flight jobs finish, Ctrl-C again to abandon them");
    pool.shutdown();

    tokio::select! {
        _ = pool.join() => {}
        interrupted = tokio::signal::ctrl_c() => {
            interrupted?;
            warn!("abandoning in-flight jobs; their leases expire and recovery releases them");
            return Ok(());
        }
    }
    db.close().await;
    Ok(())
}

async fn cmd_status(config: &Config) -> anyhow::Result<()> {
    let db = open_db(config).await?;
    let counts = db.counts_by_state().await?;

    println!("Job counts by state:");
    for (state, n) in &counts {
        println!("  {state:<11} {n}");
    }
    println!("  {:<11} {}", "total", counts.iter().map(|(_, n)| n).sum::<u64>());
    Ok(())
}

async fn cmd_list(config: &Config, state: Option<String>) -> anyhow::Result<()> {
    let state_filter: Option<State> = match state {
        Some(s) => Some(
            s.parse()
                .map_err(|_| anyhow::anyhow!("invalid state: {s}"))?,
        ),
        None => None,
    };

    let db = open_db(config).await?;
    let jobs = db.list_jobs(state_filter).await?;

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    println!(
        "{:<20}  {:<10}  {:<8}  {:<16}  COMMAND",
        "ID", "STATE", "ATTEMPTS", "CREATED"
    );
    println!("{}", "-".repeat(90));

    for job in &jobs {
        println!(
            "{:<20}  {:<10}  {:<8}  {:<16}  {}",
            truncate(job.id.as_str(), 20),
            job.state,
            format!("{}/{}", job.attempts, job.max_retries),
            job.created_at.format("%Y-%m-%d %H:%M"),
            truncate(&job.command, 40)
        );
    }

    println!("\n{} job(s)", jobs.len());
    Ok(())
}

async fn cmd_show(config: &Config, id: String) -> anyhow::Result<()> {
    let db = open_db(config).await?;
    let job = db.get_job(&JobId::new(id)).await?;

    println!("ID:          {}", job.id);
    println!("Command:     {}", job.command);
    println!("State:       {}", job.state);
    println!("Attempts:    {}/{}", job.attempts, job.max_retries);
    println!("Created:     {}", job.created_at);
    println!("Updated:     {}", job.updated_at);
    if job.state == State::Pending {
        println!("Run At:      {}", job.run_at);
    }
    if let Some(ref worker) = job.worker_id {
        println!("Worker:      {worker}");
    }
    if let Some(lease) = job.lease_until {
        println!("Lease Until: {lease}");
    }
    if let Some(ref err) = job.last_error {
        println!("Last Error:  {err}");
    }
    Ok(())
}

async fn cmd_dlq_list(config: &Config) -> anyhow::Result<()> {
    let db = open_db(config).await?;
    let jobs = db.list_jobs(Some(State::Dead)).await?;

    if jobs.is_empty() {
        println!("DLQ is empty.");
        return Ok(());
    }

    for job in &jobs {
        println!(
            "- id={} attempts={} updated_at={} error={} command={}",
            job.id,
            job.attempts,
            job.updated_at.format("%Y-%m-%d %H:%M:%S"),
            job.last_error.as_deref().unwrap_or("-"),
            job.command
        );
    }
    Ok(())
}

async fn cmd_dlq_retry(config: &Config, id: String) -> anyhow::Result<()> {
    let db = open_db(config).await?;
    let job = db.requeue_dead(&JobId::new(id)).await?;
    println!("Job {} reset to pending for retry.", job.id);
    Ok(())
}

fn cmd_config(config: &Config, action: ConfigAction) -> anyhow::Result<()> {
    let path = &config.settings_path;
    let mut current = Settings::load(path)?;

    match action {
        ConfigAction::Get { key } => {
            println!("{key} = {}", current.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            current.set(&key, &value)?;
            current.save(path)?;
            println!("Config set: {key} = {}", current.get(&key)?);
        }
        ConfigAction::List => {
            for key in settings::KEYS {
                println!("{key} = {}", current.get(key)?);
            }
        }
    }
    Ok(())
}

async fn cmd_recover(config: &Config, all: bool) -> anyhow::Result<()> {
    let mode = if all {
        RecoveryMode::All
    } else {
        RecoveryMode::ExpiredLeases
    };
    let db = open_db(config).await?;
    let released = recover(&db, mode).await?;
    println!("Released {released} processing job(s) back to pending.");
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
