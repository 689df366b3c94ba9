//! Supervisor binary: parses the job table, runs one pool per job, and on
//! SIGINT performs the bounded graceful shutdown from `cmd/supd/main.go`'s
//! `main` (500 ms poll, 10 s deadline).

use std::time::Duration;

use anyhow::{Context, Result};

use supervisor::cli::Opts;
use supervisor::config::Conf;
use supervisor::logger;
use supervisor::pool::WorkerPool;

const SHUTDOWN_POLL: Duration = Duration::from_millis(500);
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::read();

    let conf = Conf::read(&opts.conf)
        .await
        .with_context(|| format!("failed to read config from {:?}", opts.conf))?;

    logger::init_tracing(&conf.log_level, opts.pretty).context("failed to init tracing")?;

    let pools: Vec<_> = conf.workers.iter().map(|job| WorkerPool::new(job.clone())).collect();
    for pool in &pools {
        pool.run().await;
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("pools stopping");

    for pool in &pools {
        pool.quit().await;
    }

    let deadline = tokio::time::Instant::now() + SHUTDOWN_DEADLINE;
    let mut ticker = tokio::time::interval(SHUTDOWN_POLL);
    loop {
        ticker.tick().await;

        let mut total = 0;
        for pool in &pools {
            total += pool.size().await;
        }
        if total == 0 || tokio::time::Instant::now() >= deadline {
            break;
        }
    }

    tracing::info!("pools stopped");
    Ok(())
}
