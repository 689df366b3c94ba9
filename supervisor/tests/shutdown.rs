//! Scenarios 4 and 5 from spec.md §8: steady-state restart and
//! SIGTERM-bounded graceful shutdown, driven against the real `WorkerPool`.

use std::time::{Duration, Instant};

use supervisor::config::JobConf;
use supervisor::pool::WorkerPool;

fn job(command: &str, args: &[&str], pool_size: usize) -> JobConf {
    JobConf {
        name: "test-job".to_string(),
        command: command.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
        env: Vec::new(),
        dir: None,
        pool_size,
    }
}

#[tokio::test]
async fn restarts_exited_children_to_steady_state() {
    let pool = WorkerPool::new(job("/bin/sh", &["-c", "exit 0"], 2));
    pool.run().await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(pool.size().await, 2);
}

#[tokio::test]
async fn graceful_shutdown_waits_for_sigterm_then_exits() {
    // Ignores SIGTERM's default action briefly so we can observe the pool
    // actually deliver it, then exits once the trap runs.
    let pool = WorkerPool::new(job(
        "/bin/sh",
        &["-c", "trap 'exit 0' TERM; sleep 2 & wait"],
        1,
    ));
    pool.run().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = Instant::now();
    pool.quit().await;

    loop {
        if pool.size().await == 0 {
            break;
        }
        if start.elapsed() > Duration::from_secs(10) {
            panic!("pool did not drain within the shutdown deadline");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let elapsed = start.elapsed();
    assert!(elapsed < Duration::from_secs(10), "shutdown should not hit the hard deadline");
}
