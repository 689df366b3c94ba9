//! One supervised child process. Grounded on `cmd/supd/main.go`'s `Worker`
//! and `Worker.run`: a streaming child runner plus a task that turns a
//! single quit signal into `Stop(child)`, logging `{start, stop, runtime,
//! complete, exit, pid}` on completion.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{oneshot, Notify};

use crate::config::JobConf;

/// Handle a [`crate::pool::WorkerPool`] keeps for one running child: a
/// one-shot quit signal (`quitC`) and a completion signal (`doneC`),
/// matching spec.md §3's `Worker` lifecycle fields. `done` is an `Arc<Notify>`
/// rather than a one-shot channel so both the pool's bookkeeping entry and
/// its monitor task can observe completion without either consuming it.
pub struct WorkerHandle {
    pub label: usize,
    quit_tx: Option<oneshot::Sender<()>>,
    pub(crate) done: Arc<Notify>,
}

impl WorkerHandle {
    /// Signals the child runner to stop. Safe to call at most once; a
    /// second call is a silent no-op (the channel is already consumed).
    pub fn quit(&mut self) {
        if let Some(tx) = self.quit_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Spawns the child process and its two cooperative tasks (runner, output
/// drain are folded into one task here since `tokio::process::Child`
/// naturally exposes both pipes side by side). Returns immediately with a
/// handle; the process itself runs in a detached task.
pub fn spawn(conf: JobConf, label: usize) -> WorkerHandle {
    let (quit_tx, quit_rx) = oneshot::channel();
    let done = Arc::new(Notify::new());

    tokio::spawn(run(conf, label, quit_rx, done.clone()));

    WorkerHandle {
        label,
        quit_tx: Some(quit_tx),
        done,
    }
}

async fn run(conf: JobConf, label: usize, quit_rx: oneshot::Receiver<()>, done: Arc<Notify>) {
    tracing::info!(job = %conf.name, worker = label, "starting");

    let start = Instant::now();
    let start_ts = unix_now();

    let mut command = Command::new(&conf.command);
    command
        .args(&conf.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for kv in &conf.env {
        if let Some((k, v)) = kv.split_once('=') {
            command.env(k, v);
        }
    }
    if let Some(dir) = &conf.dir {
        command.current_dir(dir);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::error!(job = %conf.name, worker = label, %err, "failed to spawn");
            done.notify_one();
            return;
        }
    };

    let pid = child.id();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let job_name = conf.name.clone();
    let stop_job_name = job_name.clone();
    let stopper = tokio::spawn(async move {
        if quit_rx.await.is_ok() {
            if let Some(pid) = pid {
                // SIGTERM first, matching `cmd.Stop()`'s graceful-then-abandon
                // behavior in the original source; `kill_on_drop` is the
                // final backstop if the process ignores it.
                unsafe {
                    if libc::kill(pid as libc::pid_t, libc::SIGTERM) != 0 {
                        tracing::error!(job = %stop_job_name, worker = label, "failed to send SIGTERM");
                    }
                }
            }
        }
    });

    let drain = tokio::spawn(async move {
        let mut out_lines = stdout.map(|s| BufReader::new(s).lines());
        let mut err_lines = stderr.map(|s| BufReader::new(s).lines());

        loop {
            let out_done = out_lines.is_none();
            let err_done = err_lines.is_none();
            if out_done && err_done {
                break;
            }

            tokio::select! {
                line = next_line(&mut out_lines), if !out_done => {
                    match line {
                        Some(line) => tracing::info!(job = %job_name, worker = label, "{line}"),
                        None => out_lines = None,
                    }
                }
                line = next_line(&mut err_lines), if !err_done => {
                    match line {
                        Some(line) => tracing::error!(job = %job_name, worker = label, "{line}"),
                        None => err_lines = None,
                    }
                }
            }
        }
    });

    let status = child.wait().await;
    let _ = drain.await;
    stopper.abort();

    let runtime = start.elapsed();
    let stop_ts = unix_now();

    match status {
        Ok(status) => {
            tracing::info!(
                job = %conf.name,
                worker = label,
                start = start_ts,
                stop = stop_ts,
                runtime = runtime.as_secs_f64(),
                complete = true,
                exit = status.code().unwrap_or(-1),
                pid = pid.unwrap_or(0),
                "stopped",
            );
        }
        Err(err) => {
            tracing::error!(
                job = %conf.name,
                worker = label,
                start = start_ts,
                stop = stop_ts,
                runtime = runtime.as_secs_f64(),
                complete = false,
                pid = pid.unwrap_or(0),
                %err,
                "failure",
            );
        }
    }

    done.notify_one();
}

async fn next_line<R>(lines: &mut Option<tokio::io::Lines<BufReader<R>>>) -> Option<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => std::future::pending().await,
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs() as i64
}
