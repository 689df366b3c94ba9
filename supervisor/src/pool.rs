//! C5: maintains exactly `pool_size` children for one job, restarting on
//! exit. Grounded on `cmd/supd/main.go`'s `WorkerPool` (`run`/`monitor`/
//! `quit`/`size`, a single mutex guarding both the worker set and the
//! `stopping` flag).

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::JobConf;
use crate::worker::{self, WorkerHandle};

struct Inner {
    workers: Vec<WorkerHandle>,
    stopping: bool,
    counter: usize,
}

pub struct WorkerPool {
    conf: JobConf,
    inner: Mutex<Inner>,
}

impl WorkerPool {
    pub fn new(conf: JobConf) -> Arc<WorkerPool> {
        Arc::new(WorkerPool {
            conf,
            inner: Mutex::new(Inner {
                workers: Vec::new(),
                stopping: false,
                counter: 0,
            }),
        })
    }

    /// Tops the pool up to `pool_size`, spawning a monitor per new worker
    /// that refills the pool again once that worker exits (unless stopping).
    pub async fn run(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        if inner.stopping {
            return;
        }

        while inner.workers.len() < self.conf.pool_size {
            inner.counter += 1;
            let label = inner.counter;
            let handle = worker::spawn(self.conf.clone(), label);
            inner.workers.push(handle);

            tokio::spawn(monitor(self.clone(), label));
        }
    }

    pub async fn size(&self) -> usize {
        self.inner.lock().await.workers.len()
    }

    /// Marks the pool stopping and signals every live worker's quit channel.
    /// Does not wait for them to exit; callers poll [`WorkerPool::size`].
    pub async fn quit(&self) {
        let mut inner = self.inner.lock().await;
        inner.stopping = true;
        for worker in inner.workers.iter_mut() {
            worker.quit();
        }
    }
}

async fn monitor(pool: Arc<WorkerPool>, label: usize) {
    // Wait on a clone of the worker's own `Notify` so the entry stays in
    // `workers` (and counted by `size()`) for as long as the child is
    // actually alive — only removed once it has genuinely exited.
    let done = {
        let inner = pool.inner.lock().await;
        inner.workers.iter().find(|w| w.label == label).map(|w| w.done.clone())
    };

    let Some(done) = done else { return };
    done.notified().await;

    let stopping = {
        let mut inner = pool.inner.lock().await;
        inner.workers.retain(|w| w.label != label);
        inner.stopping
    };

    if !stopping {
        pool.run().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(pool_size: usize) -> JobConf {
        JobConf {
            name: "echo".to_string(),
            command: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), "exit 0".to_string()],
            env: Vec::new(),
            dir: None,
            pool_size,
        }
    }

    #[tokio::test]
    async fn converges_to_pool_size_after_exits() {
        let pool = WorkerPool::new(job(2));
        pool.run().await;

        // Exiting children get respawned by their monitor task; give that a
        // moment, then the pool should be back at steady state.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert_eq!(pool.size().await, 2);
    }

    #[tokio::test]
    async fn quit_stops_refilling() {
        let pool = WorkerPool::new(job(1));
        pool.run().await;
        pool.quit().await;

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert_eq!(pool.size().await, 0);
    }
}
