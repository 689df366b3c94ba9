//! C2: route → set-of-waiting-workers mapping. Grounded on the `BotPool`
//! channel in `sidekick.go` (a buffered channel keyed implicitly by a single
//! route), generalized here to a per-route FIFO queue guarded by one mutex,
//! resolving spec.md §9's open question (iii) in favor of FIFO.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::actor::ActorHandle;
use crate::types::RouteKey;

#[derive(Default)]
pub struct ActorPool {
    routes: Mutex<HashMap<RouteKey, VecDeque<ActorHandle>>>,
}

impl ActorPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `actor` into `route`'s waiting set. Idempotent per
    /// (route, actor) is guaranteed by callers only ever inserting a freshly
    /// upgraded worker once.
    pub async fn put(&self, route: RouteKey, actor: ActorHandle) {
        let mut routes = self.routes.lock().await;
        routes.entry(route).or_default().push_back(actor);
    }

    /// Atomically pops one waiting worker for `caller.route` and assigns
    /// mutual peer links while still holding the pool lock, so no third
    /// matcher can observe a half-linked pair. Skips (and drops) entries
    /// whose connection has already torn down, so a worker that disconnects
    /// before being bridged doesn't wedge a route forever.
    pub async fn bridge(&self, caller: &ActorHandle) -> Option<ActorHandle> {
        let mut routes = self.routes.lock().await;
        let queue = routes.get_mut(&caller.route)?;

        while let Some(callee) = queue.pop_front() {
            if callee.is_closed() {
                continue;
            }

            callee.link_peer(caller.clone()).await;
            caller.link_peer(callee.clone()).await;

            return Some(callee);
        }

        None
    }

    /// Ensures `actor` is no longer a match candidate. Called from an
    /// Actor's own teardown path.
    pub async fn remove(&self, actor: &std::sync::Arc<crate::actor::Actor>) {
        let mut routes = self.routes.lock().await;
        if let Some(queue) = routes.get_mut(&actor.route) {
            queue.retain(|a| !Arc::ptr_eq(a, actor));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebSocketConf;

    fn conf() -> WebSocketConf {
        WebSocketConf {
            read_buffer_size: 4096,
            write_buffer_size: 4096,
            max_message_size: 65536,
            message_queue_size: 4,
            ping_interval: 30,
            pong_timeout: 60,
            write_timeout: 10,
            rate_limit: 100,
            rate_limit_burst: 100,
        }
    }

    fn bare_actor(route: &str) -> ActorHandle {
        crate::actor::new_detached_for_tests(RouteKey::parse(route).unwrap(), &conf())
    }

    #[tokio::test]
    async fn bridge_is_disjoint_and_mutual() {
        let pool = ActorPool::new();
        let w1 = bare_actor("r");
        let w2 = bare_actor("r");
        pool.put(RouteKey::parse("r").unwrap(), w1.clone()).await;
        pool.put(RouteKey::parse("r").unwrap(), w2.clone()).await;

        let caller1 = bare_actor("r");
        let caller2 = bare_actor("r");

        let callee1 = pool.bridge(&caller1).await.expect("first bridge");
        let callee2 = pool.bridge(&caller2).await.expect("second bridge");

        assert!(!Arc::ptr_eq(&callee1, &callee2));
        assert!(Arc::ptr_eq(&caller1.peer_snapshot().await.unwrap(), &callee1));
        assert!(Arc::ptr_eq(&callee1.peer_snapshot().await.unwrap(), &caller1));
    }

    #[tokio::test]
    async fn bridge_on_empty_route_returns_none() {
        let pool = ActorPool::new();
        let caller = bare_actor("missing");
        assert!(pool.bridge(&caller).await.is_none());
    }
}
