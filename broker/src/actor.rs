//! C1: a single WebSocket endpoint — reader task, writer task, bounded
//! outbound queue, peer pointer, lifecycle. Grounded on the reader/writer
//! pair in the original `sidekick.go` (`Actor.Read` / `Actor.Write`) and on
//! the split-sink/split-stream task shape of
//! `coordinator/src/orderbook/websocket.rs`.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use ratelimit_meter::{KeyedRateLimiter, GCRA};
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify, RwLock};
use tokio::time::Instant;

use crate::config::WebSocketConf;
use crate::error::ErrorCode;
use crate::pool::ActorPool;
use crate::protocol::{ErrorFrame, Frame, OpCode};
use crate::types::RouteKey;

pub type ActorHandle = Arc<Actor>;

/// Token-bucket rate limiter for one Actor's reader loop.
///
/// `rate` and `burst` map onto GCRA's `(capacity, per)` pair: `burst` is the
/// bucket capacity, and a cell refills every `1/rate` seconds — i.e. the
/// bucket drains at `rate` messages/second in steady state but absorbs a
/// burst of up to `burst` messages at once.
struct RateLimiter {
    inner: AsyncMutex<KeyedRateLimiter<(), GCRA>>,
}

impl RateLimiter {
    fn new(rate: u32, burst: u32) -> Self {
        let capacity = NonZeroU32::new(burst.max(1)).expect("burst.max(1) is nonzero");
        let per = Duration::from_secs_f64(1.0 / (rate.max(1) as f64));
        Self {
            inner: AsyncMutex::new(KeyedRateLimiter::new(capacity, per)),
        }
    }

    async fn allow(&self) -> bool {
        self.inner.lock().await.check(()).is_ok()
    }
}

pub struct Actor {
    pub route: RouteKey,
    pub remote_addr: String,
    send_tx: AsyncMutex<Option<mpsc::Sender<Bytes>>>,
    peer: RwLock<Option<ActorHandle>>,
    pool: Option<Weak<ActorPool>>,
    /// Set when this Actor is sitting in an [`ActorPool`]'s waiting set (a
    /// worker upgrade), purely so teardown can deregister it. Distinct from
    /// `pool`, which is the caller-side back-pointer used to *request* a
    /// bridge and is nil for workers per the spec's data model.
    member_of: AsyncMutex<Option<Weak<ActorPool>>>,
    quit_notify: Notify,
    quit_once: AtomicBool,
}

impl Actor {
    /// Non-blocking enqueue onto the outbound queue. Returns `false` (and
    /// permanently closes the queue) the first time it either finds the
    /// queue already closed or discovers it is full — the sole backpressure
    /// primitive described in the spec.
    pub async fn send(&self, payload: Bytes) -> bool {
        let mut guard = self.send_tx.lock().await;
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        match tx.try_send(payload) {
            Ok(()) => true,
            Err(_) => {
                // Either full or the receiver (writer task) is gone. Either
                // way this Actor is overwhelmed: close it for good.
                *guard = None;
                false
            }
        }
    }

    async fn send_error(&self, code: ErrorCode) {
        let _ = self.send(ErrorFrame::new(code).to_bytes()).await;
    }

    /// Closes the socket; if a peer exists, clears the mutual link and
    /// signals the peer's writer to stop. Idempotent: a second call is a
    /// no-op, satisfying the "idempotent teardown" property.
    pub async fn quit(self: &Arc<Self>) {
        if self.quit_once.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut guard = self.send_tx.lock().await;
            *guard = None;
        }
        self.quit_notify.notify_one();

        let member_of = self.member_of.lock().await.take();
        if let Some(pool) = member_of.as_ref().and_then(Weak::upgrade) {
            pool.remove(self).await;
        }

        let peer = {
            let mut peer_guard = self.peer.write().await;
            peer_guard.take()
        };

        if let Some(peer) = peer {
            {
                let mut peer_peer = peer.peer.write().await;
                *peer_peer = None;
            }
            Box::pin(peer.quit()).await;
        }
    }

    /// Marks this Actor as a member of `pool`'s waiting set, so teardown can
    /// deregister it. Called once, right after [`ActorPool::put`].
    pub async fn set_member_of(&self, pool: Weak<ActorPool>) {
        *self.member_of.lock().await = Some(pool);
    }

    async fn peer(&self) -> Option<ActorHandle> {
        self.peer.read().await.clone()
    }

    async fn set_peer(&self, peer: ActorHandle) {
        let mut guard = self.peer.write().await;
        *guard = Some(peer);
    }

    /// Whether teardown has already run. [`ActorPool::bridge`] uses this to
    /// skip waiting workers that disconnected before being matched.
    pub(crate) fn is_closed(&self) -> bool {
        self.quit_once.load(Ordering::SeqCst)
    }

    /// Sets this Actor's peer pointer. Exposed for [`ActorPool::bridge`],
    /// which assigns both sides of a pair while still holding the pool lock.
    pub(crate) async fn link_peer(&self, peer: ActorHandle) {
        self.set_peer(peer).await;
    }

    /// Test-only accessor mirroring [`Actor::peer`].
    #[cfg(test)]
    pub(crate) async fn peer_snapshot(&self) -> Option<ActorHandle> {
        self.peer().await
    }
}

/// Builds an Actor with no live socket, for exercising [`ActorPool::bridge`]
/// in isolation. The channel receiver is dropped immediately: these tests
/// never call `send`, only peer-linkage bookkeeping.
#[cfg(test)]
pub(crate) fn new_detached_for_tests(route: RouteKey, conf: &WebSocketConf) -> ActorHandle {
    let (send_tx, _send_rx) = mpsc::channel(conf.message_queue_size.max(1));
    Arc::new(Actor {
        route,
        remote_addr: "test".to_string(),
        send_tx: AsyncMutex::new(Some(send_tx)),
        peer: RwLock::new(None),
        pool: None,
        member_of: AsyncMutex::new(None),
        quit_notify: Notify::new(),
        quit_once: AtomicBool::new(false),
    })
}

/// Spawns the reader and writer tasks for a freshly upgraded connection and
/// returns a handle callers can `put` into an [`ActorPool`] or use to
/// initiate a `bridge`.
pub fn spawn(
    socket: WebSocket,
    route: RouteKey,
    remote_addr: String,
    conf: &WebSocketConf,
    pool: Option<Weak<ActorPool>>,
) -> ActorHandle {
    let (send_tx, send_rx) = mpsc::channel(conf.message_queue_size.max(1));

    let actor = Arc::new(Actor {
        route,
        remote_addr,
        send_tx: AsyncMutex::new(Some(send_tx)),
        peer: RwLock::new(None),
        pool,
        member_of: AsyncMutex::new(None),
        quit_notify: Notify::new(),
        quit_once: AtomicBool::new(false),
    });

    let (ws_sink, ws_stream) = socket.split();

    tokio::spawn(writer_task(
        actor.clone(),
        ws_sink,
        send_rx,
        conf.ping_interval(),
        conf.write_timeout(),
    ));
    tokio::spawn(reader_task(
        actor.clone(),
        ws_stream,
        conf.pong_timeout(),
        conf.rate_limit,
        conf.rate_limit_burst,
    ));

    actor
}

async fn writer_task(
    actor: ActorHandle,
    mut sink: futures_util::stream::SplitSink<WebSocket, WsMessage>,
    mut send_rx: mpsc::Receiver<Bytes>,
    ping_interval: Duration,
    write_timeout: Duration,
) {
    let mut ticker = tokio::time::interval(ping_interval);
    ticker.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            maybe_msg = send_rx.recv() => {
                match maybe_msg {
                    Some(payload) => {
                        let write = sink.send(WsMessage::Binary(payload.to_vec()));
                        if tokio::time::timeout(write_timeout, write).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // send() closed the channel (overload) or quit() took it.
                        let _ = tokio::time::timeout(write_timeout, sink.send(WsMessage::Close(None))).await;
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                if tokio::time::timeout(write_timeout, sink.send(WsMessage::Ping(Vec::new()))).await.is_err() {
                    break;
                }
            }
            _ = actor.quit_notify.notified() => {
                break;
            }
        }
    }

    let _ = sink.close().await;
    actor.quit().await;
}

async fn reader_task(
    actor: ActorHandle,
    mut stream: futures_util::stream::SplitStream<WebSocket>,
    pong_timeout: Duration,
    rate: u32,
    burst: u32,
) {
    let limiter = RateLimiter::new(rate, burst);
    let mut deadline = Instant::now() + pong_timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let next = tokio::time::timeout(remaining, stream.next()).await;

        let msg = match next {
            Err(_) => {
                tracing::debug!(addr = %actor.remote_addr, "read deadline elapsed");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                tracing::debug!(addr = %actor.remote_addr, %err, "reader closed unexpectedly");
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            WsMessage::Pong(_) => {
                deadline = Instant::now() + pong_timeout;
                continue;
            }
            WsMessage::Ping(_) => continue,
            WsMessage::Close(_) => break,
            WsMessage::Text(_) => {
                actor.send_error(ErrorCode::BadOp).await;
                break;
            }
            WsMessage::Binary(data) => {
                if !limiter.allow().await {
                    actor.send_error(ErrorCode::RateLimited).await;
                    break;
                }

                let frame = match Frame::parse(&data) {
                    Ok(frame) => frame,
                    Err(_) => {
                        actor.send_error(ErrorCode::BadOp).await;
                        break;
                    }
                };

                if !handle_frame(&actor, frame).await {
                    break;
                }
            }
        }
    }

    actor.quit().await;
}

/// Returns `false` when the reader loop should terminate after this frame.
async fn handle_frame(actor: &ActorHandle, frame: Frame) -> bool {
    match frame.op {
        OpCode::Control => {
            // Reserved for future use; the original source panics on this
            // path. We reject cleanly instead (spec §9, open question (i)).
            actor.send_error(ErrorCode::BadOp).await;
            false
        }
        OpCode::Message => {
            let peer = match resolve_peer(actor).await {
                Some(peer) => peer,
                None => {
                    actor.send_error(ErrorCode::PeerUnavailable).await;
                    return true;
                }
            };

            // Forwarding strips the opcode and delivers the tail verbatim
            // (spec.md §3) — the peer is an external endpoint, not another
            // Actor, so nothing downstream expects the opcode byte back.
            let delivered = peer.send(frame.payload).await;
            if !delivered {
                actor.send_error(ErrorCode::PeerDead).await;
                return false;
            }
            true
        }
    }
}

async fn resolve_peer(actor: &ActorHandle) -> Option<ActorHandle> {
    if let Some(peer) = actor.peer().await {
        return Some(peer);
    }

    let pool = actor.pool.as_ref()?.upgrade()?;
    let callee = pool.bridge(actor).await?;
    actor.set_peer(callee.clone()).await;
    Some(callee)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_allows_burst_then_denies() {
        let limiter = RateLimiter::new(1, 2);
        assert!(limiter.allow().await);
        assert!(limiter.allow().await);
        assert!(!limiter.allow().await);
    }
}
