//! End-to-end scenarios from spec.md §8 driven over a real TCP listener,
//! using `tokio-tungstenite` as the WebSocket test client (SPEC_FULL.md §2's
//! ambient test-tooling choice).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use http::Request;
use tokio_tungstenite::tungstenite::Message as TMessage;

use broker::app::{self, AppState};
use broker::config::{AuthConf, Conf, WebSocketConf};
use broker::pool::ActorPool;

fn ws_conf(queue_size: usize, rate_limit: u32, rate_limit_burst: u32) -> WebSocketConf {
    WebSocketConf {
        read_buffer_size: 4096,
        write_buffer_size: 4096,
        max_message_size: 65536,
        message_queue_size: queue_size,
        ping_interval: 30,
        pong_timeout: 60,
        write_timeout: 5,
        rate_limit,
        rate_limit_burst,
    }
}

fn test_conf(queue_size: usize) -> Conf {
    Conf {
        log_level: "info".to_string(),
        address: "127.0.0.1:0".to_string(),
        web_root: "./web".to_string(),
        base_url: "/".to_string(),
        read_timeout: 10,
        write_timeout: 10,
        frontend: ws_conf(queue_size, 1_000, 1_000),
        backend: ws_conf(queue_size, 1_000, 1_000),
        auth: AuthConf {
            username: "worker".to_string(),
            password: "secret".to_string(),
        },
        token: None,
    }
}

async fn spawn_broker(conf: Conf) -> SocketAddr {
    let state = Arc::new(AppState {
        conf,
        pool: Arc::new(ActorPool::new()),
        token_issuer: None,
        index_html: "<html></html>".to_string(),
    });

    let router = app::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}

fn worker_request(addr: SocketAddr, route: &str) -> Request<()> {
    let auth = STANDARD.encode("worker:secret");
    Request::builder()
        .uri(format!("ws://{addr}/ws/b?r={route}"))
        .header("Host", addr.to_string())
        .header("Authorization", format!("Basic {auth}"))
        .header("Connection", "upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header(
            "Sec-WebSocket-Key",
            tokio_tungstenite::tungstenite::handshake::client::generate_key(),
        )
        .body(())
        .unwrap()
}

fn client_request(addr: SocketAddr, route: &str) -> Request<()> {
    Request::builder()
        .uri(format!("ws://{addr}/ws/f?r={route}"))
        .header("Host", addr.to_string())
        .header("Connection", "upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header(
            "Sec-WebSocket-Key",
            tokio_tungstenite::tungstenite::handshake::client::generate_key(),
        )
        .body(())
        .unwrap()
}

#[tokio::test]
async fn happy_bridge_forwards_message_to_worker() {
    let addr = spawn_broker(test_conf(8)).await;

    let (mut worker, _) = tokio_tungstenite::connect_async(worker_request(addr, "R"))
        .await
        .expect("worker upgrade");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (mut client, _) = tokio_tungstenite::connect_async(client_request(addr, "R"))
        .await
        .expect("client upgrade");

    let mut frame = vec![2u8];
    frame.extend_from_slice(b"hello");
    client.send(TMessage::Binary(frame)).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), worker.next())
        .await
        .expect("worker should receive forwarded frame")
        .unwrap()
        .unwrap();

    match received {
        TMessage::Binary(data) => {
            // Forwarding strips the opcode byte: the worker sees the bare
            // payload, not `0x02 + "hello"` (spec.md §3, §8 scenario 1).
            assert_eq!(&data[..], b"hello");
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn no_worker_yields_peer_unavailable_and_stays_open() {
    let addr = spawn_broker(test_conf(8)).await;

    let (mut client, _) = tokio_tungstenite::connect_async(client_request(addr, "Z"))
        .await
        .expect("client upgrade");

    let mut frame = vec![2u8];
    frame.extend_from_slice(b"ping");
    client.send(TMessage::Binary(frame)).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("client should receive an error frame")
        .unwrap()
        .unwrap();

    match received {
        TMessage::Binary(data) => {
            assert_eq!(data[0], 1, "error frame tag");
            assert_eq!(data[1], 0, "PEER_UNAVAILABLE code");
        }
        other => panic!("unexpected message: {other:?}"),
    }

    // Connection must still be open: a second send should not error locally.
    let mut frame = vec![2u8];
    frame.extend_from_slice(b"ping again");
    client.send(TMessage::Binary(frame)).await.unwrap();
}

#[tokio::test]
async fn overload_terminates_overloaded_side_and_notifies_peer() {
    let addr = spawn_broker(test_conf(2)).await;

    let (worker, _) = tokio_tungstenite::connect_async(worker_request(addr, "R"))
        .await
        .expect("worker upgrade");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (mut client, _) = tokio_tungstenite::connect_async(client_request(addr, "R"))
        .await
        .expect("client upgrade");

    // The worker never reads, so its bounded queue (size 2) backs up once
    // more than two frames are forwarded to it.
    for i in 0..5u8 {
        let mut frame = vec![2u8];
        frame.push(i);
        let _ = client.send(TMessage::Binary(frame)).await;
    }

    // Client should observe PEER_DEAD once the worker's queue overflows.
    let mut saw_peer_dead = false;
    for _ in 0..5 {
        let next = tokio::time::timeout(Duration::from_secs(2), client.next()).await;
        match next {
            Ok(Some(Ok(TMessage::Binary(data)))) if data.first() == Some(&1) => {
                saw_peer_dead = data.get(1) == Some(&1);
                if saw_peer_dead {
                    break;
                }
            }
            Ok(Some(Ok(_))) => continue,
            _ => break,
        }
    }
    assert!(saw_peer_dead, "expected a PEER_DEAD error frame");

    drop(worker);
}
