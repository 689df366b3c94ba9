//! Broker binary: wires config, logging, the Actor/ActorPool bridge, the
//! HTTP front, and graceful shutdown. Grounded on the teacher's
//! `coordinator/src/main.rs` / `webapp/src/main.rs` `#[tokio::main]` shape
//! (`Opts::read()` → config load → logger init → `axum::serve`).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use broker::app::{self, AppState};
use broker::cli::Opts;
use broker::config::Conf;
use broker::logger;
use broker::pool::ActorPool;
use broker::token::TokenIssuer;

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::read();

    let conf = Conf::read(&opts.conf)
        .await
        .with_context(|| format!("failed to read config from {:?}", opts.conf))?;

    logger::init_tracing(&conf.log_level, opts.pretty).context("failed to init tracing")?;

    let raw_index = tokio::fs::read_to_string(format!("{}/index.html", conf.web_root))
        .await
        .context("failed to read web_root/index.html")?;
    let index_html = app::rewrite_index(&raw_index, &conf.base_url);

    let token_issuer = conf.token.as_ref().map(|t| {
        Arc::new(TokenIssuer::new(
            t.secret.clone().into_bytes(),
            t.audience.clone(),
            Duration::from_secs(t.ttl_secs),
        ))
    });

    let address: SocketAddr = conf.address.parse().context("invalid `address`")?;

    let state = Arc::new(AppState {
        conf: conf.clone(),
        pool: Arc::new(ActorPool::new()),
        token_issuer: token_issuer.clone(),
        index_html,
    });

    if let Some(issuer) = token_issuer {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            loop {
                ticker.tick().await;
                issuer.gc().await;
            }
        });
    }

    let router = app::router(state);

    tracing::info!(%address, "broker listening");
    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("received shutdown signal");
}
