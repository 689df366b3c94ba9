//! Process-wide tracing setup, identical in shape to `broker::logger`,
//! grounded on `coordinator/src/logger.rs`.

use anyhow::{Context, Result};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

const RUST_LOG_ENV: &str = "RUST_LOG";

pub fn init_tracing(level: &str, pretty: bool) -> Result<()> {
    let is_terminal = atty::is(atty::Stream::Stderr);

    let directive: Directive = level.parse().unwrap_or(Directive::from(
        tracing::metadata::LevelFilter::INFO,
    ));

    let mut filter = EnvFilter::new("").add_directive(directive);

    if let Some(Ok(env)) = std::env::var_os(RUST_LOG_ENV).map(|s| s.into_string()) {
        for directive in env.split(',') {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => eprintln!("WARN ignoring log directive `{directive}`: {e}"),
            }
        }
    }

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(is_terminal && pretty);

    let fmt_layer = if pretty {
        fmt_layer.boxed()
    } else {
        fmt_layer.json().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("failed to init tracing")?;

    Ok(())
}
