//! `nitro` binary: downloads or locates the main program file, parses its
//! setup header, prepares the language sandbox, and interprets the
//! directives. Grounded on `nitro.go`'s `main`/`run`, restructured around
//! this crate's `fetch`/`header`/`sandbox`/`interpreter` split.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};

use bootstrap::cli::Opts;
use bootstrap::fetch;
use bootstrap::header;
use bootstrap::interpreter::{Interpreter, MainFileVars};
use bootstrap::logger;
use bootstrap::sandbox::Env;

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::read();
    logger::init_tracing(if opts.verbose { "debug" } else { "info" }, true)?;

    let source_addr = match &opts.source {
        Some(dir) => Some(serve_source_dir(dir.clone()).await?),
        None => None,
    };

    let target = resolve_target(opts.url_or_path(), source_addr);

    if let Err(err) = run(
        &target,
        opts.python.as_deref(),
        opts.start_enabled(),
        opts.verbose,
    )
    .await
    {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }

    Ok(())
}

/// Serves `dir` over HTTP on an ephemeral localhost port, exactly the
/// `ServeDir` pattern `broker::app::router` uses for its own web root, so
/// `--source` exercises the real `GET` download path in tests without a
/// live remote server.
async fn serve_source_dir(dir: std::path::PathBuf) -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind --source listener")?;
    let addr = listener.local_addr()?;

    let app = axum::Router::new().fallback_service(tower_http::services::ServeDir::new(dir));
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(%err, "--source server exited");
        }
    });

    tracing::info!(%addr, "serving --source directory for local testing");
    Ok(addr)
}

/// When `--source` is active and the caller passed a bare relative name
/// rather than a full URL, rewrites it to point at the local test server.
fn resolve_target(raw: &str, source_addr: Option<SocketAddr>) -> String {
    match source_addr {
        Some(addr) if !fetch::is_url(raw) => format!("http://{addr}/{}", raw.trim_start_matches('/')),
        _ => raw.to_string(),
    }
}

async fn run(target: &str, python_override: Option<&Path>, start_enabled: bool, verbose: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let cwd = std::env::current_dir().context("failed to determine current working directory")?;

    let (main_file, source_url) = fetch::get_or_locate_main_file(&client, &cwd, target)
        .await
        .context("error downloading main file")?;

    let code = tokio::fs::read_to_string(&main_file)
        .await
        .with_context(|| format!("error reading main file {}", main_file.display()))?;

    let (_metadata, commands) = header::parse(&code).context("error parsing header")?;

    let env = Env::prepare(&main_file, python_override, verbose)
        .await
        .context("error initializing environment")?;

    let vars = MainFileVars::new(&main_file);
    let mut interpreter = Interpreter::new(&cwd, &vars, client, env, source_url, verbose, start_enabled);
    interpreter.run(&commands).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_target_rewrites_bare_names_under_source() {
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(
            resolve_target("hello.py", Some(addr)),
            "http://127.0.0.1:9999/hello.py"
        );
        assert_eq!(
            resolve_target("https://example.com/hello.py", Some(addr)),
            "https://example.com/hello.py"
        );
        assert_eq!(resolve_target("hello.py", None), "hello.py");
    }
}
