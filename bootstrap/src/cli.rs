//! Command-line flags. Grounded on `coordinator/src/cli.rs`'s
//! `clap::Parser` shape, adapted to the original Go binary's `ffcli`
//! subcommand tree (`nitro run URL`, `nitro clone URL`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "nitro", about = "Fetch, set up, and run a header-described program")]
pub struct Opts {
    /// Print verbose output, including captured command output on success.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Use this Python executable instead of searching `PATH`.
    #[arg(long, global = true)]
    pub python: Option<PathBuf>,

    /// Serve this local directory as an HTTP origin, for testing `GET`
    /// against a fake remote without a real server.
    #[arg(long, global = true)]
    pub source: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch, set up and run a program.
    Run { url_or_path: String },
    /// Fetch and set up a program, skipping any `START` directives.
    Clone { url_or_path: String },
}

impl Opts {
    pub fn read() -> Opts {
        Opts::parse()
    }

    /// `run` enables `START` directives; `clone` skips them (spec.md §4.6).
    pub fn start_enabled(&self) -> bool {
        matches!(self.command, Command::Run { .. })
    }

    pub fn url_or_path(&self) -> &str {
        match &self.command {
            Command::Run { url_or_path } | Command::Clone { url_or_path } => url_or_path,
        }
    }
}
