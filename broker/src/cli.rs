//! Command-line flags. Grounded on `coordinator/src/cli.rs`
//! (`clap::Parser` struct with defaulted flags read once via `Opts::read()`).

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "broker", about = "WebSocket bridge broker")]
pub struct Opts {
    /// Location of the broker configuration file.
    #[arg(long, default_value = "broker.toml")]
    pub conf: PathBuf,

    /// Pretty-print and colorize log output for terminal use.
    #[arg(long)]
    pub pretty: bool,
}

impl Opts {
    pub fn read() -> Opts {
        Opts::parse()
    }
}
