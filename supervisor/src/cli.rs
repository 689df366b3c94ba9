//! Command-line flags, same shape as `broker::cli`, grounded on
//! `coordinator/src/cli.rs`'s `Opts::read()` pattern.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "supd", about = "Process supervisor")]
pub struct Opts {
    /// Location of the supervisor configuration file.
    #[arg(long, default_value = "supd.toml")]
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
