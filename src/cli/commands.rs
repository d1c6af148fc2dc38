//! CLI definition using clap.
//!
//! Every flag can also be set through the environment, so the supervisor
//! can be configured entirely from a service unit.

use clap::Parser;
use std::path::PathBuf;

/// rapidpy - keeps manifest-declared worker scripts running
#[derive(Parser, Debug)]
#[command(name = "rapidpy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, env = "RAPIDPY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the manifest poll interval, in seconds
    #[arg(long, env = "RAPIDPY_POLL_INTERVAL")]
    pub poll_interval: Option<u64>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}
