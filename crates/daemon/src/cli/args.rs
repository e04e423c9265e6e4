pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "heirloom")]
#[command(about = "Encrypted time capsule daemon and CLI")]
pub struct Args {
    /// Daemon URL to talk to (defaults to the configured api_port on localhost)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Path to the heirloom config directory (defaults to ~/.heirloom)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
