use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dlbridge")]
#[command(about = "Torrent alert bridge for the download item tree", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides DLBRIDGE_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive a scripted alert sequence through the dispatcher
    Replay(ReplayArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct ReplayArgs {
    /// JSON-lines script of add/bind/metadata/alert steps
    #[arg(long)]
    pub script: PathBuf,

    /// Do not persist resume data even if enabled in configuration
    #[arg(long)]
    pub no_resume: bool,
}
