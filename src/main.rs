mod cli;
mod replay;

use clap::Parser;
use cli::{Cli, Commands};
use dlbridge::config::Config;
use dlbridge::observability::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    init_logging(&config.logging);

    match cli.command {
        Commands::Replay(args) => {
            replay::run(&args.script, &config, !args.no_resume).await?;
        }
        Commands::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}
