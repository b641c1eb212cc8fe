mod cache;
mod cli;
mod config;
mod favorites;
mod filter;
mod logging;
mod normalize;
mod recipes;
mod store;

use clap::Parser;
use color_eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = cli::Args::parse();

  // Logging is best effort; a read-only data dir shouldn't stop the command
  let _guard = match cli::log_dir().and_then(|dir| logging::init(&dir)) {
    Ok(guard) => Some(guard),
    Err(e) => {
      eprintln!("Logging disabled: {}", e);
      None
    }
  };

  cli::run(args).await
}
