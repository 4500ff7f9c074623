mod camera;
mod cli;
mod engine;
mod error;
mod model;
mod orchestrator;
mod session;
mod storage;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Install a tracing subscriber unless the TUI owns the terminal.
fn init_tracing(args: &cli::Cli) -> Result<()> {
    if let Some(path) = args.log_file.as_deref() {
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file {}", path.display()))?;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .try_init();
    } else if args.is_headless() || cfg!(not(feature = "tui")) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .try_init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = args.is_headless();
    init_tracing(&args)?;

    match cli::run(args).await {
        Ok(()) => {
            // Abandoned batch workers must not keep the process alive.
            std::process::exit(0);
        }
        Err(e) if is_non_tui => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
        Err(e) => Err(e),
    }
}
