//! Varstore binary entry point.
//!
//! This is a thin wrapper around the varstore-cli library that:
//! 1. Parses command-line arguments
//! 2. Initializes logging
//! 3. Runs the selected command
//!
//! For library usage, see the varstore-cli crate documentation.

use anyhow::{Context, Result};
use varstore_cli::{Cli, run};

fn main() -> Result<()> {
    // Logs go to stderr so command output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::from_args();
    tracing::debug!("Image: {}", cli.image.display());

    let mut stdout = std::io::stdout().lock();
    run(&cli, &mut stdout).with_context(|| format!("varstore failed on {}", cli.image.display()))?;

    Ok(())
}
