//! Varstore command-line tool
//!
//! Inspects and edits non-volatile variable store images on disk. The image
//! file backs the non-volatile region through a memory map; the volatile
//! region is recreated empty for every invocation.
//!
//! # Architecture
//!
//! - **config**: Command-line arguments and subcommands (clap)
//! - **commands**: Command implementations writing reports to any writer
//! - **error**: Error types
//!
//! # Example
//!
//! ```no_run
//! use varstore_cli::{Cli, run};
//!
//! let cli = Cli::from_args();
//! run(&cli, &mut std::io::stdout().lock())?;
//! # Ok::<(), varstore_cli::CliError>(())
//! ```

#![allow(clippy::doc_markdown)] // Command names in docs

pub mod commands;
pub mod config;
pub mod error;

pub use commands::run;
pub use config::{Cli, Command, DataArgs, KeyArgs};
pub use error::{CliError, Result};
