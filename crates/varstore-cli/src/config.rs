//! Command-line configuration.
//!
//! Arguments can be provided via:
//! - CLI flags (`--image`, `--config`, ...)
//! - Environment variables (`VARSTORE_IMAGE`, `VARSTORE_CONFIG`)
//! - Default values
//!
//! # Example
//!
//! ```no_run
//! use varstore_cli::Cli;
//!
//! let cli = Cli::from_args();
//! println!("Image: {}", cli.image.display());
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use varstore::StoreConfig;
use varstore_format::{Attributes, GLOBAL_VARIABLE_GUID, Guid};

use crate::error::{CliError, Result};

/// Default size of a new image.
pub const DEFAULT_IMAGE_SIZE: usize = 64 * 1024;

/// Top-level arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "varstore",
    about = "Inspect and edit firmware variable store images",
    version
)]
pub struct Cli {
    /// Non-volatile image file
    #[arg(
        long,
        global = true,
        env = "VARSTORE_IMAGE",
        default_value = "./nvram.img"
    )]
    pub image: PathBuf,

    /// Store configuration file (JSON)
    #[arg(long, global = true, env = "VARSTORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Vendor and name of a variable.
#[derive(Debug, Clone, Args)]
pub struct KeyArgs {
    /// Variable name
    pub name: String,

    /// Vendor GUID
    #[arg(long, value_parser = parse_guid, default_value_t = GLOBAL_VARIABLE_GUID)]
    pub vendor: Guid,
}

/// Source of the data for `set`.
#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
pub struct DataArgs {
    /// Data as a UTF-8 string
    #[arg(long)]
    pub data: Option<String>,

    /// Data as hex
    #[arg(long)]
    pub hex: Option<String>,

    /// Data read from a file
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl DataArgs {
    /// Resolve the data bytes.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        if let Some(text) = &self.data {
            return Ok(text.as_bytes().to_vec());
        }
        if let Some(text) = &self.hex {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            return hex::decode(compact)
                .map_err(|e| CliError::InvalidInput(format!("invalid hex data: {e}")));
        }
        if let Some(path) = &self.file {
            return Ok(std::fs::read(path)?);
        }
        Err(CliError::InvalidInput("no data given".to_string()))
    }
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create and format an erased image
    Init {
        /// Image size in bytes
        #[arg(long, default_value_t = DEFAULT_IMAGE_SIZE)]
        size: usize,
    },

    /// List variables
    List {
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a variable
    Get {
        #[command(flatten)]
        key: KeyArgs,

        /// Write the raw bytes to stdout instead of hex
        #[arg(long)]
        raw: bool,
    },

    /// Create or update a variable
    Set {
        #[command(flatten)]
        key: KeyArgs,

        /// Attributes, e.g. `nv,bs,rt`
        #[arg(long, default_value = "nv,bs,rt")]
        attributes: Attributes,

        #[command(flatten)]
        data: DataArgs,
    },

    /// Delete a variable
    Delete {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Report capacity for an attribute class
    Info {
        /// Attributes, e.g. `nv,bs,rt`
        #[arg(long, default_value = "nv,bs,rt")]
        attributes: Attributes,
    },

    /// Compact the non-volatile region
    Compact,

    /// Show every entry of the non-volatile region, dead ones included
    Dump,
}

impl Cli {
    /// Parse arguments from the command line.
    #[must_use]
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Load the store configuration.
    pub fn store_config(&self) -> Result<StoreConfig> {
        match &self.config {
            Some(path) => Ok(StoreConfig::from_json_file(path)?),
            None => Ok(StoreConfig::default()),
        }
    }
}

fn parse_guid(s: &str) -> std::result::Result<Guid, String> {
    Guid::try_parse(s).map_err(|_| format!("invalid GUID: {s}"))
}
