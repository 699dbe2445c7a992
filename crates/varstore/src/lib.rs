//! Firmware variable store engine
//!
//! This crate keeps named, vendor-scoped variables in two regions: a
//! non-volatile region mirrored from a [`NvMedia`] device and a volatile
//! region held in memory. Entries are appended at the tail of a region
//! and superseded in place by narrowing their state byte, so a crash at
//! any point leaves either the old or the new value readable.
//!
//! # Architecture
//!
//! - **Locator**: resolves a key to its live entry
//! - **Enumerator**: walks live keys across both regions
//! - **Mutator**: create, update and delete with ordered writes
//! - **Reclaimer**: compacts a region through a single atomic replace
//! - **Space accountant**: reports capacity per attribute class
//!
//! [`VariableStore`] ties them together and owns both regions.
//!
//! # Example
//!
//! ```
//! use varstore::{MemoryMedia, StoreConfig, VariableStore};
//! use varstore_format::{Attributes, GLOBAL_VARIABLE_GUID};
//!
//! let media = MemoryMedia::new(4096);
//! let mut store = VariableStore::open(StoreConfig::default(), media)?;
//!
//! store.set("BootOrder", GLOBAL_VARIABLE_GUID, Attributes::nv_bs_rt(), &[0, 0, 1, 0])?;
//! let variable = store.get_variable("BootOrder", GLOBAL_VARIABLE_GUID)?;
//! assert_eq!(variable.data, vec![0, 0, 1, 0]);
//! # Ok::<(), varstore::StoreError>(())
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod enumerator;
pub mod locator;
pub mod media;
pub mod mutator;
pub mod phase;
pub mod reclaim;
pub mod region;
pub mod space;
pub mod store;

pub use config::StoreConfig;
pub use media::{FileMedia, MediaError, MemoryMedia, NvMedia};
pub use phase::{Phase, PhaseLatch, PhaseSource};
pub use reclaim::ReclaimOutcome;
pub use region::{Location, Region, RegionKind};
pub use space::StorageInfo;
pub use store::{Variable, VariableStore};

use thiserror::Error;
use varstore_format::FormatError;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Argument rejected before anything was written.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No live entry for the key.
    #[error("Variable not found")]
    NotFound,

    /// Caller buffer cannot hold the data.
    #[error("Buffer too small: {required} bytes required")]
    BufferTooSmall {
        /// Size of the stored data
        required: usize,
    },

    /// Not enough space, even after reclaiming.
    #[error("Out of resources: {0}")]
    OutOfResources(String),

    /// Entry cannot be changed in the current phase.
    #[error("Variable is write protected")]
    WriteProtected,

    /// Non-volatile media failed.
    #[error("Device error: {0}")]
    Device(#[from] MediaError),

    /// Region contents cannot be trusted.
    #[error("Corrupted region: {0}")]
    Corrupted(#[from] FormatError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
