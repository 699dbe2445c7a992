//! Error types for the variable store record layout

use thiserror::Error;

use crate::state::EntryState;

/// Errors that can occur when decoding or encoding store records
#[derive(Debug, Error)]
pub enum FormatError {
    /// Region header signature does not match `$VSS`
    #[error("Invalid region signature: expected 0x{expected:08x}, got 0x{actual:08x}")]
    InvalidSignature {
        /// Expected signature
        expected: u32,
        /// Signature found in the header
        actual: u32,
    },

    /// Region header declares a size different from the backing image
    #[error("Region size mismatch: header says {declared} bytes, image has {actual} bytes")]
    RegionSizeMismatch {
        /// Size stored in the header
        declared: u32,
        /// Length of the backing image
        actual: usize,
    },

    /// Region has not been formatted
    #[error("Region not formatted: format marker 0x{0:02x}")]
    NotFormatted(u8),

    /// Region is marked unhealthy
    #[error("Region unhealthy: health marker 0x{0:02x}")]
    Unhealthy(u8),

    /// Data is too short for the expected structure
    #[error("Truncated data: expected {expected} bytes, got {actual} bytes")]
    TruncatedData {
        /// Expected minimum size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// Variable name is not representable
    #[error("Invalid variable name: {0}")]
    InvalidName(String),

    /// Attribute string could not be parsed
    #[error("Invalid attribute '{0}'")]
    InvalidAttribute(String),

    /// Entry exceeds the limits of the on-media format
    #[error("Entry too large: {size} bytes exceeds {limit} bytes")]
    EntryTooLarge {
        /// Size requested
        size: usize,
        /// Applicable limit
        limit: usize,
    },

    /// Unsupported record alignment
    #[error("Unsupported alignment {0}: must be a power of two between 1 and 8")]
    InvalidAlignment(usize),

    /// State transition would set bits that were already cleared
    #[error("Invalid state transition: {from:?} -> {to:?}")]
    StateWidening {
        /// Current state
        from: EntryState,
        /// Requested state
        to: EntryState,
    },

    /// Binary read/write error
    #[error("Binary parsing error: {0}")]
    BinRead(String),

    /// IO error during encoding
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<binrw::Error> for FormatError {
    fn from(e: binrw::Error) -> Self {
        Self::BinRead(e.to_string())
    }
}

/// Result type alias for record layout operations
pub type Result<T> = std::result::Result<T, FormatError>;
