//! On-media record layout for the firmware variable store
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::doc_markdown)] // Firmware terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
//! This crate describes the bytes of a variable store region and nothing
//! else: it never writes to media and keeps no state. The engine in the
//! `varstore` crate builds on it.
//!
//! # Region Layout
//!
//! ```text
//! [RegionHeader: 16 bytes]   -- signature, size, format and health markers
//! [Entry 0]                  -- header, name, data (each padded)
//! [Entry 1]
//! ...
//! [0xFF ... ]                -- erased space after the tail
//! ```
//!
//! # Entry State
//!
//! The state byte narrows monotonically (`0xFF` -> `0x7F` -> `0x7E` ->
//! `0x7C`), see [`EntryState`].

#![warn(missing_docs)]

pub mod attributes;
pub mod entry;
pub mod error;
pub mod name;
pub mod region_header;
pub mod state;
pub mod view;

pub use attributes::Attributes;
pub use entry::{
    DEFAULT_MAX_ENTRY_SIZE, DEFAULT_MAX_HW_ERROR_ENTRY_SIZE, ENTRY_HEADER_SIZE,
    ENTRY_START_MARKER, EntryHeader, HW_ERROR_NAME_PREFIX, RecordLayout, STATE_OFFSET,
};
pub use error::{FormatError, Result};
pub use name::{VariableKey, VariableName};
pub use region_header::{
    ERASED_BYTE, REGION_FORMATTED, REGION_HEADER_SIZE, REGION_HEALTHY, REGION_SIGNATURE,
    RegionHeader, is_erased,
};
pub use state::EntryState;
pub use view::{Entries, EntryRef, RegionView};

/// Re-exported so callers can name vendors without a direct dependency.
pub use uguid::{Guid, guid};

/// Vendor GUID of the architecturally defined global variables.
pub const GLOBAL_VARIABLE_GUID: Guid = guid!("8be4df61-93ca-11d2-aa0d-00e098032b8c");
