//! Configuration for the variable store

use serde::{Deserialize, Serialize};
use std::path::Path;
use varstore_format::{
    DEFAULT_MAX_ENTRY_SIZE, DEFAULT_MAX_HW_ERROR_ENTRY_SIZE, ENTRY_HEADER_SIZE,
    REGION_HEADER_SIZE, RecordLayout,
};

use crate::{Result, StoreError};

/// Configuration for the variable store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Size of the volatile region in bytes, header included
    pub volatile_size: usize,

    /// Maximum size of a common entry (header + name + data)
    pub max_entry_size: usize,

    /// Maximum size of a hardware error record entry
    pub max_hw_error_entry_size: usize,

    /// Bytes of the non-volatile region set aside for error records
    pub hw_error_storage_size: usize,

    /// Alignment of name and data fields
    pub alignment: usize,

    /// Reclaim at open when less free space than this remains
    pub reclaim_threshold: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            volatile_size: 64 * 1024, // 64 KiB
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            max_hw_error_entry_size: DEFAULT_MAX_HW_ERROR_ENTRY_SIZE,
            hw_error_storage_size: 0,
            alignment: 1,
            reclaim_threshold: 1024,
        }
    }
}

impl StoreConfig {
    /// Load a configuration from a JSON file.
    ///
    /// Missing fields take their default values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("Failed to read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| StoreError::Config(format!("Failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the volatile region size
    #[must_use]
    pub const fn with_volatile_size(mut self, size: usize) -> Self {
        self.volatile_size = size;
        self
    }

    /// Set the common entry size limit
    #[must_use]
    pub const fn with_max_entry_size(mut self, size: usize) -> Self {
        self.max_entry_size = size;
        self
    }

    /// Set the error record entry size limit
    #[must_use]
    pub const fn with_max_hw_error_entry_size(mut self, size: usize) -> Self {
        self.max_hw_error_entry_size = size;
        self
    }

    /// Set the error record partition size
    #[must_use]
    pub const fn with_hw_error_storage_size(mut self, size: usize) -> Self {
        self.hw_error_storage_size = size;
        self
    }

    /// Set the field alignment
    #[must_use]
    pub const fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Set the open-time reclaim threshold
    #[must_use]
    pub const fn with_reclaim_threshold(mut self, threshold: usize) -> Self {
        self.reclaim_threshold = threshold;
        self
    }

    /// Record layout described by this configuration.
    pub fn layout(&self) -> Result<RecordLayout> {
        RecordLayout::new(
            self.alignment,
            self.max_entry_size,
            self.max_hw_error_entry_size,
        )
        .map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` if:
    /// - the alignment is not a power of two between 1 and 8
    /// - an entry size limit cannot hold an entry header
    /// - the volatile region cannot hold its header
    pub fn validate(&self) -> Result<()> {
        self.layout()?;

        if self.max_entry_size <= ENTRY_HEADER_SIZE {
            return Err(StoreError::Config(format!(
                "max_entry_size {} must exceed the {ENTRY_HEADER_SIZE}-byte entry header",
                self.max_entry_size
            )));
        }
        if self.max_hw_error_entry_size <= ENTRY_HEADER_SIZE {
            return Err(StoreError::Config(format!(
                "max_hw_error_entry_size {} must exceed the {ENTRY_HEADER_SIZE}-byte entry header",
                self.max_hw_error_entry_size
            )));
        }
        if self.volatile_size < REGION_HEADER_SIZE || u32::try_from(self.volatile_size).is_err() {
            return Err(StoreError::Config(format!(
                "volatile_size {} is out of range",
                self.volatile_size
            )));
        }

        Ok(())
    }

    /// Validate the configuration against a non-volatile image size.
    pub(crate) fn validate_for(&self, nv_size: usize) -> Result<()> {
        self.validate()?;
        if nv_size < REGION_HEADER_SIZE + self.hw_error_storage_size {
            return Err(StoreError::Config(format!(
                "non-volatile region of {nv_size} bytes cannot hold a {} byte error record partition",
                self.hw_error_storage_size
            )));
        }
        Ok(())
    }
}
