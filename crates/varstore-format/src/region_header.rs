//! 16-byte region header.
//!
//! Layout (little-endian):
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00   | 4    | Signature (`$VSS`) |
//! | 0x04   | 4    | Region size including this header |
//! | 0x08   | 1    | Format marker (`0x5A` when formatted) |
//! | 0x09   | 1    | Health marker (`0xFE` when healthy) |
//! | 0x0A   | 2    | Reserved |
//! | 0x0C   | 4    | Reserved |
//!
//! Header fields are written once when the region is formatted.

use binrw::{BinRead, BinWrite};
use std::io::Cursor;

use crate::error::{FormatError, Result};

/// Size of the region header in bytes.
pub const REGION_HEADER_SIZE: usize = 0x10;

/// Region signature, `$VSS` read as a little-endian `u32`.
pub const REGION_SIGNATURE: u32 = u32::from_le_bytes(*b"$VSS");

/// Format marker of a formatted region.
pub const REGION_FORMATTED: u8 = 0x5A;

/// Health marker of a healthy region.
pub const REGION_HEALTHY: u8 = 0xFE;

/// Value of every byte of erased media.
pub const ERASED_BYTE: u8 = 0xFF;

/// Region header at the start of each region image.
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct RegionHeader {
    /// Region signature
    pub signature: u32,
    /// Total region size in bytes, header included
    pub size: u32,
    /// Format marker
    pub format: u8,
    /// Health marker
    pub health: u8,
    /// Reserved
    pub reserved: u16,
    /// Reserved
    pub reserved1: u32,
}

impl RegionHeader {
    /// Header for a freshly formatted region of `size` bytes.
    pub fn formatted(size: usize) -> Result<Self> {
        let size = u32::try_from(size).map_err(|_| FormatError::EntryTooLarge {
            size,
            limit: u32::MAX as usize,
        })?;
        Ok(Self {
            signature: REGION_SIGNATURE,
            size,
            format: REGION_FORMATTED,
            health: REGION_HEALTHY,
            reserved: 0,
            reserved1: 0,
        })
    }

    /// Parse the header from the start of a region image.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < REGION_HEADER_SIZE {
            return Err(FormatError::TruncatedData {
                expected: REGION_HEADER_SIZE,
                actual: data.len(),
            });
        }
        Ok(Self::read_le(&mut Cursor::new(&data[..REGION_HEADER_SIZE]))?)
    }

    /// Serialize the header.
    pub fn to_bytes(&self) -> Result<[u8; REGION_HEADER_SIZE]> {
        let mut buf = [0u8; REGION_HEADER_SIZE];
        self.write_le(&mut Cursor::new(&mut buf[..]))?;
        Ok(buf)
    }

    /// Validate the header against the image it was read from.
    pub fn validate(&self, image_len: usize) -> Result<()> {
        if self.signature != REGION_SIGNATURE {
            return Err(FormatError::InvalidSignature {
                expected: REGION_SIGNATURE,
                actual: self.signature,
            });
        }
        if self.size as usize != image_len {
            return Err(FormatError::RegionSizeMismatch {
                declared: self.size,
                actual: image_len,
            });
        }
        if self.format != REGION_FORMATTED {
            return Err(FormatError::NotFormatted(self.format));
        }
        if self.health != REGION_HEALTHY {
            return Err(FormatError::Unhealthy(self.health));
        }
        Ok(())
    }
}

/// Check whether every byte of `data` is erased.
pub fn is_erased(data: &[u8]) -> bool {
    data.iter().all(|&b| b == ERASED_BYTE)
}
