//! 32-byte entry header and record layout.
//!
//! Each entry is laid out as:
//!
//! ```text
//! [EntryHeader: 32 bytes]
//! [Name: name_size bytes][pad to alignment]
//! [Data: data_size bytes][pad to alignment]
//! ```
//!
//! Header layout (little-endian):
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00   | 2    | Start marker (`0x55AA`) |
//! | 0x02   | 1    | State |
//! | 0x03   | 1    | Reserved |
//! | 0x04   | 4    | Attributes |
//! | 0x08   | 4    | Name size (terminator included, padding excluded) |
//! | 0x0C   | 4    | Data size (padding excluded) |
//! | 0x10   | 16   | Vendor GUID |

use binrw::{BinRead, BinWrite};
use std::io::Cursor;
use uguid::Guid;

use crate::attributes::Attributes;
use crate::error::{FormatError, Result};
use crate::name::VariableKey;
use crate::region_header::ERASED_BYTE;
use crate::state::EntryState;

/// Size of the entry header in bytes.
pub const ENTRY_HEADER_SIZE: usize = 0x20;

/// Marker at the start of every entry.
pub const ENTRY_START_MARKER: u16 = 0x55AA;

/// Offset of the state byte within the entry header.
pub const STATE_OFFSET: usize = 0x02;

/// Default maximum size of a common entry (header + name + data).
pub const DEFAULT_MAX_ENTRY_SIZE: usize = 0x400;

/// Default maximum size of a hardware error record entry.
pub const DEFAULT_MAX_HW_ERROR_ENTRY_SIZE: usize = 0x8000;

/// Name prefix required for hardware error record entries.
pub const HW_ERROR_NAME_PREFIX: &str = "HwErrRec";

/// Fixed-size header preceding every entry.
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct EntryHeader {
    /// Start marker
    pub start_marker: u16,
    /// Raw state byte
    pub state: u8,
    /// Reserved
    pub reserved: u8,
    /// Attribute flags
    pub attributes: Attributes,
    /// Name size in bytes
    pub name_size: u32,
    /// Data size in bytes
    pub data_size: u32,
    /// Vendor GUID in on-media byte order
    pub vendor: [u8; 16],
}

impl EntryHeader {
    /// Parse a header from the first 32 bytes of `data`.
    ///
    /// Returns `None` if the slice is too short.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < ENTRY_HEADER_SIZE {
            return None;
        }
        Self::read_le(&mut Cursor::new(&data[..ENTRY_HEADER_SIZE])).ok()
    }

    /// Serialize the header.
    pub fn to_bytes(&self) -> Result<[u8; ENTRY_HEADER_SIZE]> {
        let mut buf = [0u8; ENTRY_HEADER_SIZE];
        self.write_le(&mut Cursor::new(&mut buf[..]))?;
        Ok(buf)
    }

    /// Decoded state.
    pub const fn entry_state(&self) -> EntryState {
        EntryState::from_byte(self.state)
    }

    /// Vendor GUID.
    pub const fn vendor_guid(&self) -> Guid {
        Guid::from_bytes(self.vendor)
    }

    /// Unpadded size of header, name and data.
    pub const fn raw_len(&self) -> u64 {
        ENTRY_HEADER_SIZE as u64 + self.name_size as u64 + self.data_size as u64
    }
}

/// Alignment and size limits shared by every entry of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    /// Alignment of the name and data fields
    pub alignment: usize,
    /// Maximum raw size of a common entry
    pub max_entry_size: usize,
    /// Maximum raw size of a hardware error record entry
    pub max_hw_error_entry_size: usize,
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self {
            alignment: 1,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            max_hw_error_entry_size: DEFAULT_MAX_HW_ERROR_ENTRY_SIZE,
        }
    }
}

impl RecordLayout {
    /// Create a layout, checking the alignment.
    pub fn new(
        alignment: usize,
        max_entry_size: usize,
        max_hw_error_entry_size: usize,
    ) -> Result<Self> {
        if !alignment.is_power_of_two() || alignment > 8 {
            return Err(FormatError::InvalidAlignment(alignment));
        }
        Ok(Self {
            alignment,
            max_entry_size,
            max_hw_error_entry_size,
        })
    }

    /// Bytes of padding following a field of `len` bytes.
    pub const fn pad_size(&self, len: usize) -> usize {
        (self.alignment - len % self.alignment) % self.alignment
    }

    /// Size of an entry on media, padding included.
    pub const fn entry_size(&self, name_size: usize, data_size: usize) -> usize {
        ENTRY_HEADER_SIZE
            + name_size
            + self.pad_size(name_size)
            + data_size
            + self.pad_size(data_size)
    }

    /// Size limit of the class selected by `attributes`.
    pub const fn class_max(&self, attributes: Attributes) -> usize {
        if attributes.is_hw_error_record() {
            self.max_hw_error_entry_size
        } else {
            self.max_entry_size
        }
    }

    /// Check whether `header` describes a well-formed entry.
    pub fn is_valid_header(&self, header: &EntryHeader) -> bool {
        header.start_marker == ENTRY_START_MARKER
            && header.raw_len() <= self.class_max(header.attributes) as u64
    }

    /// Encode a complete entry in the given state.
    ///
    /// Padding bytes are left erased.
    pub fn encode_entry(
        &self,
        state: EntryState,
        attributes: Attributes,
        key: &VariableKey,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let name = key.name.to_bytes();
        let size = self.entry_size(name.len(), data.len());
        let too_large = |len: usize| FormatError::EntryTooLarge {
            size: len,
            limit: u32::MAX as usize,
        };

        let header = EntryHeader {
            start_marker: ENTRY_START_MARKER,
            state: state.to_byte(),
            reserved: 0,
            attributes,
            name_size: u32::try_from(name.len()).map_err(|_| too_large(name.len()))?,
            data_size: u32::try_from(data.len()).map_err(|_| too_large(data.len()))?,
            vendor: key.vendor.to_bytes(),
        };

        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(&header.to_bytes()?);
        out.extend_from_slice(&name);
        out.resize(out.len() + self.pad_size(name.len()), ERASED_BYTE);
        out.extend_from_slice(data);
        out.resize(size, ERASED_BYTE);
        Ok(out)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::name::VariableName;
    use pretty_assertions::assert_eq;
    use uguid::guid;

    const VENDOR: Guid = guid!("8be4df61-93ca-11d2-aa0d-00e098032b8c");

    fn key(name: &str) -> VariableKey {
        VariableKey::new(VENDOR, VariableName::new(name).expect("name"))
    }

    #[test]
    fn test_header_layout() {
        let layout = RecordLayout::default();
        let bytes = layout
            .encode_entry(EntryState::Added, Attributes::nv_bs_rt(), &key("Boot"), &[1, 2, 3])
            .expect("encode");

        assert_eq!(bytes.len(), ENTRY_HEADER_SIZE + 10 + 3);
        assert_eq!(&bytes[0..2], &[0xAA, 0x55]);
        assert_eq!(bytes[STATE_OFFSET], 0x7F);
        assert_eq!(bytes[3], 0);
        assert_eq!(&bytes[4..8], &7u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &10u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &3u32.to_le_bytes());
        assert_eq!(&bytes[16..32], &VENDOR.to_bytes());
        assert_eq!(&bytes[bytes.len() - 3..], &[1, 2, 3]);

        let header = EntryHeader::from_bytes(&bytes).expect("header");
        assert_eq!(header.entry_state(), EntryState::Added);
        assert_eq!(header.vendor_guid(), VENDOR);
        assert!(layout.is_valid_header(&header));
    }

    #[test]
    fn test_padding() {
        let layout = RecordLayout::new(8, 1024, 0x8000).expect("layout");
        assert_eq!(layout.pad_size(0), 0);
        assert_eq!(layout.pad_size(10), 6);
        assert_eq!(layout.pad_size(16), 0);
        assert_eq!(layout.entry_size(10, 3), 32 + 16 + 8);

        let bytes = layout
            .encode_entry(EntryState::Added, Attributes::nv_bs_rt(), &key("Boot"), &[9; 3])
            .expect("encode");
        assert_eq!(bytes.len(), 56);
        // Name padding and data padding stay erased.
        assert_eq!(&bytes[42..48], &[ERASED_BYTE; 6]);
        assert_eq!(&bytes[48..51], &[9; 3]);
        assert_eq!(&bytes[51..56], &[ERASED_BYTE; 5]);
    }

    #[test]
    fn test_invalid_alignment() {
        assert!(RecordLayout::new(3, 1024, 0x8000).is_err());
        assert!(RecordLayout::new(16, 1024, 0x8000).is_err());
        assert!(RecordLayout::new(0, 1024, 0x8000).is_err());
    }

    #[test]
    fn test_class_limits() {
        let layout = RecordLayout::default();
        let mut header = EntryHeader {
            start_marker: ENTRY_START_MARKER,
            state: EntryState::Added.to_byte(),
            reserved: 0,
            attributes: Attributes::nv_bs_rt(),
            name_size: 10,
            data_size: (DEFAULT_MAX_ENTRY_SIZE - ENTRY_HEADER_SIZE - 10) as u32,
            vendor: [0; 16],
        };
        assert!(layout.is_valid_header(&header));

        header.data_size += 1;
        assert!(!layout.is_valid_header(&header));

        // The error record class has a larger budget.
        header.attributes.set(Attributes::HARDWARE_ERROR_RECORD);
        assert!(layout.is_valid_header(&header));

        header.start_marker = 0xFFFF;
        assert!(!layout.is_valid_header(&header));
    }

    #[test]
    fn test_erased_header_is_invalid() {
        let header = EntryHeader::from_bytes(&[ERASED_BYTE; ENTRY_HEADER_SIZE]).expect("header");
        assert!(!RecordLayout::default().is_valid_header(&header));
        assert!(EntryHeader::from_bytes(&[0u8; 8]).is_none());
    }
}
