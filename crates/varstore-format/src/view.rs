//! Bounds-checked cursor over a region image.
//!
//! A [`RegionView`] walks the entries packed after the region header.
//! Every offset handed out by the view has been checked against the scan
//! end, so callers never index the image with unchecked arithmetic.

use uguid::Guid;

use crate::attributes::Attributes;
use crate::entry::{ENTRY_HEADER_SIZE, EntryHeader, RecordLayout};
use crate::error::Result;
use crate::name::{VariableKey, VariableName};
use crate::region_header::REGION_HEADER_SIZE;
use crate::state::EntryState;

/// Borrowed view of one well-formed entry.
#[derive(Debug, Clone, Copy)]
pub struct EntryRef<'a> {
    offset: usize,
    stored_len: usize,
    header: EntryHeader,
    name: &'a [u8],
    data: &'a [u8],
}

impl<'a> EntryRef<'a> {
    /// Offset of the entry header within the region.
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Size on media, padding included.
    pub const fn stored_len(&self) -> usize {
        self.stored_len
    }

    /// Offset one past the end of this entry.
    pub const fn end(&self) -> usize {
        self.offset + self.stored_len
    }

    /// Decoded header.
    pub const fn header(&self) -> &EntryHeader {
        &self.header
    }

    /// Decoded state.
    pub const fn state(&self) -> EntryState {
        self.header.entry_state()
    }

    /// Attribute flags.
    pub const fn attributes(&self) -> Attributes {
        self.header.attributes
    }

    /// Vendor GUID.
    pub const fn vendor(&self) -> Guid {
        self.header.vendor_guid()
    }

    /// Name bytes, terminator included.
    pub const fn name_bytes(&self) -> &'a [u8] {
        self.name
    }

    /// Data bytes, padding excluded.
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Whether this entry belongs to `key`.
    pub fn matches(&self, key: &VariableKey) -> bool {
        self.vendor() == key.vendor && key.name.matches_bytes(self.name)
    }

    /// Whether two entries share a key.
    pub fn same_key(&self, other: &EntryRef<'_>) -> bool {
        self.header.vendor == other.header.vendor && self.name == other.name
    }

    /// Decode the key of this entry.
    pub fn key(&self) -> Result<VariableKey> {
        Ok(VariableKey::new(
            self.vendor(),
            VariableName::from_bytes(self.name)?,
        ))
    }
}

/// Read-only cursor over a region image.
#[derive(Debug, Clone, Copy)]
pub struct RegionView<'a> {
    image: &'a [u8],
    end: usize,
    layout: RecordLayout,
}

impl<'a> RegionView<'a> {
    /// View `image`, scanning entries no further than `end`.
    ///
    /// `end` is clamped to the image length.
    pub fn new(image: &'a [u8], end: usize, layout: RecordLayout) -> Self {
        Self {
            image,
            end: end.min(image.len()),
            layout,
        }
    }

    /// View the whole image.
    pub fn full(image: &'a [u8], layout: RecordLayout) -> Self {
        Self::new(image, image.len(), layout)
    }

    /// Offset of the first entry.
    pub const fn first_offset() -> usize {
        REGION_HEADER_SIZE
    }

    /// Scan end.
    pub const fn end(&self) -> usize {
        self.end
    }

    /// Layout used to validate entries.
    pub const fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Decode the entry starting at `offset`.
    ///
    /// Returns `None` if the header is not well-formed or the entry does
    /// not fit before the scan end.
    pub fn entry_at(&self, offset: usize) -> Option<EntryRef<'a>> {
        let header_end = offset.checked_add(ENTRY_HEADER_SIZE)?;
        if header_end > self.end {
            return None;
        }

        let header = EntryHeader::from_bytes(&self.image[offset..header_end])?;
        if !self.layout.is_valid_header(&header) {
            return None;
        }

        let name_size = header.name_size as usize;
        let data_size = header.data_size as usize;
        let stored_len = self.layout.entry_size(name_size, data_size);
        let entry_end = offset.checked_add(stored_len)?;
        if entry_end > self.end {
            return None;
        }

        let name_start = header_end;
        let data_start = name_start + name_size + self.layout.pad_size(name_size);

        Some(EntryRef {
            offset,
            stored_len,
            header,
            name: &self.image[name_start..name_start + name_size],
            data: &self.image[data_start..data_start + data_size],
        })
    }

    /// Entry following `entry`, if there is a well-formed one.
    pub fn next_entry(&self, entry: &EntryRef<'_>) -> Option<EntryRef<'a>> {
        self.entry_at(entry.end())
    }

    /// Iterate over entries from the first one.
    pub fn entries(&self) -> Entries<'a> {
        self.entries_from(Self::first_offset())
    }

    /// Iterate over entries starting at `offset`.
    pub fn entries_from(&self, offset: usize) -> Entries<'a> {
        Entries {
            view: *self,
            next: Some(offset),
        }
    }

    /// Offset one past the last well-formed entry.
    pub fn scan_tail(&self) -> usize {
        self.entries()
            .last()
            .map_or(Self::first_offset(), |entry| entry.end())
    }
}

/// Iterator over the well-formed entries of a region.
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    view: RegionView<'a>,
    next: Option<usize>,
}

impl<'a> Iterator for Entries<'a> {
    type Item = EntryRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next?;
        match self.view.entry_at(offset) {
            Some(entry) => {
                self.next = Some(entry.end());
                Some(entry)
            }
            None => {
                self.next = None;
                None
            }
        }
    }
}
