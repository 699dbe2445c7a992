//! Region identity and borrowed region views.

use std::fmt;

use varstore_format::{
    Attributes, ERASED_BYTE, EntryRef, EntryState, FormatError, REGION_HEADER_SIZE, RecordLayout,
    RegionHeader, RegionView,
};

use crate::phase::Phase;

/// Which of the two regions an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// Persistent region backed by [`crate::NvMedia`].
    NonVolatile,
    /// In-memory region, lost on reset.
    Volatile,
}

impl RegionKind {
    /// Order in which regions are searched and enumerated.
    pub const SEARCH_ORDER: [Self; 2] = [Self::NonVolatile, Self::Volatile];

    /// Region selected by the non-volatile attribute bit.
    pub const fn for_attributes(attributes: Attributes) -> Self {
        if attributes.is_non_volatile() {
            Self::NonVolatile
        } else {
            Self::Volatile
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonVolatile => write!(f, "non-volatile"),
            Self::Volatile => write!(f, "volatile"),
        }
    }
}

/// Position of an entry within the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    /// Region holding the entry
    pub kind: RegionKind,
    /// Offset of the entry header within the region
    pub offset: usize,
}

impl Location {
    /// Create a location.
    pub const fn new(kind: RegionKind, offset: usize) -> Self {
        Self { kind, offset }
    }
}

/// Read-only view of one region and its tail.
#[derive(Debug, Clone, Copy)]
pub struct Region<'a> {
    kind: RegionKind,
    image: &'a [u8],
    tail: usize,
    layout: RecordLayout,
}

impl<'a> Region<'a> {
    /// Wrap a region image whose entries end at `tail`.
    pub const fn new(kind: RegionKind, image: &'a [u8], tail: usize, layout: RecordLayout) -> Self {
        Self {
            kind,
            image,
            tail,
            layout,
        }
    }

    /// Region kind.
    pub const fn kind(&self) -> RegionKind {
        self.kind
    }

    /// Raw image, header included.
    pub const fn image(&self) -> &'a [u8] {
        self.image
    }

    /// Offset of the first byte after the last entry.
    pub const fn tail(&self) -> usize {
        self.tail
    }

    /// Total region size.
    pub const fn size(&self) -> usize {
        self.image.len()
    }

    /// Bytes between the tail and the end of the region.
    pub const fn free_space(&self) -> usize {
        self.image.len().saturating_sub(self.tail)
    }

    /// Record layout shared by the store.
    pub const fn layout(&self) -> RecordLayout {
        self.layout
    }

    /// Cursor over the entries before the tail.
    pub fn view(&self) -> RegionView<'a> {
        RegionView::new(self.image, self.tail, self.layout)
    }

    /// Entry at `offset`, if well-formed.
    pub fn entry_at(&self, offset: usize) -> Option<EntryRef<'a>> {
        self.view().entry_at(offset)
    }

    /// Bytes used by entries whose state satisfies `counted`.
    pub fn occupied_by<F>(&self, mut counted: F) -> usize
    where
        F: FnMut(&EntryRef<'a>) -> bool,
    {
        self.view()
            .entries()
            .filter(|entry| counted(entry))
            .map(|entry| entry.stored_len())
            .sum()
    }

    /// Bytes used by live entries.
    pub fn live_bytes(&self) -> usize {
        self.occupied_by(|entry| entry.state().is_live())
    }
}

/// Whether an entry can be seen in `phase`.
pub(crate) fn is_visible(entry: &EntryRef<'_>, phase: Phase) -> bool {
    phase == Phase::Boot || entry.attributes().is_runtime()
}

/// Whether an entry is live and can be seen in `phase`.
pub(crate) fn is_candidate(entry: &EntryRef<'_>, phase: Phase) -> bool {
    entry.state().is_live() && is_visible(entry, phase)
}

/// Erased image of `size` bytes with a formatted header.
pub fn formatted_image(size: usize) -> Result<Vec<u8>, FormatError> {
    if size < REGION_HEADER_SIZE {
        return Err(FormatError::TruncatedData {
            expected: REGION_HEADER_SIZE,
            actual: size,
        });
    }
    let mut image = vec![ERASED_BYTE; size];
    image[..REGION_HEADER_SIZE].copy_from_slice(&RegionHeader::formatted(size)?.to_bytes()?);
    Ok(image)
}

/// Offset one past the last well-formed entry of `image`.
pub(crate) fn scan_tail(image: &[u8], layout: RecordLayout) -> usize {
    RegionView::full(image, layout).scan_tail()
}

/// Whether any state past the tail would be lost.
///
/// A partially programmed entry past the tail leaves non-erased bytes.
pub(crate) fn has_dirty_tail(image: &[u8], tail: usize) -> bool {
    image
        .get(tail..)
        .is_some_and(|rest| !varstore_format::is_erased(rest))
}

/// Count of entries in each state, for logging.
pub(crate) fn state_counts(region: &Region<'_>) -> [usize; 4] {
    let mut counts = [0usize; 4];
    for entry in region.view().entries() {
        let slot = match entry.state() {
            EntryState::Erased => 0,
            EntryState::Added => 1,
            EntryState::InTransition => 2,
            EntryState::Deleted => 3,
        };
        counts[slot] += 1;
    }
    counts
}
