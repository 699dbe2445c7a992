//! Region compaction.
//!
//! A fresh erased image of the same size is built from the live entries of
//! a region and then swapped in:
//!
//! - Added entries are copied verbatim
//! - a transitional entry is dropped if a later entry of the same key is
//!   still live, otherwise it is copied and promoted back to Added
//! - deleted and uncommitted entries are dropped
//!
//! The entry being replaced by an in-flight update keeps its transitional
//! state so that the update can finish against its new offset. The
//! non-volatile region is swapped with a single [`NvMedia::atomic_replace`]
//! call; if that fails nothing has changed.

use tracing::{debug, info};
use varstore_format::{
    ERASED_BYTE, EntryRef, EntryState, FormatError, REGION_HEADER_SIZE, STATE_OFFSET,
};

use crate::media::NvMedia;
use crate::phase::PhaseSource;
use crate::region::{Region, RegionKind};
use crate::store::VariableStore;
use crate::Result;

/// Result of compacting a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimOutcome {
    /// Region that was compacted
    pub kind: RegionKind,
    /// Tail before compaction
    pub old_tail: usize,
    /// Tail after compaction
    pub new_tail: usize,
    /// New offset of the entry that was being replaced, if any
    pub preserved_offset: Option<usize>,
}

impl ReclaimOutcome {
    /// Bytes freed by the compaction.
    pub const fn reclaimed(&self) -> usize {
        self.old_tail.saturating_sub(self.new_tail)
    }
}

/// A compacted copy of a region image.
#[derive(Debug)]
pub(crate) struct Compacted {
    pub image: Vec<u8>,
    pub tail: usize,
    pub preserved_offset: Option<usize>,
    pub dropped: usize,
}

fn superseded(entry: &EntryRef<'_>, later: &[EntryRef<'_>]) -> bool {
    later
        .iter()
        .any(|other| other.state().is_live() && other.same_key(entry))
}

/// Build the compacted image of `region`.
///
/// `updating` is the offset of the entry being replaced. It keeps its state
/// and its new offset is reported.
pub(crate) fn compact_region(
    region: &Region<'_>,
    updating: Option<usize>,
) -> std::result::Result<Compacted, FormatError> {
    let source = region.image();
    if source.len() < REGION_HEADER_SIZE {
        return Err(FormatError::TruncatedData {
            expected: REGION_HEADER_SIZE,
            actual: source.len(),
        });
    }

    let mut image = vec![ERASED_BYTE; source.len()];
    image[..REGION_HEADER_SIZE].copy_from_slice(&source[..REGION_HEADER_SIZE]);

    let entries: Vec<EntryRef<'_>> = region.view().entries().collect();
    let mut tail = REGION_HEADER_SIZE;
    let mut preserved_offset = None;
    let mut dropped = 0;

    for (i, entry) in entries.iter().enumerate() {
        let keep = match entry.state() {
            EntryState::Added => true,
            EntryState::InTransition => !superseded(entry, &entries[i + 1..]),
            EntryState::Deleted | EntryState::Erased => false,
        };
        if !keep {
            dropped += 1;
            continue;
        }

        let len = entry.stored_len();
        image[tail..tail + len].copy_from_slice(&source[entry.offset()..entry.end()]);

        if updating == Some(entry.offset()) {
            preserved_offset = Some(tail);
        } else if entry.state() == EntryState::InTransition {
            image[tail + STATE_OFFSET] = EntryState::Added.to_byte();
        }
        tail += len;
    }

    Ok(Compacted {
        image,
        tail,
        preserved_offset,
        dropped,
    })
}

impl<M: NvMedia, P: PhaseSource> VariableStore<M, P> {
    /// Compact a region, dropping dead entries.
    pub fn compact(&mut self, kind: RegionKind) -> Result<ReclaimOutcome> {
        self.reclaim(kind, None)
    }

    /// Compact a region while an update of the entry at `updating` is in
    /// flight.
    pub(crate) fn reclaim(
        &mut self,
        kind: RegionKind,
        updating: Option<usize>,
    ) -> Result<ReclaimOutcome> {
        let old_tail = self.tail(kind);
        let Compacted {
            image,
            tail,
            preserved_offset,
            dropped,
        } = compact_region(&self.region(kind), updating)?;

        match kind {
            RegionKind::NonVolatile => self.media.atomic_replace(&image)?,
            RegionKind::Volatile => self.volatile = image,
        }
        self.set_tail(kind, tail);

        let outcome = ReclaimOutcome {
            kind,
            old_tail,
            new_tail: tail,
            preserved_offset,
        };
        info!(
            "Reclaimed {} bytes from {kind} region ({dropped} entries dropped)",
            outcome.reclaimed()
        );
        if let Some(offset) = preserved_offset {
            debug!("Entry under update moved to {offset:#x}");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::region::{formatted_image, scan_tail};
    use varstore_format::{Attributes, GLOBAL_VARIABLE_GUID, RecordLayout, RegionView, VariableKey};

    fn push(image: &mut [u8], name: &str, data: &[u8], state: EntryState) -> usize {
        let layout = RecordLayout::default();
        let tail = scan_tail(image, layout);
        let key = VariableKey::parse(GLOBAL_VARIABLE_GUID, name).expect("key");
        let bytes = layout
            .encode_entry(state, Attributes::nv_bs_rt(), &key, data)
            .expect("encode");
        image[tail..tail + bytes.len()].copy_from_slice(&bytes);
        tail
    }

    fn summary(image: &[u8]) -> Vec<(String, Vec<u8>, EntryState)> {
        RegionView::full(image, RecordLayout::default())
            .entries()
            .map(|entry| {
                (
                    entry.key().expect("key").name.to_string(),
                    entry.data().to_vec(),
                    entry.state(),
                )
            })
            .collect()
    }

    fn region(image: &[u8]) -> Region<'_> {
        let layout = RecordLayout::default();
        Region::new(RegionKind::NonVolatile, image, scan_tail(image, layout), layout)
    }

    #[test]
    fn test_drops_dead_entries() {
        let mut image = formatted_image(1024).expect("image");
        push(&mut image, "A", b"old", EntryState::Deleted);
        push(&mut image, "B", b"keep", EntryState::Added);
        push(&mut image, "C", b"half", EntryState::Erased);
        push(&mut image, "A", b"new", EntryState::Added);

        let compacted = compact_region(&region(&image), None).expect("compact");
        assert_eq!(compacted.dropped, 2);
        assert_eq!(&compacted.image[..REGION_HEADER_SIZE], &image[..REGION_HEADER_SIZE]);
        assert_eq!(
            summary(&compacted.image),
            vec![
                ("B".to_string(), b"keep".to_vec(), EntryState::Added),
                ("A".to_string(), b"new".to_vec(), EntryState::Added),
            ]
        );
        assert_eq!(compacted.tail, scan_tail(&compacted.image, RecordLayout::default()));
    }

    #[test]
    fn test_transition_resolution() {
        let mut image = formatted_image(1024).expect("image");
        push(&mut image, "A", b"stale", EntryState::InTransition);
        push(&mut image, "B", b"orphan", EntryState::InTransition);
        push(&mut image, "A", b"fresh", EntryState::Added);

        let compacted = compact_region(&region(&image), None).expect("compact");
        assert_eq!(
            summary(&compacted.image),
            vec![
                ("B".to_string(), b"orphan".to_vec(), EntryState::Added),
                ("A".to_string(), b"fresh".to_vec(), EntryState::Added),
            ]
        );
    }

    #[test]
    fn test_updating_entry_keeps_transition() {
        let mut image = formatted_image(1024).expect("image");
        push(&mut image, "Dead", b"x", EntryState::Deleted);
        let updating = push(&mut image, "A", b"current", EntryState::InTransition);

        let compacted = compact_region(&region(&image), Some(updating)).expect("compact");
        assert_eq!(compacted.preserved_offset, Some(REGION_HEADER_SIZE));
        assert_eq!(
            summary(&compacted.image),
            vec![("A".to_string(), b"current".to_vec(), EntryState::InTransition)]
        );
    }

    #[test]
    fn test_updating_added_entry_is_tracked() {
        let mut image = formatted_image(1024).expect("image");
        push(&mut image, "A", b"older", EntryState::InTransition);
        push(&mut image, "Dead", b"x", EntryState::Deleted);
        let updating = push(&mut image, "A", b"current", EntryState::Added);

        let compacted = compact_region(&region(&image), Some(updating)).expect("compact");
        assert_eq!(compacted.preserved_offset, Some(REGION_HEADER_SIZE));
        assert_eq!(
            summary(&compacted.image),
            vec![("A".to_string(), b"current".to_vec(), EntryState::Added)]
        );
    }

    #[test]
    fn test_garbage_past_tail_is_erased() {
        let mut image = formatted_image(1024).expect("image");
        push(&mut image, "A", b"1", EntryState::Added);
        let tail = scan_tail(&image, RecordLayout::default());
        image[tail + 3] = 0x00;

        let compacted = compact_region(&region(&image), None).expect("compact");
        assert!(varstore_format::is_erased(&compacted.image[compacted.tail..]));
    }
}
