//! Key to entry resolution.
//!
//! Regions are scanned in the order given, entries in storage order. Only
//! live entries visible in the current phase take part. A key resolves to
//! its Added entry if there is one; otherwise to the last transitional
//! entry seen, which is the instance left behind by an interrupted update.

use varstore_format::{EntryRef, EntryState, VariableKey};

use crate::phase::Phase;
use crate::region::{Location, Region, is_candidate};

/// An entry resolved by the locator.
#[derive(Debug, Clone, Copy)]
pub struct Found<'a> {
    /// Where the entry lives
    pub location: Location,
    /// The entry itself
    pub entry: EntryRef<'a>,
}

/// Resolve `key` across `regions`.
///
/// An empty name matches the first candidate entry regardless of vendor.
pub fn find<'a>(regions: &[Region<'a>], key: &VariableKey, phase: Phase) -> Option<Found<'a>> {
    if key.name.is_empty() {
        return first(regions, phase);
    }
    find_by(regions, phase, |entry| entry.matches(key))
}

/// Resolve the key of an already located entry.
pub(crate) fn find_same_key<'a>(
    regions: &[Region<'a>],
    entry: &EntryRef<'_>,
    phase: Phase,
) -> Option<Found<'a>> {
    find_by(regions, phase, |candidate| candidate.same_key(entry))
}

fn first<'a>(regions: &[Region<'a>], phase: Phase) -> Option<Found<'a>> {
    regions.iter().find_map(|region| {
        region
            .view()
            .entries()
            .find(|entry| is_candidate(entry, phase))
            .map(|entry| Found {
                location: Location::new(region.kind(), entry.offset()),
                entry,
            })
    })
}

fn find_by<'a, F>(regions: &[Region<'a>], phase: Phase, mut matches: F) -> Option<Found<'a>>
where
    F: FnMut(&EntryRef<'a>) -> bool,
{
    let mut fallback = None;

    for region in regions {
        for entry in region.view().entries() {
            if !is_candidate(&entry, phase) || !matches(&entry) {
                continue;
            }
            let found = Found {
                location: Location::new(region.kind(), entry.offset()),
                entry,
            };
            if entry.state() == EntryState::Added {
                return Some(found);
            }
            fallback = Some(found);
        }
    }

    fallback
}
