//! Ordered walk over live keys.
//!
//! The walk visits the non-volatile region first, then the volatile one.
//! A transitional entry is yielded only when the locator resolves its key
//! to that very entry, so every key shows up once per pass.

use varstore_format::{EntryState, RegionView, VariableKey};

use crate::locator::{Found, find, find_same_key};
use crate::phase::Phase;
use crate::region::{Location, Region, is_candidate};

/// Iterator over the live entries of a set of regions.
#[derive(Debug, Clone)]
pub struct Enumerator<'a> {
    regions: Vec<Region<'a>>,
    phase: Phase,
    region_index: usize,
    offset: Option<usize>,
}

impl<'a> Enumerator<'a> {
    /// Start at the first entry of the first region.
    pub fn new(regions: impl Into<Vec<Region<'a>>>, phase: Phase) -> Self {
        Self {
            regions: regions.into(),
            phase,
            region_index: 0,
            offset: None,
        }
    }

    /// Start right after the entry `previous` resolves to.
    ///
    /// An empty name starts from the beginning. Returns `None` if
    /// `previous` does not resolve.
    pub fn after(
        regions: impl Into<Vec<Region<'a>>>,
        phase: Phase,
        previous: &VariableKey,
    ) -> Option<Self> {
        let mut walk = Self::new(regions, phase);
        if previous.name.is_empty() {
            return Some(walk);
        }

        let found = find(&walk.regions, previous, phase)?;
        walk.seek(found.location, found.entry.end());
        Some(walk)
    }

    fn seek(&mut self, location: Location, offset: usize) {
        if let Some(index) = self.regions.iter().position(|r| r.kind() == location.kind) {
            self.region_index = index;
            self.offset = Some(offset);
        }
    }

    fn yields(&self, found: &Found<'a>) -> bool {
        if !is_candidate(&found.entry, self.phase) {
            return false;
        }
        if found.entry.state() == EntryState::Added {
            return true;
        }
        find_same_key(&self.regions, &found.entry, self.phase)
            .is_some_and(|resolved| resolved.location == found.location)
    }
}

impl<'a> Iterator for Enumerator<'a> {
    type Item = Found<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(region) = self.regions.get(self.region_index).copied() {
            let start = self.offset.unwrap_or_else(RegionView::first_offset);

            for entry in region.view().entries_from(start) {
                self.offset = Some(entry.end());
                let found = Found {
                    location: Location::new(region.kind(), entry.offset()),
                    entry,
                };
                if self.yields(&found) {
                    return Some(found);
                }
            }

            self.region_index += 1;
            self.offset = None;
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::region::{RegionKind, formatted_image, scan_tail};
    use varstore_format::{Attributes, GLOBAL_VARIABLE_GUID, RecordLayout};

    fn push(image: &mut [u8], name: &str, attrs: u32, state: EntryState) {
        let layout = RecordLayout::default();
        let tail = scan_tail(image, layout);
        let key = VariableKey::parse(GLOBAL_VARIABLE_GUID, name).expect("key");
        let bytes = layout
            .encode_entry(state, Attributes::new(attrs), &key, b"v")
            .expect("encode");
        image[tail..tail + bytes.len()].copy_from_slice(&bytes);
    }

    fn regions<'a>(nv: &'a [u8], volatile: &'a [u8]) -> Vec<Region<'a>> {
        let layout = RecordLayout::default();
        vec![
            Region::new(RegionKind::NonVolatile, nv, scan_tail(nv, layout), layout),
            Region::new(RegionKind::Volatile, volatile, scan_tail(volatile, layout), layout),
        ]
    }

    fn names(walk: Enumerator<'_>) -> Vec<String> {
        walk.map(|found| found.entry.key().expect("key").name.to_string())
            .collect()
    }

    #[test]
    fn test_walks_both_regions_in_order() {
        let mut nv = formatted_image(1024).expect("nv");
        let mut volatile = formatted_image(1024).expect("volatile");
        push(&mut nv, "A", 7, EntryState::Added);
        push(&mut nv, "Dead", 7, EntryState::Deleted);
        push(&mut nv, "B", 7, EntryState::Added);
        push(&mut volatile, "C", 6, EntryState::Added);

        let walk = Enumerator::new(regions(&nv, &volatile), Phase::Boot);
        assert_eq!(names(walk), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_transitional_key_yielded_once() {
        let mut nv = formatted_image(1024).expect("nv");
        let volatile = formatted_image(1024).expect("volatile");
        push(&mut nv, "A", 7, EntryState::InTransition);
        push(&mut nv, "B", 7, EntryState::InTransition);
        push(&mut nv, "A", 7, EntryState::Added);

        let walk = Enumerator::new(regions(&nv, &volatile), Phase::Boot);
        assert_eq!(names(walk), vec!["B", "A"]);
    }

    #[test]
    fn test_resume_after_key() {
        let mut nv = formatted_image(1024).expect("nv");
        let mut volatile = formatted_image(1024).expect("volatile");
        push(&mut nv, "A", 7, EntryState::Added);
        push(&mut nv, "B", 7, EntryState::Added);
        push(&mut volatile, "C", 6, EntryState::Added);

        let regions = regions(&nv, &volatile);
        let previous = VariableKey::parse(GLOBAL_VARIABLE_GUID, "B").expect("key");
        let walk = Enumerator::after(regions.clone(), Phase::Boot, &previous).expect("resolves");
        assert_eq!(names(walk), vec!["C"]);

        let unknown = VariableKey::parse(GLOBAL_VARIABLE_GUID, "Z").expect("key");
        assert!(Enumerator::after(regions.clone(), Phase::Boot, &unknown).is_none());

        let restart = VariableKey::parse(GLOBAL_VARIABLE_GUID, "").expect("key");
        let walk = Enumerator::after(regions, Phase::Boot, &restart).expect("restart");
        assert_eq!(names(walk), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_runtime_hides_boot_only_entries() {
        let mut nv = formatted_image(1024).expect("nv");
        let mut volatile = formatted_image(1024).expect("volatile");
        push(&mut nv, "BootOnly", 3, EntryState::Added);
        push(&mut nv, "Shared", 7, EntryState::Added);
        push(&mut volatile, "VolatileBoot", 2, EntryState::Added);

        let walk = Enumerator::new(regions(&nv, &volatile), Phase::Runtime);
        assert_eq!(names(walk), vec!["Shared"]);
    }
}
