//! Create, update and delete.
//!
//! An update never overwrites an entry. The old entry is narrowed to
//! InTransition and the new one is appended at the tail of the region its
//! attributes select. Non-volatile appends program the whole entry with an
//! erased state byte first and commit it by programming the state byte
//! last.
//!
//! ```text
//! old: Added ──► InTransition
//! new:                         Erased ──► (state byte) Added
//! ```
//!
//! Within one region the superseded entry keeps its transitional state: the
//! locator prefers the later Added entry and a reclaim drops the old one.
//! When the entry moves to the other region the old instance is narrowed to
//! Deleted after the append, since a reclaim only looks for newer entries in
//! the same region. A delete narrows every live instance of the key.
//!
//! An interruption at any point leaves either the old or the new entry
//! resolvable by the locator.

use tracing::{debug, trace};
use uguid::Guid;
use varstore_format::{Attributes, EntryState, HW_ERROR_NAME_PREFIX, STATE_OFFSET, VariableKey};

use crate::locator::find;
use crate::media::NvMedia;
use crate::phase::{Phase, PhaseSource};
use crate::region::{Location, RegionKind};
use crate::space::class_capacity;
use crate::store::{VariableStore, named_key};
use crate::{Result, StoreError};

/// What the locator found for the key being written.
#[derive(Debug, Clone, Copy)]
struct Existing {
    location: Location,
    unchanged: bool,
}

fn invalid(reason: impl Into<String>) -> StoreError {
    StoreError::InvalidArgument(reason.into())
}

impl<M: NvMedia, P: PhaseSource> VariableStore<M, P> {
    /// Create, update or delete a variable.
    ///
    /// Empty `data`, or attributes without any access bit, delete the
    /// variable.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty name, inconsistent attributes, an
    ///   entry over the class size limit, or a runtime write of an entry
    ///   that is not both non-volatile and runtime-visible, or of a
    ///   non-volatile entry hidden at runtime
    /// - `NotFound` when deleting a variable that does not exist
    /// - `WriteProtected` when changing a volatile variable at runtime, even
    ///   one that is hidden at runtime
    /// - `OutOfResources` when the entry does not fit even after a reclaim
    pub fn set(&mut self, name: &str, vendor: Guid, attributes: Attributes, data: &[u8]) -> Result<()> {
        let key = named_key(name, vendor)?;
        let phase = self.phase();
        let deleting = data.is_empty() || !attributes.grants_access();
        let size = self.validate_set(&key, attributes, data.len(), deleting)?;

        let regions = self.regions();
        let existing = find(&regions, &key, phase).map(|found| Existing {
            location: found.location,
            unchanged: found.entry.state() == EntryState::Added
                && found.entry.attributes() == attributes
                && found.entry.data() == data,
        });
        if phase == Phase::Runtime {
            // Entries hidden at runtime still decide what a write may do.
            match find(&regions, &key, Phase::Boot) {
                Some(found) if found.location.kind == RegionKind::Volatile => {
                    return Err(StoreError::WriteProtected);
                }
                Some(_) if existing.is_none() => {
                    return Err(invalid(format!("{key} is not visible at runtime")));
                }
                _ => {}
            }
        }

        let runtime_create_ok = attributes.is_non_volatile() && attributes.is_runtime();
        if let Some(existing) = existing {
            if deleting {
                self.retire(&key, existing.location)?;
                debug!("Deleted {key}");
                return Ok(());
            }
            if phase == Phase::Runtime && !runtime_create_ok {
                return Err(invalid(format!(
                    "{attributes} cannot be written at runtime"
                )));
            }
            if existing.unchanged {
                trace!("{key} unchanged");
                return Ok(());
            }
        } else {
            if deleting {
                return Err(StoreError::NotFound);
            }
            if phase == Phase::Runtime && !runtime_create_ok {
                return Err(invalid(format!(
                    "{attributes} cannot be created at runtime"
                )));
            }
        }

        let target = RegionKind::for_attributes(attributes);
        let mut superseded = existing.map(|existing| existing.location);

        if !self.has_room(target, attributes, size) {
            let updating = superseded
                .filter(|location| location.kind == target)
                .map(|location| location.offset);
            let outcome = self.reclaim(target, updating)?;
            if updating.is_some() {
                superseded = outcome
                    .preserved_offset
                    .map(|offset| Location::new(target, offset));
            }
            if !self.has_room(target, attributes, size) {
                return Err(StoreError::OutOfResources(format!(
                    "{size} byte entry does not fit in the {target} region"
                )));
            }
        }

        if let Some(location) = superseded {
            self.narrow_state(location, EntryState::InTransition)?;
        }
        let offset = self.append(target, &key, attributes, data)?;
        debug!("Wrote {key} ({} bytes) at {target} {offset:#x}", data.len());

        let moved: Vec<Location> = self
            .live_instances(&key)
            .into_iter()
            .filter(|location| location.kind != target)
            .collect();
        for location in moved {
            self.narrow_state(location, EntryState::Deleted)?;
        }
        Ok(())
    }

    /// Every live entry of `key`, in search order.
    fn live_instances(&self, key: &VariableKey) -> Vec<Location> {
        let mut found = Vec::new();
        for region in self.regions() {
            for entry in region.view().entries() {
                if entry.state().is_live() && entry.matches(key) {
                    found.push(Location::new(region.kind(), entry.offset()));
                }
            }
        }
        found
    }

    /// Narrow every live instance of `key` to Deleted.
    ///
    /// The resolved entry goes last, so an interruption never leaves an
    /// older instance as the only live one.
    fn retire(&mut self, key: &VariableKey, resolved: Location) -> Result<()> {
        let mut stale = self.live_instances(key);
        stale.retain(|location| *location != resolved);
        for location in stale.into_iter().chain(std::iter::once(resolved)) {
            self.narrow_state(location, EntryState::Deleted)?;
        }
        Ok(())
    }

    /// Check the request and return the stored size of the new entry.
    fn validate_set(
        &self,
        key: &VariableKey,
        attributes: Attributes,
        data_len: usize,
        deleting: bool,
    ) -> Result<usize> {
        if attributes.value & !Attributes::KNOWN != 0 {
            return Err(invalid(format!("unsupported attributes {attributes}")));
        }
        if attributes.is_runtime_without_boot() {
            return Err(invalid("runtime access requires boot service access"));
        }
        if attributes.is_hw_error_record() {
            if !key.name.starts_with(HW_ERROR_NAME_PREFIX) {
                return Err(invalid(format!(
                    "error record names must start with {HW_ERROR_NAME_PREFIX}"
                )));
            }
            if !deleting && !attributes.is_non_volatile() {
                return Err(invalid("error records must be non-volatile"));
            }
        }

        let size = self.layout.entry_size(key.name.encoded_len(), data_len);
        let limit = self.layout.class_max(attributes);
        if size > limit {
            return Err(invalid(format!(
                "entry of {size} bytes exceeds the {limit} byte limit"
            )));
        }
        Ok(size)
    }

    /// Whether a new entry of `size` bytes fits in its class budget.
    fn has_room(&self, kind: RegionKind, attributes: Attributes, size: usize) -> bool {
        let region = self.region(kind);
        let Some(end) = region.tail().checked_add(size) else {
            return false;
        };
        if end > region.size() || !varstore_format::is_erased(&region.image()[region.tail()..end]) {
            return false;
        }

        let hw_error = attributes.is_hw_error_record();
        let used = region.occupied_by(|entry| entry.attributes().is_hw_error_record() == hw_error);
        used + size <= class_capacity(kind, region.size(), &self.config, hw_error)
    }

    /// Append a committed entry at the tail of `kind` and return its offset.
    fn append(
        &mut self,
        kind: RegionKind,
        key: &VariableKey,
        attributes: Attributes,
        data: &[u8],
    ) -> Result<usize> {
        let offset = self.tail(kind);
        match kind {
            RegionKind::NonVolatile => {
                let bytes = self
                    .layout
                    .encode_entry(EntryState::Erased, attributes, key, data)?;
                self.write(kind, offset, &bytes)?;
                self.write(kind, offset + STATE_OFFSET, &[EntryState::Added.to_byte()])?;
                self.set_tail(kind, offset + bytes.len());
            }
            RegionKind::Volatile => {
                let bytes = self
                    .layout
                    .encode_entry(EntryState::Added, attributes, key, data)?;
                self.write(kind, offset, &bytes)?;
                self.set_tail(kind, offset + bytes.len());
            }
        }
        Ok(offset)
    }
}
