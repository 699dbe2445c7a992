//! The variable store context.
//!
//! [`VariableStore`] owns the non-volatile media, the volatile region image
//! and the tail of each region. Reads go through the locator and the
//! enumerator; writes live in the mutator and reclaim modules.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uguid::Guid;
use varstore_format::{
    Attributes, EntryRef, EntryState, REGION_HEADER_SIZE, RecordLayout, RegionHeader,
    STATE_OFFSET, VariableKey, VariableName, is_erased,
};

use crate::config::StoreConfig;
use crate::enumerator::Enumerator;
use crate::locator::find;
use crate::media::{MediaError, NvMedia};
use crate::phase::{Phase, PhaseLatch, PhaseSource};
use crate::region::{
    Location, Region, RegionKind, formatted_image, has_dirty_tail, scan_tail, state_counts,
};
use crate::{Result, StoreError};

/// An owned copy of a stored variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Vendor and name
    pub key: VariableKey,
    /// Attribute flags
    pub attributes: Attributes,
    /// Stored data
    pub data: Vec<u8>,
}

impl Variable {
    fn from_entry(entry: &EntryRef<'_>) -> Result<Self> {
        Ok(Self {
            key: entry.key()?,
            attributes: entry.attributes(),
            data: entry.data().to_vec(),
        })
    }
}

/// Dual-region variable store.
///
/// Mutations take `&mut self`; callers that share a store across threads
/// wrap it in their own lock.
#[derive(Debug)]
pub struct VariableStore<M, P = PhaseLatch> {
    pub(crate) config: StoreConfig,
    pub(crate) layout: RecordLayout,
    pub(crate) media: M,
    pub(crate) nv_tail: usize,
    pub(crate) volatile: Vec<u8>,
    pub(crate) volatile_tail: usize,
    pub(crate) phase: Arc<P>,
}

impl<M: NvMedia> VariableStore<M, PhaseLatch> {
    /// Open a store in the boot phase.
    pub fn open(config: StoreConfig, media: M) -> Result<Self> {
        Self::open_with_phase(config, media, Arc::new(PhaseLatch::new()))
    }

    /// Leave the boot phase. There is no way back.
    pub fn enter_runtime(&self) {
        if self.phase.phase() == Phase::Boot {
            info!("Entering runtime phase");
        }
        self.phase.enter_runtime();
    }
}

impl<M: NvMedia, P: PhaseSource> VariableStore<M, P> {
    /// Open a store whose phase is driven by `phase`.
    ///
    /// Erased media is formatted. A region with an interrupted write past
    /// its last entry, or with less free space than the configured
    /// threshold, is reclaimed before the store is returned.
    pub fn open_with_phase(config: StoreConfig, mut media: M, phase: Arc<P>) -> Result<Self> {
        let size = media.size();
        config.validate_for(size)?;
        let layout = config.layout()?;

        if is_erased(&media.image()[..REGION_HEADER_SIZE]) {
            info!("Formatting {size} byte non-volatile region");
            media.program(0, &RegionHeader::formatted(size)?.to_bytes()?)?;
        } else {
            RegionHeader::from_bytes(media.image())?.validate(size)?;
        }

        let nv_tail = scan_tail(media.image(), layout);
        let volatile = formatted_image(config.volatile_size)?;

        let mut store = Self {
            config,
            layout,
            media,
            nv_tail,
            volatile,
            volatile_tail: REGION_HEADER_SIZE,
            phase,
        };

        let region = store.region(RegionKind::NonVolatile);
        let [uncommitted, added, transition, deleted] = state_counts(&region);
        debug!(
            "Non-volatile region: tail {nv_tail:#x}, {added} added, {transition} in transition, {deleted} deleted, {uncommitted} uncommitted"
        );

        let dirty = has_dirty_tail(region.image(), nv_tail);
        let low = region.free_space() < store.config.reclaim_threshold
            && region.occupied_by(|entry| entry.state() != EntryState::Added) > 0;
        if dirty || low {
            if dirty {
                warn!("Interrupted write found past offset {nv_tail:#x}, reclaiming");
            } else {
                info!(
                    "Free space {} below threshold {}, reclaiming",
                    region.free_space(),
                    store.config.reclaim_threshold
                );
            }
            store.reclaim(RegionKind::NonVolatile, None)?;
        }

        Ok(store)
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase.phase()
    }

    /// Store configuration.
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Non-volatile media.
    pub const fn media(&self) -> &M {
        &self.media
    }

    /// Give back the non-volatile media.
    pub fn into_media(self) -> M {
        self.media
    }

    /// View of one region.
    pub fn region(&self, kind: RegionKind) -> Region<'_> {
        match kind {
            RegionKind::NonVolatile => {
                Region::new(kind, self.media.image(), self.nv_tail, self.layout)
            }
            RegionKind::Volatile => Region::new(kind, &self.volatile, self.volatile_tail, self.layout),
        }
    }

    /// Both regions in search order.
    pub(crate) fn regions(&self) -> [Region<'_>; 2] {
        RegionKind::SEARCH_ORDER.map(|kind| self.region(kind))
    }

    /// Read a variable into `buf`.
    ///
    /// Returns the attributes and the data size. If `buf` is too short,
    /// nothing is copied and the required size is reported.
    pub fn get(&self, name: &str, vendor: Guid, buf: &mut [u8]) -> Result<(Attributes, usize)> {
        let key = named_key(name, vendor)?;
        let found = find(&self.regions(), &key, self.phase()).ok_or(StoreError::NotFound)?;

        let data = found.entry.data();
        if buf.len() < data.len() {
            return Err(StoreError::BufferTooSmall {
                required: data.len(),
            });
        }
        buf[..data.len()].copy_from_slice(data);
        Ok((found.entry.attributes(), data.len()))
    }

    /// Read a variable into an owned value.
    pub fn get_variable(&self, name: &str, vendor: Guid) -> Result<Variable> {
        let key = named_key(name, vendor)?;
        let found = find(&self.regions(), &key, self.phase()).ok_or(StoreError::NotFound)?;
        Variable::from_entry(&found.entry)
    }

    /// Key following `name`/`vendor` in enumeration order.
    ///
    /// An empty name returns the first key. Returns `NotFound` once every
    /// key has been visited or if `name`/`vendor` is not a stored key.
    pub fn get_next(&self, name: &str, vendor: Guid) -> Result<VariableKey> {
        let previous = key_of(name, vendor)?;
        let found = Enumerator::after(self.regions(), self.phase(), &previous)
            .and_then(|mut walk| walk.next())
            .ok_or(StoreError::NotFound)?;
        Ok(found.entry.key()?)
    }

    /// Every visible variable, in enumeration order.
    pub fn variables(&self) -> impl Iterator<Item = Result<Variable>> + '_ {
        Enumerator::new(self.regions(), self.phase()).map(|found| Variable::from_entry(&found.entry))
    }

    /// Every visible key, in enumeration order.
    pub fn keys(&self) -> impl Iterator<Item = Result<VariableKey>> + '_ {
        Enumerator::new(self.regions(), self.phase())
            .map(|found| found.entry.key().map_err(StoreError::from))
    }

    pub(crate) const fn tail(&self, kind: RegionKind) -> usize {
        match kind {
            RegionKind::NonVolatile => self.nv_tail,
            RegionKind::Volatile => self.volatile_tail,
        }
    }

    pub(crate) fn set_tail(&mut self, kind: RegionKind, tail: usize) {
        match kind {
            RegionKind::NonVolatile => self.nv_tail = tail,
            RegionKind::Volatile => self.volatile_tail = tail,
        }
    }

    /// Write bytes into a region.
    pub(crate) fn write(&mut self, kind: RegionKind, offset: usize, bytes: &[u8]) -> Result<()> {
        match kind {
            RegionKind::NonVolatile => self.media.program(offset, bytes)?,
            RegionKind::Volatile => {
                let size = self.volatile.len();
                let target = offset
                    .checked_add(bytes.len())
                    .and_then(|end| self.volatile.get_mut(offset..end))
                    .ok_or(MediaError::OutOfBounds {
                        offset,
                        len: bytes.len(),
                        size,
                    })?;
                target.copy_from_slice(bytes);
            }
        }
        Ok(())
    }

    /// Move the entry at `location` down the state lattice.
    pub(crate) fn narrow_state(&mut self, location: Location, to: EntryState) -> Result<()> {
        let at = location.offset + STATE_OFFSET;
        let raw = self
            .region(location.kind)
            .image()
            .get(at)
            .copied()
            .ok_or(MediaError::OutOfBounds {
                offset: at,
                len: 1,
                size: self.region(location.kind).size(),
            })?;

        let narrowed = EntryState::narrow(raw, to)?;
        if narrowed != raw {
            self.write(location.kind, at, &[narrowed])?;
        }
        Ok(())
    }
}

/// Build a key, rejecting names that cannot be stored.
pub(crate) fn key_of(name: &str, vendor: Guid) -> Result<VariableKey> {
    let name = VariableName::new(name).map_err(|e| StoreError::InvalidArgument(e.to_string()))?;
    Ok(VariableKey::new(vendor, name))
}

/// Build a key that must have a non-empty name.
pub(crate) fn named_key(name: &str, vendor: Guid) -> Result<VariableKey> {
    let key = key_of(name, vendor)?;
    if key.name.is_empty() {
        return Err(StoreError::InvalidArgument(
            "variable name must not be empty".to_string(),
        ));
    }
    Ok(key)
}
