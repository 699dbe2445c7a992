//! Capacity reporting per attribute class.
//!
//! The non-volatile region is split between the common class and the
//! hardware error record partition:
//!
//! ```text
//! [header][common class: size - header - hw_error_storage_size][hw partition]
//! ```
//!
//! The split is a budget, not a physical boundary: entries of both classes
//! share the same append tail.

use serde::Serialize;
use varstore_format::{Attributes, ENTRY_HEADER_SIZE, EntryState, REGION_HEADER_SIZE};

use crate::config::StoreConfig;
use crate::media::NvMedia;
use crate::phase::{Phase, PhaseSource};
use crate::region::{Region, RegionKind};
use crate::store::VariableStore;
use crate::{Result, StoreError};

/// Capacity figures for one attribute class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageInfo {
    /// Bytes available to the class in total
    pub max_storage: usize,
    /// Bytes not yet used by the class
    pub remaining: usize,
    /// Largest data size a single new entry could hold
    pub max_entry_size: usize,
}

/// Bytes of `kind` that entries of the given class may use.
pub(crate) const fn class_capacity(
    kind: RegionKind,
    region_size: usize,
    config: &StoreConfig,
    hw_error: bool,
) -> usize {
    let usable = region_size.saturating_sub(REGION_HEADER_SIZE);
    match (kind, hw_error) {
        (RegionKind::NonVolatile, true) => config.hw_error_storage_size,
        (RegionKind::NonVolatile, false) => usable.saturating_sub(config.hw_error_storage_size),
        (RegionKind::Volatile, _) => usable,
    }
}

/// Bytes of a class currently counted as used.
///
/// At boot, Added and InTransition entries count. At runtime every entry
/// whose Added bit is cleared counts, Deleted ones included, since their
/// space only comes back with a reclaim. Uncommitted headers never count.
pub(crate) fn class_occupied(region: &Region<'_>, hw_error: bool, phase: Phase) -> usize {
    region.occupied_by(|entry| {
        let counted = match phase {
            Phase::Boot => entry.state().is_live(),
            Phase::Runtime => entry.state() != EntryState::Erased,
        };
        counted && entry.attributes().is_hw_error_record() == hw_error
    })
}

fn validate_query(attributes: Attributes, phase: Phase) -> Result<()> {
    let reject = |reason: &str| Err(StoreError::InvalidArgument(format!("{attributes}: {reason}")));

    if attributes.value & Attributes::KNOWN == 0 {
        return reject("no known attribute set");
    }
    if attributes.value & !Attributes::KNOWN != 0 {
        return reject("unsupported attribute bits");
    }
    if attributes.is_runtime_without_boot() {
        return reject("runtime access requires boot service access");
    }
    if phase == Phase::Runtime && !attributes.is_runtime() {
        return reject("only runtime classes can be queried at runtime");
    }
    if attributes.is_hw_error_record() && !attributes.is_non_volatile() {
        return reject("error records must be non-volatile");
    }
    Ok(())
}

impl<M: NvMedia, P: PhaseSource> VariableStore<M, P> {
    /// Report capacity for the class selected by `attributes`.
    pub fn query_info(&self, attributes: Attributes) -> Result<StorageInfo> {
        let phase = self.phase();
        validate_query(attributes, phase)?;

        let kind = RegionKind::for_attributes(attributes);
        let region = self.region(kind);
        let hw_error = attributes.is_hw_error_record();

        let max_storage = class_capacity(kind, region.size(), &self.config, hw_error);
        let remaining = max_storage.saturating_sub(class_occupied(&region, hw_error, phase));
        let class_max = self.layout.class_max(attributes);
        let max_entry_size = if remaining < ENTRY_HEADER_SIZE {
            0
        } else {
            class_max
                .saturating_sub(ENTRY_HEADER_SIZE)
                .min(remaining - ENTRY_HEADER_SIZE)
        };

        Ok(StorageInfo {
            max_storage,
            remaining,
            max_entry_size,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::MemoryMedia;
    use pretty_assertions::assert_eq;
    use varstore_format::{GLOBAL_VARIABLE_GUID, VariableKey};

    fn store(config: StoreConfig) -> VariableStore<MemoryMedia> {
        VariableStore::open(config, MemoryMedia::new(4096)).expect("open")
    }

    #[test]
    fn test_empty_store() {
        let store = store(StoreConfig::default());
        let info = store.query_info(Attributes::nv_bs_rt()).expect("info");
        assert_eq!(
            info,
            StorageInfo {
                max_storage: 4096 - 16,
                remaining: 4096 - 16,
                max_entry_size: 1024 - 32,
            }
        );

        let info = store
            .query_info(Attributes::new(Attributes::BOOTSERVICE_ACCESS))
            .expect("info");
        assert_eq!(info.max_storage, 64 * 1024 - 16);
    }

    #[test]
    fn test_usage_is_counted() {
        let mut store = store(StoreConfig::default());
        store
            .set("BootOrder", GLOBAL_VARIABLE_GUID, Attributes::nv_bs_rt(), &[1; 100])
            .expect("set");
        let entry = 32 + 20 + 100;

        let info = store.query_info(Attributes::nv_bs_rt()).expect("info");
        assert_eq!(info.remaining, 4096 - 16 - entry);

        // Deleted entries stop counting at boot but still count at runtime.
        store
            .set("BootOrder", GLOBAL_VARIABLE_GUID, Attributes::nv_bs_rt(), &[])
            .expect("delete");
        let info = store.query_info(Attributes::nv_bs_rt()).expect("info");
        assert_eq!(info.remaining, 4096 - 16);

        store.enter_runtime();
        let info = store.query_info(Attributes::nv_bs_rt()).expect("info");
        assert_eq!(info.remaining, 4096 - 16 - entry);
    }

    #[test]
    fn test_occupancy_depends_on_phase() {
        let mut store = store(StoreConfig::default());
        let g = GLOBAL_VARIABLE_GUID;
        store.set("A", g, Attributes::nv_bs_rt(), &[1; 100]).expect("create");
        store.set("A", g, Attributes::nv_bs_rt(), &[2; 50]).expect("update");
        store.set("B", g, Attributes::nv_bs_rt(), &[3; 10]).expect("create");
        store.set("B", g, Attributes::nv_bs_rt(), &[]).expect("delete");

        // An entry whose state byte was never programmed.
        let key = VariableKey::parse(g, "C").expect("key");
        let bytes = store
            .layout
            .encode_entry(EntryState::Erased, Attributes::nv_bs_rt(), &key, &[4; 20])
            .expect("encode");
        let tail = store.tail(RegionKind::NonVolatile);
        store.write(RegionKind::NonVolatile, tail, &bytes).expect("write");
        store.set_tail(RegionKind::NonVolatile, tail + bytes.len());

        let old = 32 + 4 + 100;
        let current = 32 + 4 + 50;
        let deleted = 32 + 4 + 10;

        // Boot: Added and InTransition.
        let info = store.query_info(Attributes::nv_bs_rt()).expect("info");
        assert_eq!(info.remaining, 4096 - 16 - old - current);

        // Runtime: Deleted entries as well, never the uncommitted one.
        store.enter_runtime();
        let info = store.query_info(Attributes::nv_bs_rt()).expect("info");
        assert_eq!(info.remaining, 4096 - 16 - old - current - deleted);
    }

    #[test]
    fn test_hw_error_partition() {
        let store = store(StoreConfig::default().with_hw_error_storage_size(1024));
        let common = store.query_info(Attributes::nv_bs_rt()).expect("info");
        assert_eq!(common.max_storage, 4096 - 16 - 1024);

        let mut hw = Attributes::nv_bs_rt();
        hw.set(Attributes::HARDWARE_ERROR_RECORD);
        let info = store.query_info(hw).expect("info");
        assert_eq!(info.max_storage, 1024);
        assert_eq!(info.max_entry_size, 1024 - 32);
    }

    #[test]
    fn test_max_entry_size_clipped() {
        let store = store(StoreConfig::default().with_hw_error_storage_size(40));
        let mut hw = Attributes::nv_bs_rt();
        hw.set(Attributes::HARDWARE_ERROR_RECORD);
        assert_eq!(store.query_info(hw).expect("info").max_entry_size, 8);

        let store = self::store(StoreConfig::default().with_hw_error_storage_size(16));
        assert_eq!(store.query_info(hw).expect("info").max_entry_size, 0);
    }

    #[test]
    fn test_invalid_queries() {
        let store = store(StoreConfig::default());
        for value in [
            0,
            Attributes::RUNTIME_ACCESS,
            Attributes::BOOTSERVICE_ACCESS | Attributes::HARDWARE_ERROR_RECORD,
            Attributes::BOOTSERVICE_ACCESS | 0x40,
        ] {
            assert!(
                matches!(
                    store.query_info(Attributes::new(value)),
                    Err(StoreError::InvalidArgument(_))
                ),
                "{value:#x} should be rejected"
            );
        }

        store.enter_runtime();
        assert!(matches!(
            store.query_info(Attributes::new(
                Attributes::NON_VOLATILE | Attributes::BOOTSERVICE_ACCESS
            )),
            Err(StoreError::InvalidArgument(_))
        ));
        store.query_info(Attributes::nv_bs_rt()).expect("runtime class");
    }
}
