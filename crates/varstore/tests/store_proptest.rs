#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Property tests for the store against a map model
//!
//! Random sequences of writes, deletes, region moves and compactions are
//! applied both to a store and to a `BTreeMap`. After every step the store
//! must agree with the model, hold at most one Added entry per key and
//! never hold live entries of one key in both regions.

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use varstore::{MemoryMedia, RegionKind, StoreConfig, StoreError, VariableStore};
use varstore_format::{Attributes, EntryState, GLOBAL_VARIABLE_GUID, Guid, VariableKey, guid};

const VENDORS: [Guid; 2] = [
    GLOBAL_VARIABLE_GUID,
    guid!("5b446ed1-e30b-4faa-871a-3654eca36080"),
];
const NAMES: [&str; 4] = ["Boot0000", "BootOrder", "Lang", "Timeout"];

#[derive(Debug, Clone)]
enum Op {
    Set {
        name: usize,
        vendor: usize,
        non_volatile: bool,
        data: Vec<u8>,
    },
    Compact(bool),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..NAMES.len(), 0..VENDORS.len(), any::<bool>(), prop::collection::vec(any::<u8>(), 0..48))
            .prop_map(|(name, vendor, non_volatile, data)| Op::Set { name, vendor, non_volatile, data }),
        1 => any::<bool>().prop_map(Op::Compact),
    ]
}

fn attributes(non_volatile: bool) -> Attributes {
    if non_volatile {
        Attributes::nv_bs_rt()
    } else {
        Attributes::new(Attributes::BOOTSERVICE_ACCESS | Attributes::RUNTIME_ACCESS)
    }
}

type Model = BTreeMap<(usize, usize), (Attributes, Vec<u8>)>;

fn check_against_model(store: &VariableStore<MemoryMedia>, model: &Model) {
    for (name_index, name) in NAMES.iter().enumerate() {
        for (vendor_index, vendor) in VENDORS.iter().enumerate() {
            let expected = model.get(&(name_index, vendor_index));
            match (store.get_variable(name, *vendor), expected) {
                (Ok(variable), Some((attributes, data))) => {
                    assert_eq!(&variable.attributes, attributes);
                    assert_eq!(&variable.data, data);
                }
                (Err(StoreError::NotFound), None) => {}
                (got, want) => panic!("{name}/{vendor}: store {got:?}, model {want:?}"),
            }
        }
    }

    let keys: Vec<VariableKey> = store.keys().map(|key| key.expect("key")).collect();
    let unique: BTreeSet<String> = keys.iter().map(ToString::to_string).collect();
    assert_eq!(keys.len(), unique.len(), "enumeration repeated a key");
    assert_eq!(keys.len(), model.len());

    // Per key: at most one Added entry, and live entries in one region only.
    let mut added: BTreeMap<String, usize> = BTreeMap::new();
    let mut live_in: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for kind in RegionKind::SEARCH_ORDER {
        for entry in store.region(kind).view().entries() {
            let key = entry.key().expect("key").to_string();
            if entry.state() == EntryState::Added {
                *added.entry(key.clone()).or_default() += 1;
            }
            if entry.state().is_live() {
                live_in.entry(key).or_default().insert(kind.to_string());
            }
        }
    }
    for (key, count) in added {
        assert!(count <= 1, "{key} has {count} Added entries");
    }
    for (key, regions) in live_in {
        assert_eq!(regions.len(), 1, "{key} is live in {regions:?}");
    }
}

proptest! {
    #[test]
    fn set_then_get_round_trips(
        name in "[A-Za-z][A-Za-z0-9]{0,15}",
        data in prop::collection::vec(any::<u8>(), 1..200),
        non_volatile in any::<bool>(),
    ) {
        let mut store = VariableStore::open(StoreConfig::default(), MemoryMedia::new(8192))
            .expect("open");
        store.set(&name, GLOBAL_VARIABLE_GUID, attributes(non_volatile), &data).expect("set");

        let mut buf = vec![0u8; data.len()];
        let (got_attributes, len) = store.get(&name, GLOBAL_VARIABLE_GUID, &mut buf).expect("get");
        prop_assert_eq!(got_attributes, attributes(non_volatile));
        prop_assert_eq!(&buf[..len], &data[..]);
    }

    #[test]
    fn store_matches_model(ops in prop::collection::vec(op(), 1..60)) {
        let config = StoreConfig::default().with_reclaim_threshold(0);
        let mut store = VariableStore::open(config, MemoryMedia::new(2048)).expect("open");
        let mut model = Model::new();

        for op in ops {
            match op {
                Op::Set { name, vendor, non_volatile, data } => {
                    let attrs = attributes(non_volatile);
                    let result = store.set(NAMES[name], VENDORS[vendor], attrs, &data);
                    if data.is_empty() {
                        let existed = model.remove(&(name, vendor)).is_some();
                        prop_assert_eq!(result.is_ok(), existed);
                    } else {
                        prop_assert!(result.is_ok(), "set failed: {:?}", result);
                        model.insert((name, vendor), (attrs, data));
                    }
                }
                Op::Compact(non_volatile) => {
                    let kind = if non_volatile { RegionKind::NonVolatile } else { RegionKind::Volatile };
                    store.compact(kind).expect("compact");
                }
            }
            check_against_model(&store, &model);
        }
    }

    #[test]
    fn compaction_never_grows_occupied_space(ops in prop::collection::vec(op(), 1..40)) {
        let config = StoreConfig::default().with_reclaim_threshold(0);
        let mut store = VariableStore::open(config, MemoryMedia::new(4096)).expect("open");
        for op in ops {
            if let Op::Set { name, vendor, non_volatile, data } = op {
                let _ = store.set(NAMES[name], VENDORS[vendor], attributes(non_volatile), &data);
            }
        }

        let before: Vec<_> = store.variables().map(|v| v.expect("variable")).collect();
        let tail = store.region(RegionKind::NonVolatile).tail();
        store.compact(RegionKind::NonVolatile).expect("compact");
        let after: Vec<_> = store.variables().map(|v| v.expect("variable")).collect();

        prop_assert!(store.region(RegionKind::NonVolatile).tail() <= tail);
        let before: BTreeSet<_> = before.iter().map(|v| (v.key.to_string(), v.data.clone())).collect();
        let after: BTreeSet<_> = after.iter().map(|v| (v.key.to_string(), v.data.clone())).collect();
        prop_assert_eq!(before, after);
    }
}
