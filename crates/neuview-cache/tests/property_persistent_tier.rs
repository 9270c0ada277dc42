//! Property-based tests for the persistent tier
//!
//! **Property: Values survive a restart**
//! **Property: Damaged files are never served**

use std::time::Duration;

use neuview_cache::{CacheEntry, CacheStorage, Lookup, PersistentTier};
use proptest::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// JSON payloads without floats, which do not round-trip bit-exactly
fn payload_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        ".{0,24}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z_]{1,8}", inner, 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: an entry written by one instance is read back unchanged by
    /// a fresh instance over the same directory
    #[test]
    fn prop_round_trip_across_instances(
        key in "[a-zA-Z0-9:%_ ()-]{1,64}",
        payload in payload_strategy(),
        ttl_secs in prop::option::of(60u64..100_000),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let ttl = ttl_secs.map(Duration::from_secs);
        let entry = CacheEntry::new(key.as_str(), payload.clone(), ttl);

        let read = runtime().block_on(async {
            PersistentTier::new(temp_dir.path(), "neuron_data")
                .put(&entry)
                .await
                .unwrap();
            PersistentTier::new(temp_dir.path(), "neuron_data").get(&key).await
        });

        let Lookup::Hit(read) = read else {
            return Err(TestCaseError::fail("expected a hit"));
        };
        prop_assert_eq!(read.key, key);
        prop_assert_eq!(read.payload, payload);
        prop_assert_eq!(read.ttl, ttl);
        prop_assert_eq!(read.created_at.timestamp(), entry.created_at.timestamp());
    }

    /// Property: a truncated file is reported as corrupted and removed
    #[test]
    fn prop_truncated_file_is_discarded(
        payload in payload_strategy(),
        cut in any::<prop::sample::Index>(),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let tier = PersistentTier::new(temp_dir.path(), "columns");
        let path = tier.path_for("ME(R):hex");

        let (first, second) = runtime().block_on(async {
            tier.put(&CacheEntry::new("ME(R):hex", payload, None)).await.unwrap();

            let bytes = std::fs::read(&path).unwrap();
            let keep = cut.index(bytes.len());
            std::fs::write(&path, &bytes[..keep]).unwrap();

            (tier.get("ME(R):hex").await, tier.get("ME(R):hex").await)
        });

        prop_assert_eq!(first, Lookup::Corrupted);
        prop_assert_eq!(second, Lookup::Miss);
        prop_assert!(!path.exists());
        prop_assert_eq!(tier.metrics().corruptions, 1);
    }

    /// Property: the same key in two domains never shares a file
    #[test]
    fn prop_domains_do_not_collide(key in "[a-zA-Z0-9:]{1,32}") {
        let temp_dir = TempDir::new().unwrap();
        let neurons = PersistentTier::new(temp_dir.path(), "neuron_data");
        let columns = PersistentTier::new(temp_dir.path(), "columns");
        prop_assert_ne!(neurons.path_for(&key), columns.path_for(&key));
    }
}
