//! Property-Based Tests for the Cache Module
//!
//! Uses proptest to check the cache engine against the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use crate::cache::{hit_ratio, CacheOptions, CacheService};
use crate::store::MemoryStore;

// == Strategies ==
/// Generates valid cache keys
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,32}"
}

/// Generates cache values
fn valid_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,128}"
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (valid_key_strategy(), valid_value_strategy())
            .prop_map(|(key, value)| CacheOp::Set { key, value }),
        valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
        valid_key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

fn run<F>(test: F) -> Result<(), TestCaseError>
where
    F: std::future::Future<Output = Result<(), TestCaseError>>,
{
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TestCaseError::fail(e.to_string()))?
        .block_on(test)
}

fn service() -> CacheService {
    CacheService::new(Arc::new(MemoryStore::new()), "prop:")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Stats mirror exactly the hits and misses observed by callers.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        run(async move {
            let cache = service();
            let opts = CacheOptions::default();
            let (mut hits, mut misses) = (0u64, 0u64);

            for op in ops {
                match op {
                    CacheOp::Set { key, value } => {
                        cache.set(&key, &value, &opts).await.unwrap();
                    }
                    CacheOp::Get { key } => match cache.get::<String>(&key, &opts).await {
                        Some(_) => hits += 1,
                        None => misses += 1,
                    },
                    CacheOp::Delete { key } => {
                        cache.del(&key, &opts).await.unwrap();
                    }
                }
            }

            let stats = cache.get_stats().await.unwrap();
            prop_assert_eq!(stats.hits, hits);
            prop_assert_eq!(stats.misses, misses);
            prop_assert_eq!(stats.hit_ratio, hit_ratio(hits, misses));
            Ok(())
        })?;
    }

    // A stored value reads back unchanged.
    #[test]
    fn prop_roundtrip_storage(key in valid_key_strategy(), value in valid_value_strategy()) {
        run(async move {
            let cache = service();
            let opts = CacheOptions::default();
            cache.set(&key, &value, &opts).await.unwrap();
            prop_assert_eq!(cache.get::<String>(&key, &opts).await, Some(value));
            Ok(())
        })?;
    }

    // Structured values survive JSON encoding.
    #[test]
    fn prop_roundtrip_structured(
        reps in prop::collection::vec(0u32..500, 0..10),
        label in valid_value_strategy()
    ) {
        run(async move {
            let cache = service();
            let opts = CacheOptions::default().with_ttl(60);
            let mut value = HashMap::new();
            value.insert(label, reps);
            cache.set("workout", &value, &opts).await.unwrap();
            prop_assert_eq!(
                cache.get::<HashMap<String, Vec<u32>>>("workout", &opts).await,
                Some(value)
            );
            Ok(())
        })?;
    }

    // Two reads without an intervening write agree.
    #[test]
    fn prop_read_idempotence(key in valid_key_strategy(), store_first in any::<bool>()) {
        run(async move {
            let cache = service();
            let opts = CacheOptions::default();
            if store_first {
                cache.set(&key, &"v", &opts).await.unwrap();
            }
            let first = cache.get::<String>(&key, &opts).await;
            let second = cache.get::<String>(&key, &opts).await;
            prop_assert_eq!(&first, &second);

            let stats = cache.get_stats().await.unwrap();
            if store_first {
                prop_assert_eq!((stats.hits, stats.misses), (2, 0));
            } else {
                prop_assert_eq!((stats.hits, stats.misses), (0, 2));
            }
            Ok(())
        })?;
    }

    // Pattern invalidation removes exactly the keys under the pattern.
    #[test]
    fn prop_invalidation_scope(
        a_keys in prop::collection::hash_set("[a-z0-9]{1,8}", 0..10),
        b_keys in prop::collection::hash_set("[a-z0-9]{1,8}", 1..10)
    ) {
        run(async move {
            let cache = service();
            let opts = CacheOptions::default();
            let mut entries = HashMap::new();
            for k in &a_keys {
                entries.insert(format!("a:{}", k), 1);
            }
            for k in &b_keys {
                entries.insert(format!("b:{}", k), 2);
            }
            cache.mset(&entries, &opts).await.unwrap();

            let removed = cache.invalidate_pattern("a:*", &opts).await.unwrap();
            prop_assert_eq!(removed, a_keys.len() as u64);
            for k in &b_keys {
                let key = format!("b:{}", k);
                let kept = cache.exists(&key, &opts).await.unwrap();
                prop_assert!(kept, "{} was invalidated", key);
            }
            Ok(())
        })?;
    }
}
