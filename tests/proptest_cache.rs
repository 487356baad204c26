//! Property-based tests for the response cache.
//!
//! # Properties Tested
//!
//! 1. **Capacity Property**: the store never holds more than `max_size` entries
//! 2. **LRU Property**: the store agrees with a reference recency list
//! 3. **Key Property**: filter order never changes a request's cache key
//! 4. **Payload Property**: cached responses decode to what was stored
//! 5. **TTL Property**: an entry is returned exactly while its age is within its TTL

use hotel_kit::key::CacheKeyBuilder;
use hotel_kit::models::{GeoCode, Hotel, HotelsListRequest, HotelsListResponse};
use hotel_kit::serialization::{deserialize_from_cache, serialize_for_cache};
use hotel_kit::CacheStore;
use proptest::prelude::*;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Clone, Debug)]
enum StoreOp {
    Set(u8),
    Get(u8),
    Remove(u8),
}

fn arb_op() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        (0u8..12).prop_map(StoreOp::Set),
        (0u8..12).prop_map(StoreOp::Get),
        (0u8..12).prop_map(StoreOp::Remove),
    ]
}

/// Most recently used key at the back.
struct RecencyModel {
    order: VecDeque<u8>,
    capacity: usize,
}

impl RecencyModel {
    fn touch(&mut self, key: u8) -> bool {
        match self.order.iter().position(|k| *k == key) {
            Some(pos) => {
                self.order.remove(pos);
                self.order.push_back(key);
                true
            }
            None => false,
        }
    }

    fn set(&mut self, key: u8) {
        if !self.touch(key) {
            if self.order.len() == self.capacity {
                self.order.pop_front();
            }
            self.order.push_back(key);
        }
    }

    fn remove(&mut self, key: u8) -> bool {
        match self.order.iter().position(|k| *k == key) {
            Some(pos) => {
                self.order.remove(pos);
                true
            }
            None => false,
        }
    }
}

fn arb_hotel() -> impl Strategy<Value = Hotel> {
    (
        "[A-Z]{2}[A-Z0-9]{6}",
        "[A-Za-z ]{1,40}",
        -90.0f64..90.0,
        -180.0f64..180.0,
        proptest::option::of("[A-Z]{2}"),
    )
        .prop_map(|(hotel_id, name, latitude, longitude, chain_code)| Hotel {
            chain_code,
            iata_code: None,
            dupe_id: None,
            name,
            hotel_id,
            geo_code: GeoCode {
                latitude,
                longitude,
            },
            address: None,
            distance: None,
        })
}

// ============================================================================
// Property 1 & 2: Capacity and LRU order
// ============================================================================

proptest! {
    /// Property: after any sequence of operations the store never exceeds its bound
    #[test]
    fn prop_size_never_exceeds_capacity(
        capacity in 1usize..6,
        ops in prop::collection::vec(arb_op(), 0..200),
    ) {
        let store: CacheStore<u8> = CacheStore::new(capacity, Duration::from_secs(300));

        for op in ops {
            match op {
                StoreOp::Set(k) => store.set(&k.to_string(), k, None),
                StoreOp::Get(k) => { store.get(&k.to_string()); }
                StoreOp::Remove(k) => { store.remove(&k.to_string()); }
            }
            prop_assert!(store.size() <= capacity);
        }
    }

    /// Property: hits, misses and evictions match a reference recency list
    #[test]
    fn prop_matches_recency_model(
        capacity in 1usize..6,
        ops in prop::collection::vec(arb_op(), 0..200),
    ) {
        let store: CacheStore<u8> = CacheStore::new(capacity, Duration::from_secs(300));
        let mut model = RecencyModel { order: VecDeque::new(), capacity };

        for op in ops {
            match op {
                StoreOp::Set(k) => {
                    store.set(&k.to_string(), k, None);
                    model.set(k);
                }
                StoreOp::Get(k) => {
                    let hit = store.get(&k.to_string());
                    let expected = model.touch(k);
                    prop_assert_eq!(hit.is_some(), expected, "get({})", k);
                    if let Some(value) = hit {
                        prop_assert_eq!(value, k);
                    }
                }
                StoreOp::Remove(k) => {
                    prop_assert_eq!(store.remove(&k.to_string()), model.remove(k));
                }
            }
            prop_assert_eq!(store.size(), model.order.len());
        }
    }
}

// ============================================================================
// Property 3: Keys ignore filter order
// ============================================================================

proptest! {
    /// Property: any permutation of the amenity list yields the same key
    #[test]
    fn prop_amenity_order_irrelevant(
        amenities in prop::collection::vec("[A-Z_]{3,12}", 1..6),
        latitude in -90.0f64..90.0,
        longitude in -180.0f64..180.0,
    ) {
        let mut reversed = amenities.clone();
        reversed.reverse();

        let a = HotelsListRequest::new(latitude, longitude).with_amenities(amenities);
        let b = HotelsListRequest::new(latitude, longitude).with_amenities(reversed);

        prop_assert_eq!(
            CacheKeyBuilder::build("hotels_by_location", &a).unwrap(),
            CacheKeyBuilder::build("hotels_by_location", &b).unwrap()
        );
    }
}

// ============================================================================
// Property 4: Cached payloads decode unchanged
// ============================================================================

proptest! {
    /// Property: a stored hotel list decodes to the same list
    #[test]
    fn prop_hotel_list_payload_roundtrip(
        hotels in prop::collection::vec(arb_hotel(), 0..10),
    ) {
        let response = HotelsListResponse { data: hotels, ..HotelsListResponse::default() };

        let bytes = serialize_for_cache(&response)
            .expect("Serialization should never fail for a hotel list");
        let decoded: HotelsListResponse = deserialize_from_cache(&bytes)
            .expect("Deserialization should never fail for valid bytes");

        prop_assert_eq!(response, decoded);
    }
}

// ============================================================================
// Property 5: TTL expiry
// ============================================================================

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("Failed to create paused runtime")
}

proptest! {
    /// Property: `get` is absent exactly when elapsed time exceeds the entry TTL
    #[test]
    fn prop_ttl_expiry_matches_elapsed(
        ttls in prop::collection::vec(1u64..5_000, 1..8),
        steps in prop::collection::vec(0u64..2_000, 1..12),
    ) {
        let rt = paused_runtime();

        rt.block_on(async {
            let store: CacheStore<u64> = CacheStore::new(ttls.len(), Duration::from_secs(300));
            for (i, ttl) in ttls.iter().enumerate() {
                store.set(&i.to_string(), *ttl, Some(Duration::from_millis(*ttl)));
            }

            let mut elapsed = 0u64;
            for step in steps {
                tokio::time::advance(Duration::from_millis(step)).await;
                elapsed += step;

                for (i, ttl) in ttls.iter().enumerate() {
                    let got = store.get(&i.to_string());
                    if elapsed > *ttl {
                        prop_assert!(
                            got.is_none(),
                            "key {} alive at {}ms, ttl {}ms",
                            i,
                            elapsed,
                            ttl
                        );
                    } else {
                        prop_assert_eq!(got, Some(*ttl));
                    }
                }
            }
            Ok(())
        })?;
    }
}
