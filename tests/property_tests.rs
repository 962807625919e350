//! Property-based tests for the Skein client
//!
//! Uses proptest to verify invariants across large input spaces.

use proptest::prelude::*;

// ============================================================================
// Expiry Planning Properties
// ============================================================================

mod expiry_properties {
    use super::*;
    use serde_json::json;
    use skein_swarm::{plan_expire_chunks, reconcile_expire_response};
    use std::collections::{BTreeMap, BTreeSet};

    fn targets() -> impl Strategy<Value = BTreeMap<String, u64>> {
        proptest::collection::btree_map("[a-f0-9]{8,16}", 1_000u64..1_010, 0..120)
    }

    proptest! {
        /// Every hash lands in exactly one chunk, with its own expiry
        #[test]
        fn chunks_cover_every_hash_once(targets in targets(), max in 1usize..30) {
            let chunks = plan_expire_chunks(&targets, max);
            let mut seen = BTreeMap::new();
            for chunk in &chunks {
                for (expiry, hashes) in &chunk.requests {
                    for hash in hashes {
                        prop_assert!(seen.insert(hash.clone(), *expiry).is_none(), "{} planned twice", hash);
                    }
                }
            }
            prop_assert_eq!(seen, targets);
        }

        /// No chunk exceeds the hash budget and only the last may be short
        #[test]
        fn chunks_respect_budget(targets in targets(), max in 1usize..30) {
            let chunks = plan_expire_chunks(&targets, max);
            prop_assert_eq!(chunks.len(), targets.len().div_ceil(max));
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert!(chunk.hash_count() <= max);
                if i + 1 < chunks.len() {
                    prop_assert_eq!(chunk.hash_count(), max);
                }
            }
        }

        /// Sub-requests within a chunk carry distinct expiries
        #[test]
        fn one_request_per_expiry(targets in targets(), max in 1usize..30) {
            for chunk in plan_expire_chunks(&targets, max) {
                let expiries: BTreeSet<u64> = chunk.requests.iter().map(|(expiry, _)| *expiry).collect();
                prop_assert_eq!(expiries.len(), chunk.requests.len());
            }
        }

        /// With no member answers every requested hash is forced to now
        #[test]
        fn unanswered_hashes_forced_to_now(
            requested in proptest::collection::vec("[a-f0-9]{8}", 1..40),
            now in 1u64..u64::MAX / 2,
        ) {
            let mut merged = BTreeMap::new();
            let rejected = reconcile_expire_response("05aa", &requested, &json!({ "swarm": {} }), &[], &mut merged, now);
            prop_assert!(rejected.is_empty());
            for hash in &requested {
                prop_assert_eq!(merged.get(hash), Some(&now));
            }
        }
    }
}

// ============================================================================
// Retry Backoff Properties
// ============================================================================

mod retry_properties {
    use super::*;
    use skein_swarm::RetryPolicy;
    use std::time::Duration;

    fn policy() -> impl Strategy<Value = RetryPolicy> {
        (1u64..1_000, 1u64..60_000, 1.0f64..4.0, any::<bool>()).prop_map(|(initial, max, multiplier, jitter)| {
            RetryPolicy {
                max_attempts: 5,
                initial_backoff: Duration::from_millis(initial),
                max_backoff: Duration::from_millis(initial.max(max)),
                multiplier,
                jitter,
            }
        })
    }

    proptest! {
        /// Backoff never exceeds the ceiling, jittered or not
        #[test]
        fn backoff_capped(policy in policy(), attempt in 1u32..64) {
            prop_assert!(policy.backoff(attempt) <= policy.max_backoff);
        }

        /// Without jitter the delay never shrinks between attempts
        #[test]
        fn backoff_non_decreasing(mut policy in policy(), attempt in 1u32..32) {
            policy.jitter = false;
            prop_assert!(policy.backoff(attempt) <= policy.backoff(attempt + 1));
        }

        /// Jitter stays within a quarter of the unjittered delay
        #[test]
        fn jitter_bounded(mut policy in policy(), attempt in 1u32..16) {
            policy.jitter = false;
            let base = policy.backoff(attempt).as_secs_f64();
            policy.jitter = true;
            let jittered = policy.backoff(attempt).as_secs_f64();
            prop_assert!(jittered >= base * 0.75 - 1e-8);
            prop_assert!(jittered <= base * 1.25 + 1e-8);
        }
    }
}

// ============================================================================
// Identity and Namespace Properties
// ============================================================================

mod identity_properties {
    use super::*;
    use skein_core::{AccountId, Namespace};

    proptest! {
        /// Parsing arbitrary text never panics
        #[test]
        fn account_parse_never_panics(s in ".{0,80}") {
            let _ = AccountId::parse(&s);
        }

        /// Parsing accepts exactly what Display produces for valid prefixes
        #[test]
        fn account_display_parses(prefix in prop::sample::select(vec![0x03u8, 0x05]), key in any::<[u8; 32]>()) {
            let text = format!("{prefix:02x}{}", hex::encode(key));
            let id = AccountId::parse(&text).unwrap();
            prop_assert_eq!(id.to_string(), text);
        }

        /// A namespace belongs to at most one owner class
        #[test]
        fn namespace_classes_disjoint(value in any::<i16>()) {
            let ns = Namespace::new(value);
            let classes = [ns.is_user_namespace(), ns.is_group_namespace(), ns.is_legacy_group()];
            prop_assert!(classes.iter().filter(|c| **c).count() <= 1);
        }
    }
}

// ============================================================================
// Framing Properties
// ============================================================================

mod framing_properties {
    use super::*;
    use skein_transport::onion::decode_ciphertext_plus_json;
    use skein_transport::v4::decode_v4;

    proptest! {
        /// Arbitrary bytes never panic the hop blob decoder
        #[test]
        fn hop_blob_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode_ciphertext_plus_json(&bytes);
        }

        /// A decoded hop blob's ciphertext lies inside the input
        #[test]
        fn hop_blob_length_respected(len in 0u32..64, tail in proptest::collection::vec(any::<u8>(), 0..96)) {
            let mut blob = len.to_le_bytes().to_vec();
            blob.extend_from_slice(&tail);
            if let Some((ciphertext, _)) = decode_ciphertext_plus_json(&blob) {
                prop_assert_eq!(ciphertext.len(), len as usize);
                prop_assert_eq!(ciphertext, &tail[..len as usize]);
            }
        }

        /// Status codes survive only when they fit a u16
        #[test]
        fn v4_status_range(code in any::<u32>()) {
            let meta = format!("{{\"code\":{code}}}");
            let encoded = format!("l{}:{}e", meta.len(), meta);
            let decoded = decode_v4(encoded.as_bytes());
            prop_assert_eq!(decoded.is_some(), u16::try_from(code).is_ok());
        }
    }
}
