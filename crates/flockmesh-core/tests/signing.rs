// crates/flockmesh-core/tests/signing.rs
// ============================================================================
// Module: Canonicalization and Signing Tests
// Description: Property tests for canonical hashing and export signatures.
// ============================================================================
//! ## Overview
//! Validates that canonicalization is insensitive to key order and absent
//! optional fields, and that sign/verify round-trips hold for arbitrary
//! payloads while any tampering fails.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;

use flockmesh_core::SigningKeyId;
use flockmesh_core::SigningKeyRing;
use flockmesh_core::hash_canonical_json;
use proptest::prelude::*;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

/// Builds the test key ring.
fn ring() -> SigningKeyRing {
    let mut secrets = BTreeMap::new();
    secrets.insert(SigningKeyId::new("exp_primary"), "primary-secret".to_string());
    secrets.insert(SigningKeyId::new("exp_secondary"), "secondary-secret".to_string());
    SigningKeyRing::new(secrets, SigningKeyId::new("exp_primary")).unwrap()
}

/// Record with an optional field for the absent-field property.
#[derive(Serialize)]
struct WithOptional {
    /// Always present.
    name: String,
    /// Skipped when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

/// Record without the optional field.
#[derive(Serialize)]
struct WithoutOptional {
    /// Always present.
    name: String,
}

/// Tests that absent optional fields hash like missing keys.
#[test]
fn test_absent_fields_are_dropped() {
    let with = WithOptional {
        name: "flockmesh".to_string(),
        note: None,
    };
    let without = WithoutOptional {
        name: "flockmesh".to_string(),
    };
    assert_eq!(
        hash_canonical_json(&with).unwrap(),
        hash_canonical_json(&without).unwrap()
    );
}

/// Strategy producing small JSON objects with string/number/bool leaves.
fn json_object() -> impl Strategy<Value = Map<String, Value>> {
    proptest::collection::btree_map(
        "[a-z]{1,8}",
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
        ],
        0..6,
    )
    .prop_map(|map| map.into_iter().collect())
}

proptest! {
    /// Property: canonical hashing is insensitive to key insertion order.
    #[test]
    fn prop_canonical_ignores_key_order(object in json_object()) {
        let forward = Value::Object(object.clone());
        let reversed: Map<String, Value> = object.into_iter().rev().collect();
        let backward = Value::Object(reversed);
        prop_assert_eq!(
            hash_canonical_json(&forward).unwrap(),
            hash_canonical_json(&backward).unwrap()
        );
    }

    /// Property: sign/verify round-trips for arbitrary payloads, and any
    /// payload change breaks verification.
    #[test]
    fn prop_sign_verify_and_tamper(object in json_object(), tamper in "[a-z]{1,8}") {
        let ring = ring();
        let payload = Value::Object(object.clone());
        let signature = ring.sign(&payload).unwrap();
        prop_assert!(ring.verify(&payload, &signature).is_ok());

        // The strategy never produces this value, so the payload changes.
        let mut tampered = object;
        tampered.insert(tamper, json!("tampered-value"));
        let tampered = Value::Object(tampered);
        prop_assert!(ring.verify(&tampered, &signature).is_err());
    }
}
