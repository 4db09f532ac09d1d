//! Unit tests for identifiers and call site keys

use core_types::{CallSiteKey, ClassId, KnownObjectId, MethodId};
use std::collections::BTreeSet;

#[test]
fn test_display_prefixes() {
    assert_eq!(MethodId(4).to_string(), "m4");
    assert_eq!(ClassId(9).to_string(), "c9");
    assert_eq!(KnownObjectId(2).to_string(), "obj2");
}

#[test]
fn test_call_site_key_display() {
    let key = CallSiteKey::new(MethodId(3), 17);
    assert_eq!(key.to_string(), "m3@17");
}

#[test]
fn test_call_site_keys_order_by_method_then_index() {
    let keys: BTreeSet<CallSiteKey> = [
        CallSiteKey::new(MethodId(2), 0),
        CallSiteKey::new(MethodId(1), 9),
        CallSiteKey::new(MethodId(1), 3),
    ]
    .into_iter()
    .collect();
    let ordered: Vec<_> = keys.into_iter().collect();
    assert_eq!(
        ordered,
        vec![
            CallSiteKey::new(MethodId(1), 3),
            CallSiteKey::new(MethodId(1), 9),
            CallSiteKey::new(MethodId(2), 0),
        ]
    );
}

#[test]
fn test_index_matches_raw_value() {
    assert_eq!(MethodId(12).index(), 12);
    assert_eq!(ClassId(0).index(), 0);
}
