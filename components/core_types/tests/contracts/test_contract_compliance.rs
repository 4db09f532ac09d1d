//! Contract compliance tests for core_types
//!
//! These tests pin the public surface the inliner relies on.

use core_types::{
    CallSiteKey, ClassId, ClassInfo, FanInHistogram, Hotness, KnownObjectId, MethodFlags, MethodId, MethodInfo,
    ProfileData, ProfileOracle, ReceiverHistogram, ValueType,
};

/// Contract: identifiers are plain copyable handles
#[test]
fn test_ids_are_copy_and_hashable() {
    fn assert_key<T: Copy + Eq + std::hash::Hash + Ord>() {}
    assert_key::<MethodId>();
    assert_key::<ClassId>();
    assert_key::<KnownObjectId>();
    assert_key::<CallSiteKey>();
}

/// Contract: profile tables can be shared with other compilation threads
#[test]
fn test_profile_oracle_is_thread_safe() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ProfileData>();
    assert_send_sync::<Box<dyn ProfileOracle>>();
}

/// Contract: method flags default to an ordinary virtual method
#[test]
fn test_method_flags_default() {
    let flags = MethodFlags::default();
    assert!(!flags.is_static);
    assert!(!flags.is_synchronized);
    assert!(!flags.force_inline);
    assert!(!flags.dont_inline);
}

/// Contract: descriptors expose their fields directly
#[test]
fn test_descriptor_fields() {
    let method = MethodInfo::new(MethodId(1), ClassId(2), "get", "()I", vec![], ValueType::Int);
    let _: MethodId = method.id;
    let _: ClassId = method.holder;
    let _: &str = &method.name;
    let _: ValueType = method.return_type;
    let class = ClassInfo::new(ClassId(2), "Box", None);
    let _: Option<ClassId> = class.superclass;
    let _: Hotness = Hotness::default();
}

/// Contract: histograms are constructible and empty by default
#[test]
fn test_histograms_start_empty() {
    assert_eq!(ReceiverHistogram::default().total(), 0);
    assert_eq!(FanInHistogram::default().total_weight(), 0);
}
