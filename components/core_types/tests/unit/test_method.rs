//! Unit tests for method and class descriptors

use core_types::{ClassId, ClassInfo, Hotness, MethodFlags, MethodId, MethodInfo, ValueType};

fn virtual_method() -> MethodInfo {
    MethodInfo::new(
        MethodId(5),
        ClassId(2),
        "area",
        "(D)D",
        vec![ValueType::Double],
        ValueType::Double,
    )
}

#[test]
fn test_instance_method_counts_receiver() {
    let m = virtual_method();
    assert_eq!(m.arg_count(), 2);
    assert_eq!(
        m.arg_types(),
        vec![ValueType::Reference(ClassId(2)), ValueType::Double]
    );
}

#[test]
fn test_static_method_has_no_receiver() {
    let m = virtual_method().with_flags(MethodFlags {
        is_static: true,
        ..MethodFlags::default()
    });
    assert_eq!(m.arg_count(), 1);
    assert_eq!(m.arg_types(), vec![ValueType::Double]);
}

#[test]
fn test_selector_joins_name_and_signature() {
    assert_eq!(virtual_method().selector(), "area(D)D");
}

#[test]
fn test_value_type_class() {
    assert_eq!(ValueType::Reference(ClassId(7)).class(), Some(ClassId(7)));
    assert!(ValueType::Reference(ClassId(7)).is_reference());
    assert_eq!(ValueType::Int.class(), None);
    assert!(!ValueType::Void.is_reference());
}

#[test]
fn test_interface_is_abstract() {
    let iface = ClassInfo::interface(ClassId(1), "Shape");
    assert!(iface.is_interface);
    assert!(iface.is_abstract);
    assert_eq!(iface.superclass, None);
}

#[test]
fn test_class_builders() {
    let class = ClassInfo::new(ClassId(3), "Circle", Some(ClassId(2)))
        .implementing(ClassId(1))
        .final_class();
    assert!(class.is_final);
    assert!(!class.is_abstract);
    assert_eq!(class.interfaces, vec![ClassId(1)]);
}

#[test]
fn test_hotness_ordering_and_default() {
    assert_eq!(Hotness::default(), Hotness::Warm);
    assert!(Hotness::Cold < Hotness::Warm);
    assert!(Hotness::Hot < Hotness::VeryHot);
    assert!(Hotness::VeryHot < Hotness::Scorching);
}

#[test]
fn test_hotness_serde_names() {
    let hot: Hotness = serde_json::from_str("\"very_hot\"").unwrap();
    assert_eq!(hot, Hotness::VeryHot);
    assert_eq!(serde_json::to_string(&Hotness::Scorching).unwrap(), "\"scorching\"");
}
