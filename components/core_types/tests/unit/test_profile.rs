//! Unit tests for profiling tables

use core_types::{CallSiteKey, ClassId, FanInHistogram, MethodId, ProfileData, ProfileOracle, ReceiverHistogram};

#[test]
fn test_receiver_histogram_merges_counts() {
    let mut hist = ReceiverHistogram::new();
    hist.record(ClassId(1), 10);
    hist.record(ClassId(2), 30);
    hist.record(ClassId(1), 20);
    assert_eq!(hist.total(), 60);
    assert_eq!(hist.sorted(), vec![(ClassId(1), 30), (ClassId(2), 30)]);
    assert_eq!(hist.fraction(ClassId(2)), 0.5);
    assert_eq!(hist.fraction(ClassId(9)), 0.0);
}

#[test]
fn test_sorted_breaks_ties_by_class() {
    let mut a = ReceiverHistogram::new();
    a.record(ClassId(5), 4);
    a.record(ClassId(3), 4);
    let mut b = ReceiverHistogram::new();
    b.record(ClassId(3), 4);
    b.record(ClassId(5), 4);
    assert_eq!(a.sorted(), b.sorted());
    assert_eq!(a.sorted()[0].0, ClassId(3));
}

#[test]
fn test_empty_histogram_fraction_is_zero() {
    assert_eq!(ReceiverHistogram::new().fraction(ClassId(1)), 0.0);
}

#[test]
fn test_fan_in_total_includes_other_bucket() {
    let mut fan_in = FanInHistogram::new();
    fan_in.record(MethodId(1), 30);
    fan_in.record(MethodId(2), 10);
    fan_in.record(MethodId(1), 10);
    fan_in.record_other(60);
    assert_eq!(fan_in.weight_of(MethodId(1)), 40);
    assert_eq!(fan_in.weight_of(MethodId(7)), 0);
    assert_eq!(fan_in.other_weight(), 60);
    assert_eq!(fan_in.total_weight(), 110);
    assert_eq!(fan_in.caller_count(), 2);
}

#[test]
fn test_profile_data_as_oracle() {
    let mut profile = ProfileData::new();
    let site = CallSiteKey::new(MethodId(1), 8);
    profile.record_receiver(site, ClassId(4), 3);
    profile.record_call(MethodId(2), MethodId(1), 5);
    profile.record_other_callers(MethodId(2), 1);

    let oracle: &dyn ProfileOracle = &profile;
    assert_eq!(oracle.receiver_histogram(site).map(|h| h.total()), Some(3));
    assert!(oracle.receiver_histogram(CallSiteKey::new(MethodId(1), 9)).is_none());
    assert_eq!(oracle.fan_in(MethodId(2)).map(|f| f.total_weight()), Some(6));

    profile.clear();
    assert!(profile.receiver_histogram(site).is_none());
}
