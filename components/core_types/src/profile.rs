//! Profiling data collection for JIT compilation decisions
//!
//! This module is placed in core_types so the optimizer can consume profiles
//! without depending on the interpreter that records them. The tables are
//! filled while the program runs and are read-only during compilation.

use crate::{CallSiteKey, ClassId, MethodId};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Receiver classes observed at one virtual or interface call site
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverHistogram {
    entries: Vec<(ClassId, u32)>,
}

impl ReceiverHistogram {
    /// Create an empty histogram
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` observations of `class`
    pub fn record(&mut self, class: ClassId, count: u32) {
        match self.entries.iter_mut().find(|(c, _)| *c == class) {
            Some((_, n)) => *n = n.saturating_add(count),
            None => self.entries.push((class, count)),
        }
    }

    /// Total number of observations
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, n)| u64::from(*n)).sum()
    }

    /// Entries sorted by descending frequency; ties by ascending class id so
    /// the order never depends on recording order.
    pub fn sorted(&self) -> Vec<(ClassId, u32)> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        sorted
    }

    /// Fraction of observations attributed to `class`
    pub fn fraction(&self, class: ClassId) -> f32 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let count = self
            .entries
            .iter()
            .find(|(c, _)| *c == class)
            .map_or(0, |(_, n)| *n);
        count as f32 / total as f32
    }
}

/// Call weight flowing into one callee, broken down by calling method
///
/// Callers that did not fit in the fixed-size profiler buffer are merged into
/// a single "other" bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanInHistogram {
    callers: Vec<(MethodId, u32)>,
    other: u32,
}

impl FanInHistogram {
    /// Create an empty histogram
    pub fn new() -> Self {
        Self::default()
    }

    /// Record call weight from `caller`
    pub fn record(&mut self, caller: MethodId, weight: u32) {
        match self.callers.iter_mut().find(|(m, _)| *m == caller) {
            Some((_, w)) => *w = w.saturating_add(weight),
            None => self.callers.push((caller, weight)),
        }
    }

    /// Record call weight from callers that were not tracked individually
    pub fn record_other(&mut self, weight: u32) {
        self.other = self.other.saturating_add(weight);
    }

    /// Weight recorded for `caller`, zero when untracked
    pub fn weight_of(&self, caller: MethodId) -> u32 {
        self.callers
            .iter()
            .find(|(m, _)| *m == caller)
            .map_or(0, |(_, w)| *w)
    }

    /// Weight in the "other" bucket
    pub fn other_weight(&self) -> u32 {
        self.other
    }

    /// Total weight including the "other" bucket
    pub fn total_weight(&self) -> u64 {
        self.callers.iter().map(|(_, w)| u64::from(*w)).sum::<u64>() + u64::from(self.other)
    }

    /// Number of distinct tracked callers
    pub fn caller_count(&self) -> usize {
        self.callers.len()
    }
}

/// Read-only view of profiling information used by the optimizer
pub trait ProfileOracle: Send + Sync {
    /// Receiver classes observed at a call site
    fn receiver_histogram(&self, site: CallSiteKey) -> Option<&ReceiverHistogram>;

    /// Callers of a method weighted by how often they called it
    fn fan_in(&self, callee: MethodId) -> Option<&FanInHistogram>;
}

/// Profiling data for a program
///
/// Collects runtime statistics to inform JIT compilation decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    /// Receiver histograms by call site
    pub receivers: FxHashMap<CallSiteKey, ReceiverHistogram>,
    /// Fan-in histograms by callee
    pub fan_in: FxHashMap<MethodId, FanInHistogram>,
}

impl ProfileData {
    /// Create new empty profile data
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` receivers of `class` at `site`
    pub fn record_receiver(&mut self, site: CallSiteKey, class: ClassId, count: u32) {
        self.receivers.entry(site).or_default().record(class, count);
    }

    /// Record `weight` calls from `caller` into `callee`
    pub fn record_call(&mut self, callee: MethodId, caller: MethodId, weight: u32) {
        self.fan_in.entry(callee).or_default().record(caller, weight);
    }

    /// Record `weight` calls into `callee` from untracked callers
    pub fn record_other_callers(&mut self, callee: MethodId, weight: u32) {
        self.fan_in.entry(callee).or_default().record_other(weight);
    }

    /// Drop all recorded data
    pub fn clear(&mut self) {
        self.receivers.clear();
        self.fan_in.clear();
    }
}

impl ProfileOracle for ProfileData {
    fn receiver_histogram(&self, site: CallSiteKey) -> Option<&ReceiverHistogram> {
        self.receivers.get(&site)
    }

    fn fan_in(&self, callee: MethodId) -> Option<&FanInHistogram> {
        self.fan_in.get(&callee)
    }
}
