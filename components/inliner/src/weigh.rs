//! Heuristic weighing of candidates
//!
//! A weight starts from the estimated size and is adjusted for how often
//! the call runs, what is known about its arguments, and the shape of the
//! callee. Lower weights are better. Weighing never touches IR.

use crate::call_graph::{CallGraph, CallSite, CallTarget, CallTargetId};
use crate::config::InlinerConfig;
use crate::ir::{CallKind, COLD_FREQUENCY_BAND, MAX_BLOCK_FREQUENCY};
use crate::policy::PolicyBits;
use core_types::Hotness;
use std::cmp::Ordering;
use tracing::trace;

/// Smallest size a hot site can be discounted to
const MIN_HOT_SCALED_SIZE: u32 = 10;

/// Smallest factor a hot site's size is scaled by, in thousandths
const MAX_HOT_DISCOUNT_PERMILLE: u64 = 700;

/// Scale a size by the frequency of the block holding the call
///
/// Sites above the hot border are discounted, sites below the cold border
/// are inflated by the inverse square of their relative frequency.
pub fn scale_by_block_frequency(size: u32, frequency: u32, borders: (u32, u32), always_worth: bool) -> u32 {
    let (hot_border, cold_border) = borders;
    let max = u64::from(MAX_BLOCK_FREQUENCY + COLD_FREQUENCY_BAND);
    let frequency = u64::from(frequency).min(max);
    if frequency > u64::from(hot_border) {
        let permille = ((max - frequency) * 1000 / max).max(MAX_HOT_DISCOUNT_PERMILLE);
        let scaled = (u64::from(size) * permille / 1000) as u32;
        scaled.max(size.min(MIN_HOT_SCALED_SIZE))
    } else if frequency < u64::from(cold_border) && !always_worth {
        if frequency == 0 {
            return u32::MAX;
        }
        let scaled = u128::from(size) * u128::from(max * max) / u128::from(frequency * frequency);
        scaled.min(u128::from(u32::MAX)) as u32
    } else {
        size
    }
}

/// Computes weights and ranks candidates
pub struct Weigher<'a> {
    config: &'a InlinerConfig,
    has_profile: bool,
}

impl<'a> Weigher<'a> {
    /// Create a weigher; `has_profile` enables profile-adjusted weights
    pub fn new(config: &'a InlinerConfig, has_profile: bool) -> Self {
        Self { config, has_profile }
    }

    /// Weight of one target at its site
    pub fn weight(&self, site: &CallSite, target: &CallTarget) -> u32 {
        let size = target.partial.as_ref().map_or(target.size, |p| p.hot_size);
        let always_worth = target.policy.contains(PolicyBits::ALWAYS_WORTH_INLINING);
        let scaled = scale_by_block_frequency(
            size,
            site.block_frequency,
            self.config.border_frequencies(),
            always_worth,
        );

        let mut weight = i64::from(scaled);
        let const_class = i64::from(self.config.const_class_weight);
        for fact in target.prex.iter().flatten() {
            if fact.known_object.is_some() {
                weight -= const_class;
            } else {
                if fact.is_fixed {
                    weight -= const_class / 2;
                }
                if fact.is_constant {
                    weight -= const_class / 2;
                }
            }
        }
        if target.is_leaf {
            weight = weight * 3 / 4;
        }
        if site.kind == CallKind::MethodHandleThunk || target.policy.contains(PolicyBits::JSR292) {
            weight /= 2;
        }
        if self.config.hotness >= Hotness::VeryHot && target.size > self.config.very_large_callee_size {
            weight = weight.saturating_mul(2);
        }
        weight.clamp(0, i64::from(u32::MAX)) as u32
    }

    /// Weight divided by the share of the site's executions reaching the target
    pub fn adjusted_weight(&self, target: &CallTarget, weight: u32) -> f32 {
        if self.has_profile {
            weight as f32 / target.frequency_adjustment.max(0.01)
        } else {
            weight as f32
        }
    }

    /// Weigh every viable top-level target
    pub fn weigh(&self, graph: &mut CallGraph) {
        for id in graph.viable_top_level_targets() {
            let site = graph.site(graph.target(id).site);
            let weight = self.weight(site, graph.target(id));
            let adjusted = self.adjusted_weight(graph.target(id), weight);
            trace!(callee = %graph.target(id).callee, weight, adjusted, "weighed");
            let t = graph.target_mut(id);
            t.weight = weight;
            t.adjusted_weight = adjusted;
        }
    }

    /// Viable top-level targets from best to worst
    ///
    /// Ties on weight and adjusted weight fall back to discovery order, then
    /// to target index, so the ranking is stable.
    pub fn rank(&self, graph: &CallGraph) -> Vec<CallTargetId> {
        let mut ranked = graph.viable_top_level_targets();
        ranked.sort_by(|&a, &b| compare(graph, a, b));
        ranked
    }
}

fn compare(graph: &CallGraph, a: CallTargetId, b: CallTargetId) -> Ordering {
    let (ta, tb) = (graph.target(a), graph.target(b));
    ta.weight
        .cmp(&tb.weight)
        .then_with(|| ta.adjusted_weight.total_cmp(&tb.adjusted_weight))
        .then_with(|| {
            graph
                .site(ta.site)
                .discovery_index
                .cmp(&graph.site(tb.site).discovery_index)
        })
        .then_with(|| a.cmp(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_graph::CallSiteId;
    use crate::guard::VirtualGuardSelection;
    use crate::ir::NodeId;
    use crate::prex::ArgFact;
    use core_types::{CallSiteKey, KnownObjectId, MethodId};

    fn site(kind: CallKind, frequency: u32) -> CallSite {
        CallSite {
            id: CallSiteId(0),
            caller: MethodId(1),
            call_node: NodeId(0),
            key: CallSiteKey::new(MethodId(1), 0),
            kind,
            is_indirect: false,
            targets: Vec::new(),
            depth: 1,
            discovery_index: 0,
            block_frequency: frequency,
            loop_depth: 0,
            arg_count: 1,
            parent: None,
            tail_recursion: false,
            rejection: None,
        }
    }

    fn target(size: u32) -> CallTarget {
        let mut t = CallTarget::new(CallTargetId(0), CallSiteId(0), MethodId(2), VirtualGuardSelection::none());
        t.size = size;
        t.is_leaf = false;
        t
    }

    #[test]
    fn test_hot_sites_discounted_with_floor() {
        assert_eq!(scale_by_block_frequency(100, 10_000, (2500, 1000), false), 70);
        assert_eq!(scale_by_block_frequency(12, 10_000, (2500, 1000), false), 10);
        assert_eq!(scale_by_block_frequency(6, 10_000, (2500, 1000), false), 6);
    }

    #[test]
    fn test_cold_sites_inflated() {
        // a tenth of the maximum frequency costs a hundred times more
        assert_eq!(scale_by_block_frequency(10, 1010, (2500, 2000), false), 1000);
        assert_eq!(scale_by_block_frequency(10, 0, (2500, 1000), false), u32::MAX);
        assert_eq!(scale_by_block_frequency(10, 0, (2500, 1000), true), 10);
        assert_eq!(scale_by_block_frequency(10, 1500, (2500, 1000), false), 10);
    }

    #[test]
    fn test_argument_facts_discount() {
        let config = InlinerConfig::default();
        let weigher = Weigher::new(&config, false);
        let s = site(CallKind::Static, 2000);
        let mut t = target(100);
        assert_eq!(weigher.weight(&s, &t), 100);
        t.prex.set(0, ArgFact::known(KnownObjectId(1), None));
        assert_eq!(weigher.weight(&s, &t), 90);
        t.prex.set(0, ArgFact::fixed(core_types::ClassId(1)));
        assert_eq!(weigher.weight(&s, &t), 95);
    }

    #[test]
    fn test_leaf_and_thunk_discounts() {
        let config = InlinerConfig::default();
        let weigher = Weigher::new(&config, false);
        let mut t = target(100);
        t.is_leaf = true;
        assert_eq!(weigher.weight(&site(CallKind::Static, 2000), &t), 75);
        assert_eq!(weigher.weight(&site(CallKind::MethodHandleThunk, 2000), &t), 37);
    }

    #[test]
    fn test_very_hot_large_callee_penalized() {
        let config = InlinerConfig {
            hotness: Hotness::VeryHot,
            ..InlinerConfig::default()
        };
        let weigher = Weigher::new(&config, false);
        // Hot border drops to 2000 above warm, so use a neutral frequency
        assert_eq!(weigher.weight(&site(CallKind::Static, 1500), &target(200)), 400);
        assert_eq!(weigher.weight(&site(CallKind::Static, 1500), &target(100)), 100);
    }

    #[test]
    fn test_adjusted_weight_uses_profile_share() {
        let config = InlinerConfig::default();
        let mut t = target(10);
        t.frequency_adjustment = 0.5;
        assert_eq!(Weigher::new(&config, true).adjusted_weight(&t, 40), 80.0);
        assert_eq!(Weigher::new(&config, false).adjusted_weight(&t, 40), 40.0);
    }
}
