//! Budget-constrained selection of weighed candidates

use crate::call_graph::{CallGraph, CallSiteId, CallTargetId, RejectReason};
use crate::config::InlinerConfig;
use crate::error::{InlinerError, InlinerResult};
use core_types::Hotness;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

/// Node estimate for a target with the 1.1x safety factor, rounded up
pub fn padded_node_count(nodes: u32) -> u64 {
    (u64::from(nodes) * 11).div_ceil(10)
}

/// Result of one allocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    /// Selected targets in discovery order, reinstated ones included
    pub accepted: Vec<CallTargetId>,
    /// Targets cut by a budget
    pub rejected: Vec<(CallTargetId, RejectReason)>,
    /// Weight of the accepted targets that are not must-keep
    pub total_weight: u64,
    /// Estimated node count of the caller after inlining
    pub node_estimate: u64,
    /// Must-keep targets accepted regardless of budget
    pub forced: Vec<CallTargetId>,
}

impl Allocation {
    /// Check if a target was selected
    pub fn is_accepted(&self, target: CallTargetId) -> bool {
        self.accepted.contains(&target)
    }
}

/// Applies the weight, node and call-site budgets
pub struct BudgetAllocator<'a> {
    config: &'a InlinerConfig,
}

impl<'a> BudgetAllocator<'a> {
    /// Create an allocator
    pub fn new(config: &'a InlinerConfig) -> Self {
        Self { config }
    }

    /// Select from `ranked` (best first) and record the outcome in `graph`
    ///
    /// Must-keep targets skip both passes and are reinstated at the end. If
    /// that pushes the estimate past the hard ceiling in a hot unit the whole
    /// unit fails.
    pub fn allocate(
        &self,
        graph: &mut CallGraph,
        ranked: &[CallTargetId],
        caller_nodes: u32,
    ) -> InlinerResult<Allocation> {
        let mut allocation = Allocation::default();
        let (forced, candidates): (Vec<CallTargetId>, Vec<CallTargetId>) =
            ranked.iter().partition(|&&t| graph.target(t).is_must_keep());

        // Weight pass, rank order
        let limit = u64::from(self.config.caller_weight_limit);
        let trivial = u64::from(self.config.trivial_weight_for_limit);
        let mut running = 0u64;
        let mut cut = candidates.len();
        for (i, &t) in candidates.iter().enumerate() {
            let weight = u64::from(graph.target(t).weight);
            if weight > trivial && running + weight > limit {
                cut = i;
                break;
            }
            running += weight;
        }
        for &t in &candidates[cut..] {
            allocation.rejected.push((t, RejectReason::CallerWeightBudget));
        }
        if cut < candidates.len() {
            debug!(cut, running, limit, "caller weight budget reached");
        }

        // Node and call-site passes, discovery order
        let mut survivors = candidates[..cut].to_vec();
        survivors.sort_by_key(|&t| (graph.site(graph.target(t).site).discovery_index, t));
        let threshold = u64::from(self.config.node_count_threshold);
        let site_cap = self.config.max_inlined_call_sites as usize;
        let mut nodes = u64::from(caller_nodes);
        let mut sites: FxHashSet<CallSiteId> = FxHashSet::default();
        let mut node_cut = false;
        for t in survivors {
            if node_cut {
                allocation.rejected.push((t, RejectReason::NodeBudget));
                continue;
            }
            let target = graph.target(t);
            let cost = padded_node_count(target.node_count);
            if nodes + cost > threshold {
                debug!(nodes, cost, threshold, "node budget reached");
                node_cut = true;
                allocation.rejected.push((t, RejectReason::NodeBudget));
                continue;
            }
            if !sites.contains(&target.site) && sites.len() >= site_cap {
                allocation.rejected.push((t, RejectReason::CallSiteBudget));
                continue;
            }
            sites.insert(target.site);
            nodes += cost;
            allocation.total_weight += u64::from(target.weight);
            allocation.accepted.push(t);
        }

        // Reinstatement
        for &t in &forced {
            nodes += padded_node_count(graph.target(t).node_count);
            allocation.accepted.push(t);
            allocation.forced.push(t);
        }
        let ceiling = u64::from(self.config.node_count_ceiling);
        if nodes > ceiling && self.config.hotness >= Hotness::Hot {
            warn!(nodes, ceiling, "must-inline candidates exceed the node ceiling");
            return Err(InlinerError::NodeCeilingExceeded {
                nodes: u32::try_from(nodes).unwrap_or(u32::MAX),
                ceiling: self.config.node_count_ceiling,
            });
        }
        allocation.node_estimate = nodes;
        allocation
            .accepted
            .sort_by_key(|&t| (graph.site(graph.target(t).site).discovery_index, t));

        for &t in &allocation.accepted {
            graph.target_mut(t).accepted = true;
        }
        for &(t, reason) in &allocation.rejected {
            debug!(callee = %graph.target(t).callee, reason = reason.code(), "rejected by budget");
            graph.target_mut(t).rejection = Some(reason);
        }
        Ok(allocation)
    }
}
