//! Code size estimation for candidate callees
//!
//! Sizes start from the callee's live IR node count and are adjusted for
//! method category, call site loop nesting and fan-in. The recursive part
//! of estimation (peeking into nested calls) lives in the call graph
//! builder. This module holds the per-candidate arithmetic.

use crate::call_graph::PartialInline;
use crate::config::InlinerConfig;
use crate::ir::{BlockId, MethodBody};
use crate::policy::PolicyBits;
use core_types::{MethodId, ProfileOracle};
use rustc_hash::FxHashSet;

/// Extra size charged for dispatching through a guard
pub const INDIRECT_CALL_SIZE: u32 = 5;

/// Smallest cold region worth cutting off by partial inlining
pub const MIN_PARTIAL_COLD_SIZE: u32 = 100;

/// Deepest loop nesting that still earns a discount
const MAX_DISCOUNTED_LOOP_DEPTH: u32 = 3;

/// Per-candidate size arithmetic
pub struct SizeEstimator<'a> {
    config: &'a InlinerConfig,
    profile: Option<&'a dyn ProfileOracle>,
}

impl<'a> SizeEstimator<'a> {
    /// Create an estimator
    pub fn new(config: &'a InlinerConfig, profile: Option<&'a dyn ProfileOracle>) -> Self {
        Self { config, profile }
    }

    /// Unadjusted size of a body
    pub fn base_size(&self, body: &MethodBody, is_indirect: bool) -> u32 {
        let nodes = body.node_count() as u32;
        if is_indirect {
            nodes + INDIRECT_CALL_SIZE
        } else {
            nodes
        }
    }

    /// Apply method category adjustments
    pub fn adjust_for_category(&self, size: u32, policy: PolicyBits, synchronized: bool, constant_args: usize) -> u32 {
        if policy.contains(PolicyBits::CHEAP_LIBRARY) {
            return self.config.cheap_library_size;
        }
        let mut size = size;
        if synchronized {
            size = (size / 2).max(1);
        }
        if policy.contains(PolicyBits::CONSTANT_FOLDABLE) {
            let keep = 100 - self.config.constant_arg_scale_pct;
            for _ in 0..constant_args {
                size = size * keep / 100;
            }
            size = size.max(1);
        }
        size
    }

    /// Discount a size for the loops enclosing the call site
    pub fn adjust_for_loops(&self, size: u32, loop_depth: u32) -> u32 {
        let mut pct = self.config.loop_nesting_discount_pct;
        if self.config.aggressive_loop_inlining {
            pct *= 2;
        }
        let discount = (pct * loop_depth.min(MAX_DISCOUNTED_LOOP_DEPTH)).min(90);
        (size * (100 - discount) / 100).max(1)
    }

    /// Inflate a size by how little of the callee's fan-in `caller` accounts for
    pub fn adjust_for_fan_in(&self, size: u32, callee: MethodId, caller: MethodId) -> u32 {
        if self.config.disable_fan_in || size < self.config.min_fan_in_size {
            return size;
        }
        let Some(fan_in) = self.profile.and_then(|p| p.fan_in(callee)) else {
            return size;
        };
        let total = fan_in.total_weight();
        if total == 0 {
            return size;
        }
        let own = fan_in.weight_of(caller);
        let fraction = if own > 0 {
            own as f64 / total as f64
        } else if fan_in.other_weight() as f64 / total as f64 > self.config.fan_in_other_bucket_threshold as f64 {
            // The caller may hide in the untracked bucket
            return size;
        } else {
            0.0
        };
        let factor = 1.0 + self.config.fan_in_size_multiplier as f64 * (1.0 - fraction);
        (size as f64 * factor).round().min(u32::MAX as f64) as u32
    }

    /// Find cold blocks that can be replaced by a call to the whole callee
    ///
    /// A cold block qualifies when every path from the entry to it runs only
    /// through side-effect-free blocks, so restarting the callee from scratch
    /// is unobservable.
    pub fn analyze_partial(&self, body: &MethodBody, size: u32, synchronized: bool) -> Option<PartialInline> {
        if self.config.disable_partial_inlining || synchronized {
            return None;
        }
        let layout = body.layout();
        if layout.iter().any(|&b| body.block(b).handler.is_some()) {
            return None;
        }
        let entry = body.entry();
        let is_cold = |b: BlockId| b != entry && (body.block(b).frequency == 0 || body.block(b).cold);
        if !layout.iter().any(|&b| is_cold(b)) {
            return None;
        }
        let cfg = body.cfg();

        let mut clean: FxHashSet<BlockId> = layout
            .iter()
            .copied()
            .filter(|&b| !is_cold(b) && is_effect_free(body, b))
            .collect();
        loop {
            let dirty: Vec<BlockId> = clean
                .iter()
                .copied()
                .filter(|&b| cfg.predecessors(b).iter().any(|p| !clean.contains(p)))
                .collect();
            if dirty.is_empty() {
                break;
            }
            for b in dirty {
                clean.remove(&b);
            }
        }
        if !clean.contains(&entry) {
            return None;
        }

        let restart_blocks: Vec<BlockId> = layout
            .iter()
            .copied()
            .filter(|&b| is_cold(b))
            .filter(|&b| {
                let preds = cfg.predecessors(b);
                !preds.is_empty() && preds.iter().all(|p| clean.contains(p))
            })
            .collect();
        if restart_blocks.is_empty() {
            return None;
        }

        let mut hot = FxHashSet::default();
        let mut pending = vec![entry];
        while let Some(b) = pending.pop() {
            if restart_blocks.contains(&b) || !hot.insert(b) {
                continue;
            }
            pending.extend(cfg.successors(b).iter().copied());
        }
        let total = body.node_count() as u32;
        let mut seen = FxHashSet::default();
        let mut hot_nodes = 0u32;
        for &b in layout.iter().filter(|b| hot.contains(*b)) {
            let block = body.block(b);
            for root in block.stmts().iter().copied().chain(block.terminator().operands()) {
                hot_nodes += body.arena().post_order(root, &mut seen).len() as u32;
            }
        }
        let cold_nodes = total.saturating_sub(hot_nodes);
        if cold_nodes < MIN_PARTIAL_COLD_SIZE {
            return None;
        }
        let hot_size = ((size as u64 * hot_nodes as u64) / total.max(1) as u64).max(1) as u32;
        Some(PartialInline {
            hot_size,
            restart_blocks,
        })
    }
}

fn is_effect_free(body: &MethodBody, block: BlockId) -> bool {
    let b = body.block(block);
    let mut seen = FxHashSet::default();
    b.stmts()
        .iter()
        .copied()
        .chain(b.terminator().operands())
        .flat_map(|root| body.arena().post_order(root, &mut seen))
        .all(|n| !body.op(n).has_side_effects())
}
