//! Call graph built for one compilation unit
//!
//! Sites and targets live in flat tables addressed by index. Top-level
//! sites belong to the method being compiled; nested sites were found
//! while estimating a target's body and hang off that target. The graph
//! is acyclic: a method already on the [`CallStack`] is never expanded again.

use crate::guard::VirtualGuardSelection;
use crate::ir::{BlockId, CallKind, MethodBody, NodeId};
use crate::policy::PolicyBits;
use crate::prex::ArgumentPrexInfo;
use core_types::{CallSiteKey, MethodId};
use serde::Serialize;
use std::fmt;

/// Index of a [`CallSite`] in its [`CallGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CallSiteId(pub u32);

/// Index of a [`CallTarget`] in its [`CallGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CallTargetId(pub u32);

/// Why estimating a candidate failed; the candidate is dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EstimateFailure {
    /// The IR provider has no body for the callee
    BodyUnavailable,
    /// Nesting went past the configured recursion depth
    RecursedTooDeep,
    /// An argument's inferred class contradicts the callee signature
    ArgumentTypeConflict,
    /// Argument count does not match the callee's parameters
    ShapeMismatch,
}

impl EstimateFailure {
    /// Stable code for the decision log
    pub fn code(self) -> &'static str {
        match self {
            EstimateFailure::BodyUnavailable => "body_unavailable",
            EstimateFailure::RecursedTooDeep => "recursed_too_deep",
            EstimateFailure::ArgumentTypeConflict => "argument_type_conflict",
            EstimateFailure::ShapeMismatch => "shape_mismatch",
        }
    }
}

/// Why a candidate was not inlined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RejectReason {
    /// Estimated size above the callee size limit
    SizeThresholdExceeded,
    /// Ranked past the caller weight cut point
    CallerWeightBudget,
    /// Would push the estimated node count past the threshold
    NodeBudget,
    /// Too many call sites already accepted
    CallSiteBudget,
    /// Callee is already being expanded
    RecursiveCall,
    /// Policy forbids inlining the callee
    DontInline,
    /// Callee has no IR of its own
    NativeMethod,
    /// Callee has no body
    AbstractMethod,
    /// Devirtualization found nothing to inline
    NoTargets,
    /// Estimation failed
    EstimateFailed(EstimateFailure),
}

impl RejectReason {
    /// Stable code for the decision log
    pub fn code(self) -> &'static str {
        match self {
            RejectReason::SizeThresholdExceeded => "size_threshold_exceeded",
            RejectReason::CallerWeightBudget => "caller_weight_budget_exceeded",
            RejectReason::NodeBudget => "node_budget_exceeded",
            RejectReason::CallSiteBudget => "call_site_budget_exceeded",
            RejectReason::RecursiveCall => "recursive_call",
            RejectReason::DontInline => "dont_inline",
            RejectReason::NativeMethod => "native_method",
            RejectReason::AbstractMethod => "abstract_method",
            RejectReason::NoTargets => "no_targets",
            RejectReason::EstimateFailed(failure) => failure.code(),
        }
    }

    /// Check if the reason is a budget cut rather than a property of the callee
    pub fn is_budget(self) -> bool {
        matches!(
            self,
            RejectReason::CallerWeightBudget | RejectReason::NodeBudget | RejectReason::CallSiteBudget
        )
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One call instruction
#[derive(Debug, Clone)]
pub struct CallSite {
    /// Handle
    pub id: CallSiteId,
    /// Method containing the call
    pub caller: MethodId,
    /// Call node in the caller's body
    pub call_node: NodeId,
    /// Profile key
    pub key: CallSiteKey,
    /// Dispatch kind
    pub kind: CallKind,
    /// Target depends on the runtime receiver
    pub is_indirect: bool,
    /// Candidates, in guard chain order
    pub targets: Vec<CallTargetId>,
    /// 1 for calls in the method being compiled
    pub depth: u32,
    /// Position in discovery (program) order
    pub discovery_index: u32,
    /// Frequency of the block holding the call
    pub block_frequency: u32,
    /// Loops enclosing the call
    pub loop_depth: u32,
    /// Actual argument count
    pub arg_count: usize,
    /// Target whose body contains this site, `None` at top level
    pub parent: Option<CallTargetId>,
    /// Self tail call handed to the eliminator instead of the budget
    pub tail_recursion: bool,
    /// Why the site produced no target
    pub rejection: Option<RejectReason>,
}

/// Hot part of a callee chosen for partial inlining
#[derive(Debug, Clone, PartialEq)]
pub struct PartialInline {
    /// Size of the callee without its cold region
    pub hot_size: u32,
    /// Cold callee blocks replaced by a call to the whole callee
    pub restart_blocks: Vec<BlockId>,
}

/// One candidate callee body for a site
#[derive(Debug, Clone)]
pub struct CallTarget {
    /// Handle
    pub id: CallTargetId,
    /// Owning site
    pub site: CallSiteId,
    /// Resolved method
    pub callee: MethodId,
    /// Guard protecting the devirtualization
    pub guard: VirtualGuardSelection,
    /// Share of the site's profile going to this target, 1.0 without a profile
    pub frequency_adjustment: f32,
    /// A receiver profile backed the choice of this target
    pub profiled: bool,
    /// Estimated size, nested accepted children included
    pub size: u32,
    /// Estimated IR nodes the splice adds
    pub node_count: u32,
    /// Heuristic weight
    pub weight: u32,
    /// Weight adjusted by the profiled frequency
    pub adjusted_weight: f32,
    /// Hot part, when only that is inlined
    pub partial: Option<PartialInline>,
    /// Facts about the target's arguments
    pub prex: ArgumentPrexInfo,
    /// Peeked callee IR
    pub body: Option<MethodBody>,
    /// Call sites inside the callee body
    pub children: Vec<CallSiteId>,
    /// Policy flags of the callee
    pub policy: PolicyBits,
    /// Callee body contains no calls
    pub is_leaf: bool,
    /// Nested target counted into its parent's size
    pub included: bool,
    /// Why the target was dropped
    pub rejection: Option<RejectReason>,
    /// Selected for inlining
    pub accepted: bool,
}

impl CallTarget {
    /// Create a target with empty estimates
    pub fn new(id: CallTargetId, site: CallSiteId, callee: MethodId, guard: VirtualGuardSelection) -> Self {
        Self {
            id,
            site,
            callee,
            guard,
            frequency_adjustment: 1.0,
            profiled: false,
            size: 0,
            node_count: 0,
            weight: 0,
            adjusted_weight: 0.0,
            partial: None,
            prex: ArgumentPrexInfo::default(),
            body: None,
            children: Vec::new(),
            policy: PolicyBits::NONE,
            is_leaf: true,
            included: false,
            rejection: None,
            accepted: false,
        }
    }

    /// Bypasses every budget
    pub fn is_must_keep(&self) -> bool {
        self.policy.is_must_keep()
    }

    /// Still eligible for selection
    pub fn is_viable(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Sites and targets of one compilation unit
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    sites: Vec<CallSite>,
    targets: Vec<CallTarget>,
    top_level: Vec<CallSiteId>,
}

impl CallGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a site; `site.id` is overwritten with its new handle
    pub fn add_site(&mut self, mut site: CallSite) -> CallSiteId {
        let id = CallSiteId(self.sites.len() as u32);
        site.id = id;
        match site.parent {
            Some(parent) => self.targets[parent.0 as usize].children.push(id),
            None => self.top_level.push(id),
        }
        self.sites.push(site);
        id
    }

    /// Add a target to its site
    pub fn add_target(&mut self, site: CallSiteId, callee: MethodId, guard: VirtualGuardSelection) -> CallTargetId {
        let id = CallTargetId(self.targets.len() as u32);
        self.targets.push(CallTarget::new(id, site, callee, guard));
        self.sites[site.0 as usize].targets.push(id);
        id
    }

    /// Site by handle
    pub fn site(&self, id: CallSiteId) -> &CallSite {
        &self.sites[id.0 as usize]
    }

    /// Mutable site by handle
    pub fn site_mut(&mut self, id: CallSiteId) -> &mut CallSite {
        &mut self.sites[id.0 as usize]
    }

    /// Target by handle
    pub fn target(&self, id: CallTargetId) -> &CallTarget {
        &self.targets[id.0 as usize]
    }

    /// Mutable target by handle
    pub fn target_mut(&mut self, id: CallTargetId) -> &mut CallTarget {
        &mut self.targets[id.0 as usize]
    }

    /// All sites
    pub fn sites(&self) -> &[CallSite] {
        &self.sites
    }

    /// All targets
    pub fn targets(&self) -> &[CallTarget] {
        &self.targets
    }

    /// Sites of the method being compiled, in program order
    pub fn top_level_sites(&self) -> &[CallSiteId] {
        &self.top_level
    }

    /// Targets of top-level sites, in discovery order
    pub fn top_level_targets(&self) -> Vec<CallTargetId> {
        self.top_level
            .iter()
            .flat_map(|&s| self.site(s).targets.iter().copied())
            .collect()
    }

    /// Top-level targets still eligible for selection
    ///
    /// Targets of self tail calls are excluded: those sites go to the
    /// tail recursion eliminator, never to the budget.
    pub fn viable_top_level_targets(&self) -> Vec<CallTargetId> {
        self.top_level_targets()
            .into_iter()
            .filter(|&t| {
                let target = self.target(t);
                target.is_viable() && !self.site(target.site).tail_recursion
            })
            .collect()
    }

    /// Nesting depth of the site owning a target
    pub fn depth_of(&self, target: CallTargetId) -> u32 {
        self.site(self.target(target).site).depth
    }
}

/// Methods currently being expanded, outermost first
#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: Vec<MethodId>,
}

impl CallStack {
    /// Stack holding only the method being compiled
    pub fn new(root: MethodId) -> Self {
        Self { frames: vec![root] }
    }

    /// Enter a callee
    pub fn push(&mut self, method: MethodId) {
        self.frames.push(method);
    }

    /// Leave the innermost callee; the root frame stays
    pub fn pop(&mut self) -> Option<MethodId> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    /// Check if a method is being expanded
    pub fn contains(&self, method: MethodId) -> bool {
        self.frames.contains(&method)
    }

    /// Number of frames below the root
    pub fn depth(&self) -> u32 {
        self.frames.len().saturating_sub(1) as u32
    }

    /// Method being compiled
    pub fn root(&self) -> Option<MethodId> {
        self.frames.first().copied()
    }
}
