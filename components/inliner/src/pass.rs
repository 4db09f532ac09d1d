//! Pass driver
//!
//! One [`InlinerPass`] runs over one compilation unit in three phases.
//! Discovery, estimation and weighing only read IR. Allocation decides.
//! Transformation is the only phase that mutates the body, and it sees
//! nothing but the accepted candidates.

use crate::budget::{Allocation, BudgetAllocator};
use crate::builder::CallGraphBuilder;
use crate::call_graph::{CallGraph, CallTargetId};
use crate::config::InlinerConfig;
use crate::diagnostics::InlineLog;
use crate::error::InlinerResult;
use crate::ir::MethodBody;
use crate::policy::PolicyTable;
use crate::prex::{ArgumentPrexInfo, GlobalTypeInfo};
use crate::program::{IrProvider, MethodResolver};
use crate::transform::Transformer;
use crate::weigh::Weigher;
use core_types::{MethodId, ProfileOracle};
use serde::Serialize;
use tracing::{debug, debug_span};

/// Decisions for one unit, before any mutation
#[derive(Debug, Clone)]
pub struct InlinePlan {
    /// Sites and targets with their estimates
    pub graph: CallGraph,
    /// Viable top-level targets, best first
    pub ranked: Vec<CallTargetId>,
    /// Budget outcome
    pub allocation: Allocation,
}

impl InlinePlan {
    /// Decision log for the plan
    pub fn log(&self, method: MethodId) -> InlineLog {
        InlineLog::from_graph(method, &self.graph)
    }
}

/// Summary of one run
#[derive(Debug, Clone, Serialize)]
pub struct InlineReport {
    /// Per-candidate decisions
    pub log: InlineLog,
    /// Top-level call sites replaced
    pub inlined_sites: usize,
    /// Targets spliced, nested ones included
    pub inlined_targets: usize,
    /// Self tail calls turned into loops
    pub tail_calls_eliminated: usize,
    /// Guards emitted
    pub guards_emitted: usize,
    /// Cold regions left to a restart call
    pub restart_calls: usize,
    /// Live nodes before the pass
    pub nodes_before: usize,
    /// Live nodes after the pass
    pub nodes_after: usize,
    /// Node count the allocator predicted
    pub estimated_nodes: u64,
}

impl InlineReport {
    /// Check if the pass changed the body
    pub fn changed(&self) -> bool {
        self.inlined_sites > 0 || self.tail_calls_eliminated > 0
    }
}

/// The inliner for one compilation unit
pub struct InlinerPass<'a> {
    config: &'a InlinerConfig,
    resolver: &'a dyn MethodResolver,
    ir: &'a dyn IrProvider,
    profile: Option<&'a dyn ProfileOracle>,
    policy: PolicyTable,
    global: Option<&'a GlobalTypeInfo>,
}

impl<'a> InlinerPass<'a> {
    /// Create a pass over `program` with the legacy policy rules installed
    pub fn new<P>(config: &'a InlinerConfig, program: &'a P, profile: Option<&'a dyn ProfileOracle>) -> Self
    where
        P: MethodResolver + IrProvider,
    {
        Self {
            config,
            resolver: program,
            ir: program,
            profile,
            policy: PolicyTable::with_legacy_rules(),
            global: None,
        }
    }

    /// Replace the policy table
    pub fn with_policy(mut self, policy: PolicyTable) -> Self {
        self.policy = policy;
        self
    }

    /// Use facts from an upstream global type analysis
    pub fn with_global_types(mut self, global: &'a GlobalTypeInfo) -> Self {
        self.global = Some(global);
        self
    }

    /// Policy table in use
    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// Discover, estimate, weigh and allocate without touching `body`
    pub fn plan(&self, body: &MethodBody, prex: &ArgumentPrexInfo) -> InlinerResult<InlinePlan> {
        self.config.validate()?;
        let mut builder = CallGraphBuilder::new(self.config, self.resolver, self.ir, self.profile, &self.policy);
        if let Some(global) = self.global {
            builder = builder.with_global_types(global);
        }
        let mut graph = builder.build(body, prex);

        let weigher = Weigher::new(self.config, self.profile.is_some());
        weigher.weigh(&mut graph);
        let ranked = weigher.rank(&graph);

        let caller_nodes = u32::try_from(body.node_count()).unwrap_or(u32::MAX);
        let allocation = BudgetAllocator::new(self.config).allocate(&mut graph, &ranked, caller_nodes)?;
        Ok(InlinePlan {
            graph,
            ranked,
            allocation,
        })
    }

    /// Inline into `body`
    ///
    /// `prex` holds what the caller of this unit knows about its arguments;
    /// pass an empty one when nothing is known.
    pub fn run(&self, body: &mut MethodBody, prex: &ArgumentPrexInfo) -> InlinerResult<InlineReport> {
        let span = debug_span!("inline", method = %body.method());
        let _guard = span.enter();

        let nodes_before = body.node_count();
        let plan = self.plan(body, prex)?;
        let log = plan.log(body.method());
        log.trace();

        let stats = Transformer::new(self.resolver, &plan.graph).apply(body)?;
        let report = InlineReport {
            log,
            inlined_sites: stats.inlined_sites,
            inlined_targets: stats.inlined_targets.len(),
            tail_calls_eliminated: stats.tail_calls_eliminated,
            guards_emitted: stats.guards_emitted,
            restart_calls: stats.restart_calls,
            nodes_before,
            nodes_after: body.node_count(),
            estimated_nodes: plan.allocation.node_estimate,
        };
        debug!(
            sites = report.inlined_sites,
            tail_calls = report.tail_calls_eliminated,
            nodes_before,
            nodes_after = report.nodes_after,
            "inlining finished"
        );
        Ok(report)
    }
}
