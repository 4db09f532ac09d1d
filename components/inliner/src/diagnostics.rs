//! Decision log of one inlining pass
//!
//! The log is data for whoever drives the compiler: one [`Decision`] per
//! candidate with a stable reason code. It is separate from `tracing`
//! output, which is for debugging the inliner itself.

use crate::call_graph::{CallGraph, CallSite, CallTarget, CallTargetId};
use crate::guard::VirtualGuardSelection;
use core_types::{CallSiteKey, MethodId};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Reason code for nested candidates whose enclosing candidate was not inlined
pub const PARENT_NOT_INLINED: &str = "parent_not_inlined";

/// What happened to a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Selected within the budgets
    Accepted,
    /// Selected regardless of the budgets
    ForceInlined,
    /// Not inlined
    Rejected,
    /// Self tail call turned into a loop
    TailRecursionEliminated,
}

impl Outcome {
    /// Stable code for the outcome
    pub fn code(self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::ForceInlined => "force_inlined",
            Outcome::Rejected => "rejected",
            Outcome::TailRecursionEliminated => "tail_recursion_eliminated",
        }
    }

    /// Check if the call was replaced
    pub fn is_inlined(self) -> bool {
        matches!(self, Outcome::Accepted | Outcome::ForceInlined)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One logged decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    /// Call site
    pub site: CallSiteKey,
    /// Candidate callee, `None` when the site had no target
    pub callee: Option<MethodId>,
    /// 1 for calls in the method being compiled
    pub depth: u32,
    /// Outcome
    pub outcome: Outcome,
    /// Rejection code
    pub reason: Option<&'static str>,
    /// Guard protecting the candidate
    pub guard: Option<VirtualGuardSelection>,
    /// Estimated size
    pub size: u32,
    /// Weight used for ranking
    pub weight: u32,
}

/// Every decision of one pass, in discovery order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineLog {
    /// Method being compiled
    pub method: MethodId,
    /// Decisions
    pub decisions: Vec<Decision>,
}

impl InlineLog {
    /// Build the log from a graph after allocation
    pub fn from_graph(method: MethodId, graph: &CallGraph) -> Self {
        let mut decisions = Vec::new();
        for site in graph.sites() {
            if site.targets.is_empty() {
                decisions.push(Decision {
                    site: site.key,
                    callee: None,
                    depth: site.depth,
                    outcome: Outcome::Rejected,
                    reason: site.rejection.map(|r| r.code()),
                    guard: None,
                    size: 0,
                    weight: 0,
                });
                continue;
            }
            for &t in &site.targets {
                let target = graph.target(t);
                let (outcome, reason) = classify(graph, site, target);
                decisions.push(Decision {
                    site: site.key,
                    callee: Some(target.callee),
                    depth: site.depth,
                    outcome,
                    reason,
                    guard: target.guard.is_guarded().then_some(target.guard),
                    size: target.size,
                    weight: target.weight,
                });
            }
        }
        Self { method, decisions }
    }

    /// Decisions that replaced a call
    pub fn inlined(&self) -> impl Iterator<Item = &Decision> {
        self.decisions.iter().filter(|d| d.outcome.is_inlined())
    }

    /// Decisions with the given outcome
    pub fn with_outcome(&self, outcome: Outcome) -> impl Iterator<Item = &Decision> {
        self.decisions.iter().filter(move |d| d.outcome == outcome)
    }

    /// Rejections carrying a reason code
    pub fn rejected_with<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Decision> + 'a {
        self.decisions
            .iter()
            .filter(move |d| d.outcome == Outcome::Rejected && d.reason == Some(code))
    }

    /// Decision for a callee at a site
    pub fn find(&self, site: CallSiteKey, callee: MethodId) -> Option<&Decision> {
        self.decisions
            .iter()
            .find(|d| d.site == site && d.callee == Some(callee))
    }

    /// Render as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write every decision to the `tracing` output
    pub fn trace(&self) {
        for d in &self.decisions {
            debug!(
                method = %self.method,
                site = %d.site,
                callee = ?d.callee,
                depth = d.depth,
                outcome = %d.outcome,
                reason = d.reason.unwrap_or(""),
                size = d.size,
                weight = d.weight,
                "inline decision"
            );
        }
    }
}

fn classify(graph: &CallGraph, site: &CallSite, target: &CallTarget) -> (Outcome, Option<&'static str>) {
    if site.tail_recursion {
        return (Outcome::TailRecursionEliminated, None);
    }
    if let Some(reason) = target.rejection {
        return (Outcome::Rejected, Some(reason.code()));
    }
    let inlined = match site.parent {
        None => target.accepted,
        Some(parent) => target.included && is_inlined(graph, parent),
    };
    match (inlined, target.is_must_keep()) {
        (true, true) => (Outcome::ForceInlined, None),
        (true, false) => (Outcome::Accepted, None),
        (false, _) => (Outcome::Rejected, Some(PARENT_NOT_INLINED)),
    }
}

fn is_inlined(graph: &CallGraph, id: CallTargetId) -> bool {
    let target = graph.target(id);
    if !target.is_viable() {
        return false;
    }
    match graph.site(target.site).parent {
        None => target.accepted,
        Some(parent) => target.included && is_inlined(graph, parent),
    }
}
