//! Call graph construction
//!
//! The builder walks the method being compiled once, in program order.
//! Each call is devirtualized into zero or more candidate targets, and each
//! target is estimated by peeking at the callee body and recursing into the
//! calls found there. Nothing here mutates IR.

use crate::call_graph::{
    CallGraph, CallSite, CallSiteId, CallStack, CallTargetId, EstimateFailure, RejectReason,
};
use crate::config::InlinerConfig;
use crate::estimate::SizeEstimator;
use crate::guard::{GuardKind, TestType, VirtualGuardSelection};
use crate::ir::{Anchor, CallKind, CallOp, MethodBody, NodeId};
use crate::policy::{PolicyBits, PolicyTable};
use crate::prex::{ArgumentPrexInfo, ArgumentPropagator, GlobalTypeInfo};
use crate::program::{IrProvider, MethodResolver};
use crate::tail_recursion;
use core_types::{CallSiteKey, ClassId, MethodId, ProfileOracle};
use tracing::{debug, trace};

/// Devirtualization result for one call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTarget {
    /// Method the call would reach
    pub callee: MethodId,
    /// Guard protecting the assumption
    pub guard: VirtualGuardSelection,
    /// Share of the site's executions expected to reach `callee`
    pub frequency: f32,
    /// Chosen from a receiver profile
    pub profiled: bool,
}

impl ResolvedTarget {
    fn exact(callee: MethodId, guard: VirtualGuardSelection) -> Self {
        Self {
            callee,
            guard,
            frequency: 1.0,
            profiled: false,
        }
    }
}

/// Builds the [`CallGraph`] of one compilation unit
pub struct CallGraphBuilder<'a> {
    config: &'a InlinerConfig,
    resolver: &'a dyn MethodResolver,
    ir: &'a dyn IrProvider,
    profile: Option<&'a dyn ProfileOracle>,
    policy: &'a PolicyTable,
    global: Option<&'a GlobalTypeInfo>,
    graph: CallGraph,
    discovered: u32,
}

impl<'a> CallGraphBuilder<'a> {
    /// Create a builder
    pub fn new(
        config: &'a InlinerConfig,
        resolver: &'a dyn MethodResolver,
        ir: &'a dyn IrProvider,
        profile: Option<&'a dyn ProfileOracle>,
        policy: &'a PolicyTable,
    ) -> Self {
        Self {
            config,
            resolver,
            ir,
            profile,
            policy,
            global: None,
            graph: CallGraph::new(),
            discovered: 0,
        }
    }

    /// Use facts from an upstream global type analysis for top-level calls
    pub fn with_global_types(mut self, global: &'a GlobalTypeInfo) -> Self {
        self.global = Some(global);
        self
    }

    /// Discover and estimate every call reachable from `body`
    ///
    /// Eliminating a self tail call stores new values into every parameter
    /// on the back edge, so entry facts about parameters no longer hold
    /// across iterations. Such units are discovered without `prex` and
    /// without global facts.
    pub fn build(mut self, body: &MethodBody, prex: &ArgumentPrexInfo) -> CallGraph {
        let mut stack = CallStack::new(body.method());
        if self.has_self_tail_call(body, prex) {
            debug!(method = %body.method(), "parameters rebound by tail recursion, entry facts dropped");
            self.global = None;
            self.discover(body, &ArgumentPrexInfo::default(), None, 1, &mut stack);
        } else {
            self.discover(body, prex, None, 1, &mut stack);
        }
        debug!(
            method = %body.method(),
            sites = self.graph.sites().len(),
            targets = self.graph.targets().len(),
            "call graph built"
        );
        self.graph
    }

    fn discover(
        &mut self,
        body: &MethodBody,
        prex: &ArgumentPrexInfo,
        parent: Option<CallTargetId>,
        depth: u32,
        stack: &mut CallStack,
    ) {
        for call in body.calls_in_program_order() {
            let Some(op) = body.op(call).as_call().copied() else {
                continue;
            };
            let block = body.block(body.locate(call).map_or(body.entry(), Anchor::block));
            let site = self.graph.add_site(CallSite {
                id: CallSiteId(0),
                caller: body.method(),
                call_node: call,
                key: CallSiteKey::new(op.owner, op.bc_index),
                kind: op.kind,
                is_indirect: op.kind.is_indirect(),
                targets: Vec::new(),
                depth,
                discovery_index: self.discovered,
                block_frequency: block.frequency,
                loop_depth: block.loop_depth,
                arg_count: body.arena().children(call).len(),
                parent,
                tail_recursion: false,
                rejection: None,
            });
            self.discovered += 1;

            let global = if depth == 1 { self.global } else { None };
            let resolved = self.find_targets(body, prex, global, call, &op);
            if resolved.is_empty() {
                trace!(site = %self.graph.site(site).key, "no call targets");
                self.graph.site_mut(site).rejection = Some(RejectReason::NoTargets);
                continue;
            }

            if depth == 1 && self.is_tail_recursion(body, call, &resolved) {
                debug!(site = %self.graph.site(site).key, "self tail call");
                self.graph.site_mut(site).tail_recursion = true;
                self.graph.add_target(site, resolved[0].callee, resolved[0].guard);
                continue;
            }

            for candidate in resolved {
                let target = self.graph.add_target(site, candidate.callee, candidate.guard);
                {
                    let t = self.graph.target_mut(target);
                    t.frequency_adjustment = candidate.frequency;
                    t.profiled = candidate.profiled;
                }
                self.estimate(target, body, prex, global, stack, depth);
                if depth == 1 {
                    self.check_top_level_size(target);
                }
            }
        }
    }

    /// Candidate targets of one call, in guard chain order
    pub fn find_targets(
        &self,
        body: &MethodBody,
        prex: &ArgumentPrexInfo,
        global: Option<&GlobalTypeInfo>,
        call: NodeId,
        op: &CallOp,
    ) -> Vec<ResolvedTarget> {
        match op.kind {
            CallKind::Static | CallKind::Special | CallKind::MethodHandleThunk => {
                vec![ResolvedTarget::exact(op.method, VirtualGuardSelection::none())]
            }
            CallKind::MutableCallSite => self
                .resolver
                .mutable_call_site_target(CallSiteKey::new(op.owner, op.bc_index))
                .map(|target| {
                    let guard = VirtualGuardSelection::new(GuardKind::MutableCallSiteGuard, TestType::MethodTest, None);
                    vec![ResolvedTarget::exact(target, guard)]
                })
                .unwrap_or_default(),
            CallKind::Virtual | CallKind::Interface => self.devirtualize(body, prex, global, call, op),
        }
    }

    fn devirtualize(
        &self,
        body: &MethodBody,
        prex: &ArgumentPrexInfo,
        global: Option<&GlobalTypeInfo>,
        call: NodeId,
        op: &CallOp,
    ) -> Vec<ResolvedTarget> {
        let resolver = self.resolver;
        let Some(declared) = resolver.method(op.method) else {
            return Vec::new();
        };
        if declared.flags.is_static {
            return vec![ResolvedTarget::exact(op.method, VirtualGuardSelection::none())];
        }
        let facts = match ArgumentPropagator::new(resolver).propagate(body, prex, global, call, declared) {
            Ok(facts) => facts,
            Err(conflict) => {
                trace!(method = %op.method, ordinal = conflict.ordinal, "receiver facts conflict");
                return Vec::new();
            }
        };
        let receiver = facts.get(0).copied();

        if let Some((fact, class)) = receiver.and_then(|f| f.class.filter(|_| f.is_fixed).map(|c| (f, c))) {
            return self
                .concrete_target(class, op.method)
                .map(|target| {
                    let guard = if fact.preexistent || fact.known_object.is_some() {
                        VirtualGuardSelection::none()
                    } else {
                        VirtualGuardSelection::new(GuardKind::HierarchyGuard, TestType::VftTest, Some(class))
                    };
                    vec![ResolvedTarget::exact(target, guard)]
                })
                .unwrap_or_default();
        }

        let receiver_class = receiver.and_then(|f| f.class).unwrap_or(declared.holder);
        if !resolver.is_overridden(op.method, receiver_class) {
            if let Some(target) = self.concrete_target(receiver_class, op.method) {
                let guard = VirtualGuardSelection::new(GuardKind::HierarchyGuard, TestType::VftTest, Some(receiver_class));
                return vec![ResolvedTarget::exact(target, guard)];
            }
        }

        if let Some(target) = resolver.single_implementer(receiver_class, op.method) {
            let is_interface = op.kind == CallKind::Interface
                || resolver.class(receiver_class).is_some_and(|c| c.is_interface);
            let kind = if is_interface {
                GuardKind::InterfaceGuard
            } else {
                GuardKind::NonoverriddenGuard
            };
            return vec![ResolvedTarget::exact(
                target,
                VirtualGuardSelection::new(kind, TestType::MethodTest, None),
            )];
        }

        self.profiled_targets(CallSiteKey::new(op.owner, op.bc_index), receiver_class, op.method)
    }

    fn concrete_target(&self, class: ClassId, method: MethodId) -> Option<MethodId> {
        let target = self.resolver.resolve_in_class(class, method)?;
        let info = self.resolver.method(target)?;
        (!info.flags.is_abstract).then_some(target)
    }

    fn profiled_targets(&self, key: CallSiteKey, receiver_class: ClassId, method: MethodId) -> Vec<ResolvedTarget> {
        if self.config.disable_profiled_guards {
            return Vec::new();
        }
        let Some(histogram) = self.profile.and_then(|p| p.receiver_histogram(key)) else {
            return Vec::new();
        };
        let total = histogram.total();
        if total == 0 {
            return Vec::new();
        }
        let mut targets: Vec<ResolvedTarget> = Vec::new();
        for (class, count) in histogram.sorted() {
            if targets.len() >= self.config.max_profiled_targets {
                break;
            }
            let frequency = (count as f64 / total as f64) as f32;
            if frequency < self.config.min_profiled_call_frequency {
                break;
            }
            if !self.resolver.is_instance_of(class, receiver_class) {
                continue;
            }
            let Some(target) = self.concrete_target(class, method) else {
                continue;
            };
            let prefer_method_test = self
                .policy
                .bits_for(self.resolver, target)
                .contains(PolicyBits::PREFER_METHOD_TEST);
            if prefer_method_test {
                if let Some(existing) = targets
                    .iter_mut()
                    .find(|t| t.callee == target && t.guard.test == TestType::MethodTest)
                {
                    existing.frequency += frequency;
                    continue;
                }
            }
            let guard = if prefer_method_test {
                VirtualGuardSelection::new(GuardKind::ProfiledGuard, TestType::MethodTest, None)
            } else {
                VirtualGuardSelection::new(GuardKind::ProfiledGuard, TestType::VftTest, Some(class))
            };
            targets.push(ResolvedTarget {
                callee: target,
                guard,
                frequency,
                profiled: true,
            });
        }
        targets
    }

    fn has_self_tail_call(&self, body: &MethodBody, prex: &ArgumentPrexInfo) -> bool {
        body.calls_in_program_order().into_iter().any(|call| {
            body.op(call).as_call().copied().is_some_and(|op| {
                let resolved = self.find_targets(body, prex, self.global, call, &op);
                self.is_tail_recursion(body, call, &resolved)
            })
        })
    }

    fn is_tail_recursion(&self, body: &MethodBody, call: NodeId, resolved: &[ResolvedTarget]) -> bool {
        if self.config.disable_tail_recursion || resolved.len() != 1 || resolved[0].callee != body.method() {
            return false;
        }
        let synchronized = self
            .resolver
            .method(body.method())
            .map_or(true, |m| m.flags.is_synchronized);
        !synchronized && tail_recursion::analyze(body, call).is_some()
    }

    fn reject(&mut self, target: CallTargetId, reason: RejectReason) {
        trace!(callee = %self.graph.target(target).callee, reason = reason.code(), "candidate dropped");
        self.graph.target_mut(target).rejection = Some(reason);
    }

    fn estimate(
        &mut self,
        target: CallTargetId,
        caller: &MethodBody,
        caller_prex: &ArgumentPrexInfo,
        global: Option<&GlobalTypeInfo>,
        stack: &mut CallStack,
        depth: u32,
    ) {
        let resolver = self.resolver;
        let config = self.config;
        let callee = self.graph.target(target).callee;
        let site = self.graph.site(self.graph.target(target).site).clone();

        let Some(info) = resolver.method(callee) else {
            self.reject(target, RejectReason::EstimateFailed(EstimateFailure::BodyUnavailable));
            return;
        };
        let policy = self.policy.bits_for(resolver, callee);
        self.graph.target_mut(target).policy = policy;

        if policy.contains(PolicyBits::DONT_INLINE) {
            self.reject(target, RejectReason::DontInline);
            return;
        }
        if info.flags.is_native {
            self.reject(target, RejectReason::NativeMethod);
            return;
        }
        if info.flags.is_abstract {
            self.reject(target, RejectReason::AbstractMethod);
            return;
        }
        if stack.contains(callee) {
            self.reject(target, RejectReason::RecursiveCall);
            return;
        }
        if depth > config.max_recursion_depth {
            self.reject(target, RejectReason::EstimateFailed(EstimateFailure::RecursedTooDeep));
            return;
        }
        if info.arg_count() != site.arg_count {
            self.reject(target, RejectReason::EstimateFailed(EstimateFailure::ShapeMismatch));
            return;
        }
        let prex = match ArgumentPropagator::new(resolver).propagate(caller, caller_prex, global, site.call_node, info) {
            Ok(prex) => prex,
            Err(_) => {
                self.reject(target, RejectReason::EstimateFailed(EstimateFailure::ArgumentTypeConflict));
                return;
            }
        };
        let Some(body) = self.ir.generate(callee) else {
            self.reject(target, RejectReason::EstimateFailed(EstimateFailure::BodyUnavailable));
            return;
        };
        if body.param_count() != info.arg_count() {
            self.reject(target, RejectReason::EstimateFailed(EstimateFailure::ShapeMismatch));
            return;
        }

        let estimator = SizeEstimator::new(config, self.profile);
        let constant_args = prex.iter().flatten().filter(|f| f.is_constant).count();
        let synchronized = info.flags.is_synchronized;
        let mut size = estimator.base_size(&body, site.is_indirect);
        size = estimator.adjust_for_category(size, policy, synchronized, constant_args);
        size = estimator.adjust_for_loops(size, site.loop_depth);
        size = estimator.adjust_for_fan_in(size, callee, site.caller);
        let mut partial = estimator.analyze_partial(&body, size, synchronized);

        let guard_overhead = if self.graph.target(target).guard.is_guarded() {
            site.arg_count as u32 + 3
        } else {
            0
        };
        let mut node_count = body.node_count() as u32 + 2 * site.arg_count as u32 + guard_overhead;
        let is_leaf = body.calls_in_program_order().is_empty();

        {
            let t = self.graph.target_mut(target);
            if !info.flags.is_static {
                if let Some(class) = prex.get(0).filter(|f| f.is_fixed).and_then(|f| f.class) {
                    t.guard = t.guard.prefer_vft_test(class);
                }
            }
            t.prex = prex.clone();
            t.is_leaf = is_leaf;
        }

        stack.push(callee);
        self.discover(&body, &prex, Some(target), depth + 1, stack);
        stack.pop();

        for child_site in self.graph.target(target).children.clone() {
            for child in self.graph.site(child_site).targets.clone() {
                let t = self.graph.target(child);
                if !t.is_viable() {
                    continue;
                }
                if t.size <= config.max_nested_callee_size || t.is_must_keep() {
                    let (child_size, child_nodes) = (t.size, t.node_count);
                    self.graph.target_mut(child).included = true;
                    size = size.saturating_add(child_size);
                    node_count = node_count.saturating_add(child_nodes);
                    if let Some(p) = partial.as_mut() {
                        p.hot_size = p.hot_size.saturating_add(child_size);
                    }
                } else {
                    self.reject(child, RejectReason::SizeThresholdExceeded);
                }
            }
        }

        trace!(callee = %callee, depth, size, nodes = node_count, "estimated");
        let t = self.graph.target_mut(target);
        t.size = size;
        t.node_count = node_count;
        t.partial = partial;
        t.body = Some(body);
    }

    fn check_top_level_size(&mut self, target: CallTargetId) {
        let t = self.graph.target(target);
        if !t.is_viable() || t.is_must_keep() {
            return;
        }
        let effective = t.partial.as_ref().map_or(t.size, |p| p.hot_size);
        if effective > self.config.max_callee_size {
            self.reject(target, RejectReason::SizeThresholdExceeded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Terminator;
    use crate::program::ProgramDatabase;
    use core_types::{ClassInfo, MethodFlags, MethodInfo, ProfileData, ValueType};

    const BASE: ClassId = ClassId(1);
    const SUB_A: ClassId = ClassId(2);
    const SUB_B: ClassId = ClassId(3);

    fn instance(id: u32, holder: ClassId) -> MethodInfo {
        MethodInfo::new(MethodId(id), holder, "run", "()I", vec![], ValueType::Int)
    }

    fn returning_body(info: &MethodInfo, value: i64) -> MethodBody {
        let mut body = MethodBody::for_method(info);
        let v = body.int(value);
        body.set_terminator(body.entry(), Terminator::Return(Some(v)));
        body
    }

    fn program() -> ProgramDatabase {
        let mut db = ProgramDatabase::new();
        db.add_class(ClassInfo::new(BASE, "Base", None));
        db.add_class(ClassInfo::new(SUB_A, "SubA", Some(BASE)));
        db.add_class(ClassInfo::new(SUB_B, "SubB", Some(BASE)));
        for (id, holder) in [(10, BASE), (11, SUB_A), (12, SUB_B)] {
            let info = instance(id, holder);
            db.add_body(returning_body(&info, id as i64));
            db.add_method(info);
        }
        let caller = MethodInfo::new(MethodId(1), BASE, "main", "(LBase;)I", vec![ValueType::Reference(BASE)], ValueType::Int)
            .with_flags(MethodFlags {
                is_static: true,
                ..Default::default()
            });
        db.add_method(caller);
        db
    }

    fn caller_calling(method: MethodId, kind: CallKind) -> (MethodBody, NodeId) {
        let mut body = MethodBody::new(MethodId(1), &[ValueType::Reference(BASE)]);
        let recv = body.load(body.param(0));
        let call = body.call(method, kind, 7, vec![recv]);
        body.set_terminator(body.entry(), Terminator::Return(Some(call)));
        (body, call)
    }

    #[test]
    fn test_profiled_targets_stop_below_minimum() {
        let db = program();
        let config = InlinerConfig::default();
        let policy = PolicyTable::new();
        let mut profile = ProfileData::new();
        let key = CallSiteKey::new(MethodId(1), 7);
        profile.record_receiver(key, SUB_A, 70);
        profile.record_receiver(key, SUB_B, 25);
        profile.record_receiver(key, BASE, 5);
        let builder = CallGraphBuilder::new(&config, &db, &db, Some(&profile), &policy);
        let (body, call) = caller_calling(MethodId(10), CallKind::Virtual);
        let op = *body.op(call).as_call().unwrap();

        let targets = builder.find_targets(&body, &ArgumentPrexInfo::default(), None, call, &op);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].callee, MethodId(11));
        assert_eq!(targets[0].guard.kind, GuardKind::ProfiledGuard);
        assert_eq!(targets[0].guard.class, Some(SUB_A));
        assert_eq!(targets[1].callee, MethodId(12));
        assert!(targets.iter().all(|t| t.profiled));
    }

    #[test]
    fn test_not_overridden_gets_hierarchy_guard() {
        let db = program();
        let config = InlinerConfig::default();
        let policy = PolicyTable::new();
        let builder = CallGraphBuilder::new(&config, &db, &db, None, &policy);
        let (body, call) = caller_calling(MethodId(11), CallKind::Virtual);
        let op = *body.op(call).as_call().unwrap();
        let mut prex = ArgumentPrexInfo::new(1);
        prex.set(0, crate::prex::ArgFact {
            class: Some(SUB_A),
            ..Default::default()
        });

        let targets = builder.find_targets(&body, &prex, None, call, &op);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].callee, MethodId(11));
        assert_eq!(targets[0].guard.kind, GuardKind::HierarchyGuard);
        assert_eq!(targets[0].guard.test, TestType::VftTest);
    }

    #[test]
    fn test_preexistent_fixed_receiver_needs_no_guard() {
        let db = program();
        let config = InlinerConfig::default();
        let policy = PolicyTable::new();
        let builder = CallGraphBuilder::new(&config, &db, &db, None, &policy);
        let (body, call) = caller_calling(MethodId(10), CallKind::Virtual);
        let op = *body.op(call).as_call().unwrap();
        let mut prex = ArgumentPrexInfo::new(1);
        prex.set(0, crate::prex::ArgFact::fixed(SUB_B).preexisting());

        let targets = builder.find_targets(&body, &prex, None, call, &op);
        assert_eq!(targets, vec![ResolvedTarget::exact(MethodId(12), VirtualGuardSelection::none())]);
    }

    #[test]
    fn test_unresolvable_call_has_no_targets() {
        let db = program();
        let config = InlinerConfig::default();
        let policy = PolicyTable::new();
        let (body, _) = caller_calling(MethodId(10), CallKind::Virtual);
        let graph = CallGraphBuilder::new(&config, &db, &db, None, &policy).build(&body, &ArgumentPrexInfo::default());
        let site = graph.site(graph.top_level_sites()[0]);
        assert!(site.targets.is_empty());
        assert_eq!(site.rejection, Some(RejectReason::NoTargets));
    }

    #[test]
    fn test_missing_body_drops_candidate() {
        let mut db = program();
        db.add_method(
            MethodInfo::new(MethodId(20), BASE, "ghost", "(LBase;)I", vec![ValueType::Reference(BASE)], ValueType::Int)
                .with_flags(MethodFlags {
                    is_static: true,
                    ..Default::default()
                }),
        );
        let config = InlinerConfig::default();
        let policy = PolicyTable::new();
        let (body, _) = caller_calling(MethodId(20), CallKind::Static);
        let graph = CallGraphBuilder::new(&config, &db, &db, None, &policy).build(&body, &ArgumentPrexInfo::default());
        let target = graph.target(CallTargetId(0));
        assert_eq!(
            target.rejection,
            Some(RejectReason::EstimateFailed(EstimateFailure::BodyUnavailable))
        );
    }

    #[test]
    fn test_shape_mismatch_drops_candidate() {
        let db = program();
        let config = InlinerConfig::default();
        let policy = PolicyTable::new();
        // run() takes only its receiver; pass an extra argument
        let mut body = MethodBody::new(MethodId(1), &[ValueType::Reference(BASE)]);
        let recv = body.load(body.param(0));
        let extra = body.int(1);
        let call = body.call(MethodId(11), CallKind::Special, 3, vec![recv, extra]);
        body.set_terminator(body.entry(), Terminator::Return(Some(call)));
        let graph = CallGraphBuilder::new(&config, &db, &db, None, &policy).build(&body, &ArgumentPrexInfo::default());
        assert_eq!(
            graph.target(CallTargetId(0)).rejection,
            Some(RejectReason::EstimateFailed(EstimateFailure::ShapeMismatch))
        );
    }

    #[test]
    fn test_estimate_records_size_and_body() {
        let db = program();
        let config = InlinerConfig::default();
        let policy = PolicyTable::new();
        let (body, _) = caller_calling(MethodId(11), CallKind::Special);
        let graph = CallGraphBuilder::new(&config, &db, &db, None, &policy).build(&body, &ArgumentPrexInfo::default());
        let target = graph.target(CallTargetId(0));
        assert!(target.is_viable());
        assert_eq!(target.size, 1);
        assert!(target.is_leaf);
        assert!(target.body.is_some());
        assert_eq!(target.node_count, 3);
    }
}
