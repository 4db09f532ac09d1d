//! Splicing accepted callees into the caller
//!
//! Sites are handled strictly in program order. For each one the call is
//! first brought into statement position, its arguments are bound to fresh
//! temporaries and the block is split after it. The callee is then copied
//! in, either directly or behind a chain of guards whose last failure edge
//! keeps the original call. Every check that could reject a candidate has
//! already run, so anything unexpected here is an internal error.

use crate::call_graph::{CallGraph, CallSite, CallTargetId};
use crate::error::{InlinerError, InlinerResult};
use crate::ir::{
    Anchor, BlockId, CallOp, GuardInfo, LocalId, LocalKind, MethodBody, NodeId, Op, Terminator, MAX_BLOCK_FREQUENCY,
};
use crate::program::MethodResolver;
use crate::tail_recursion;
use core_types::{ClassId, MethodId, MethodInfo, ValueType};
use rustc_hash::{FxHashMap, FxHashSet};
use std::iter;
use tracing::{debug, trace};

/// What a transformation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformStats {
    /// Top-level sites replaced by inlined bodies
    pub inlined_sites: usize,
    /// Every target spliced, nested ones included
    pub inlined_targets: Vec<CallTargetId>,
    /// Self tail calls turned into loops
    pub tail_calls_eliminated: usize,
    /// Guard terminators emitted
    pub guards_emitted: usize,
    /// Cold callee blocks replaced by a call to the whole callee
    pub restart_calls: usize,
    /// Unreachable blocks dropped afterwards
    pub blocks_removed: usize,
}

/// Where the inlined body of one site reads its inputs and leaves its result
struct Splice<'t> {
    call_op: CallOp,
    temps: &'t [LocalId],
    dest: Option<LocalId>,
    cont: BlockId,
    handler: Option<BlockId>,
    loop_depth: u32,
}

/// Monitor object of a synchronized callee
#[derive(Clone, Copy)]
enum Lock {
    Receiver(LocalId),
    Class(ClassId),
}

impl Lock {
    fn node(self, body: &mut MethodBody) -> NodeId {
        match self {
            Lock::Receiver(local) => body.load(local),
            Lock::Class(class) => body.add_node(Op::ClassRef(class), Vec::new()),
        }
    }
}

/// Applies the accepted part of a call graph to the method body
pub struct Transformer<'a> {
    resolver: &'a dyn MethodResolver,
    graph: &'a CallGraph,
}

impl<'a> Transformer<'a> {
    /// Create a transformer for `graph`
    pub fn new(resolver: &'a dyn MethodResolver, graph: &'a CallGraph) -> Self {
        Self { resolver, graph }
    }

    /// Rewrite `body`; the result is verified before returning
    pub fn apply(&self, body: &mut MethodBody) -> InlinerResult<TransformStats> {
        let mut stats = TransformStats::default();
        let mut done = FxHashSet::default();
        for &site_id in self.graph.top_level_sites() {
            let site = self.graph.site(site_id);
            if site.tail_recursion {
                let guard = site.targets.first().map(|&t| self.graph.target(t).guard);
                tail_recursion::eliminate(body, site.call_node, guard)?;
                stats.tail_calls_eliminated += 1;
                if guard.is_some_and(|g| g.is_guarded()) {
                    stats.guards_emitted += 1;
                }
                continue;
            }
            let accepted: Vec<CallTargetId> = site
                .targets
                .iter()
                .copied()
                .filter(|&t| self.graph.target(t).accepted)
                .collect();
            if accepted.is_empty() {
                continue;
            }
            self.inline_site(body, site, &accepted, &mut done, &mut stats)?;
            stats.inlined_sites += 1;
        }
        stats.blocks_removed = body.remove_unreachable();
        body.verify()?;
        debug!(
            method = %body.method(),
            sites = stats.inlined_sites,
            tail_calls = stats.tail_calls_eliminated,
            guards = stats.guards_emitted,
            "transformation complete"
        );
        Ok(stats)
    }

    fn inline_site(
        &self,
        body: &mut MethodBody,
        site: &CallSite,
        targets: &[CallTargetId],
        done: &mut FxHashSet<CallTargetId>,
        stats: &mut TransformStats,
    ) -> InlinerResult<()> {
        let method = body.method();
        let call = site.call_node;
        let call_op = body
            .op(call)
            .as_call()
            .copied()
            .ok_or_else(|| InlinerError::consistency(method, format!("site {} does not hold a call", site.key)))?;
        for &t in targets {
            if !done.insert(t) {
                return Err(InlinerError::consistency(
                    method,
                    format!("target of {} at {} spliced twice", self.graph.target(t).callee, site.key),
                ));
            }
        }

        let (block, index) = self.anchor_call(body, call)?;
        let stmt = body.block(block).stmts()[index];
        let dest = match *body.op(stmt) {
            Op::Store(local) => Some(local),
            _ => None,
        };
        let temps = self.bind_arguments(body, block, index, call, &call_op, targets)?;
        let index = index + temps.len();
        let cont = body.split_block(block, index + 1);

        let (frequency, handler, loop_depth) = {
            let b = body.block(block);
            (b.frequency, b.handler, b.loop_depth)
        };
        let splice = Splice {
            call_op,
            temps: &temps,
            dest,
            cont,
            handler,
            loop_depth,
        };
        let guarded = targets.iter().any(|&t| self.graph.target(t).guard.is_guarded());
        trace!(site = %site.key, targets = targets.len(), guarded, "splicing");

        if !guarded {
            let [target] = targets else {
                return Err(InlinerError::consistency(
                    method,
                    format!("{} unguarded targets at {}", targets.len(), site.key),
                ));
            };
            body.remove_stmt(block, index);
            let entry = self.splice(body, *target, &splice, frequency, done, stats)?;
            body.set_terminator(block, Terminator::Goto(entry));
            return Ok(());
        }

        let fallback = body.insert_block_before(cont);
        {
            let f = body.block_mut(fallback);
            f.frequency = 0;
            f.cold = true;
            f.handler = handler;
            f.loop_depth = loop_depth;
        }
        body.push_stmt(fallback, stmt);
        body.remove_stmt(block, index);
        body.mark_fallback(call);
        body.set_terminator(fallback, Terminator::Goto(cont));

        let mut test_block = block;
        let mut remaining = frequency;
        for (k, &t) in targets.iter().enumerate() {
            let target = self.graph.target(t);
            let share = (frequency as f32 * target.frequency_adjustment.clamp(0.0, 1.0)) as u32;
            let entry = self.splice(body, t, &splice, share, done, stats)?;
            remaining = remaining.saturating_sub(share);
            let fail = if k + 1 == targets.len() {
                fallback
            } else {
                let next = body.insert_block_before(fallback);
                let n = body.block_mut(next);
                n.frequency = remaining;
                n.handler = handler;
                n.loop_depth = loop_depth;
                next
            };
            let receiver = temps.first().map(|&temp| body.load(temp));
            let guard = GuardInfo {
                id: body.new_guard_id(),
                selection: target.guard,
                target: target.callee,
            };
            body.set_terminator(
                test_block,
                Terminator::Guard {
                    guard,
                    receiver,
                    pass: entry,
                    fail,
                },
            );
            stats.guards_emitted += 1;
            test_block = fail;
        }
        Ok(())
    }

    /// Make `call` the direct operand of its own `Eval` or `Store` statement
    ///
    /// Calls evaluated before it in the same statement are hoisted first, in
    /// order, so evaluation order is unchanged.
    fn anchor_call(&self, body: &mut MethodBody, call: NodeId) -> InlinerResult<(BlockId, usize)> {
        let method = body.method();
        let anchor = body
            .locate(call)
            .ok_or_else(|| InlinerError::consistency(method, format!("{} is not anchored", call)))?;
        let (block, at, roots, original) = match anchor {
            Anchor::Stmt(block, index) => {
                let stmt = body.block(block).stmts()[index];
                let direct = matches!(body.op(stmt), Op::Eval | Op::Store(_))
                    && body.arena().children(stmt) == [call]
                    && !body.arena().is_shared(call);
                if direct {
                    return Ok((block, index));
                }
                (block, index, vec![stmt], Some(stmt))
            }
            Anchor::Terminator(block) => (
                block,
                body.block(block).stmts().len(),
                body.block(block).terminator().operands(),
                None,
            ),
        };

        let mut seen = FxHashSet::default();
        let mut earlier = Vec::new();
        'roots: for root in roots {
            for node in body.arena().post_order(root, &mut seen) {
                if node == call {
                    break 'roots;
                }
                if body.op(node).as_call().is_some() && !body.arena().contains(call, node) {
                    earlier.push(node);
                }
            }
        }

        let mut at = at;
        for node in earlier.into_iter().chain(iter::once(call)) {
            let ty = self.result_type(body, node);
            let temp = body.new_temp(ty);
            let store = body.add_node(Op::Store(temp), vec![node]);
            body.insert_stmt(block, at, store);
            body.replace_all_uses(node, Some(store), |b| b.load(temp));
            at += 1;
        }

        // A bare `Eval(load)` left behind has nothing to evaluate
        if let Some(stmt) = original {
            if body.block(block).stmts().get(at) == Some(&stmt)
                && *body.op(stmt) == Op::Eval
                && matches!(body.arena().children(stmt), [child] if matches!(body.op(*child), Op::Load(_)))
            {
                body.remove_stmt(block, at);
            }
        }
        Ok((block, at - 1))
    }

    fn result_type(&self, body: &MethodBody, call: NodeId) -> ValueType {
        body.op(call)
            .as_call()
            .and_then(|op| self.resolver.method(op.method))
            .map_or(ValueType::Int, |m| m.return_type)
    }

    /// Store every argument into a fresh temporary in front of the call
    fn bind_arguments(
        &self,
        body: &mut MethodBody,
        block: BlockId,
        index: usize,
        call: NodeId,
        call_op: &CallOp,
        targets: &[CallTargetId],
    ) -> InlinerResult<Vec<LocalId>> {
        let args = body.arena().children(call).to_vec();
        let types = iter::once(call_op.method)
            .chain(targets.iter().map(|&t| self.graph.target(t).callee))
            .filter_map(|m| self.resolver.method(m))
            .map(MethodInfo::arg_types)
            .find(|types| types.len() == args.len())
            .ok_or_else(|| {
                InlinerError::consistency(
                    body.method(),
                    format!("no signature of {} takes {} arguments", call_op.method, args.len()),
                )
            })?;
        let mut temps = Vec::with_capacity(args.len());
        for (ordinal, (&arg, ty)) in args.iter().zip(types).enumerate() {
            let temp = body.new_temp(ty);
            let store = body.add_node(Op::Store(temp), vec![arg]);
            body.insert_stmt(block, index + ordinal, store);
            let load = body.load(temp);
            body.replace_child(call, ordinal, load);
            temps.push(temp);
        }
        Ok(temps)
    }

    /// Copy one target's body into the caller, returning its entry block
    fn splice(
        &self,
        body: &mut MethodBody,
        target_id: CallTargetId,
        splice: &Splice<'_>,
        site_frequency: u32,
        done: &mut FxHashSet<CallTargetId>,
        stats: &mut TransformStats,
    ) -> InlinerResult<BlockId> {
        let method = body.method();
        let target = self.graph.target(target_id);
        let info = self
            .resolver
            .method(target.callee)
            .ok_or_else(|| InlinerError::consistency(method, format!("{} has no descriptor", target.callee)))?;
        let mut callee = target
            .body
            .clone()
            .ok_or_else(|| InlinerError::consistency(method, format!("{} has no estimated body", target.callee)))?;
        if callee.param_count() != splice.temps.len() {
            return Err(InlinerError::consistency(
                method,
                format!(
                    "{} takes {} parameters but {} arguments were bound",
                    target.callee,
                    callee.param_count(),
                    splice.temps.len()
                ),
            ));
        }
        let restart: &[BlockId] = target.partial.as_ref().map_or(&[], |p| p.restart_blocks.as_slice());

        // Nested candidates counted into this target's size go in first
        let hot = hot_blocks(&callee, restart);
        for &child_site in &target.children {
            let site = self.graph.site(child_site);
            let included: Vec<CallTargetId> = site
                .targets
                .iter()
                .copied()
                .filter(|&c| {
                    let c = self.graph.target(c);
                    c.included && c.is_viable()
                })
                .collect();
            let in_hot_part = callee.locate(site.call_node).is_some_and(|a| hot.contains(&a.block()));
            if !included.is_empty() && in_hot_part {
                self.inline_site(&mut callee, site, &included, done, stats)?;
            }
        }
        let hot = hot_blocks(&callee, restart);

        let mut importer = Importer::new(&callee, body, splice.temps);
        let mut blocks: FxHashMap<BlockId, BlockId> = FxHashMap::default();
        for &b in callee.layout().iter().filter(|b| hot.contains(*b)) {
            blocks.insert(b, body.insert_block_before(splice.cont));
        }
        let restart: Vec<BlockId> = restart
            .iter()
            .copied()
            .filter(|b| callee.layout().contains(b))
            .collect();
        for &r in &restart {
            blocks.insert(r, body.insert_block_before(splice.cont));
        }

        let lock = if info.flags.is_synchronized {
            Some(if info.flags.is_static {
                Lock::Class(info.holder)
            } else {
                let receiver = splice.temps.first().copied().ok_or_else(|| {
                    InlinerError::consistency(method, format!("synchronized {} has no receiver", target.callee))
                })?;
                Lock::Receiver(receiver)
            })
        } else {
            None
        };
        let default_handler = match lock {
            Some(lock) => Some(self.monitor_handler(body, splice, lock)),
            None => splice.handler,
        };

        for &b in callee.layout().iter().filter(|b| hot.contains(*b)) {
            let src = callee.block(b);
            let nb = lookup_block(&blocks, b, method)?;
            let handler = match src.handler {
                Some(h) => Some(lookup_block(&blocks, h, method)?),
                None => default_handler,
            };
            {
                let dst = body.block_mut(nb);
                dst.frequency = scale_frequency(src.frequency, site_frequency);
                dst.loop_depth = src.loop_depth + splice.loop_depth;
                dst.cold = src.cold;
                dst.handler = handler;
            }
            for &stmt in src.stmts() {
                let copy = importer.copy(body, stmt)?;
                body.push_stmt(nb, copy);
            }

            match src.terminator() {
                Terminator::Return(value) => {
                    match (*value, splice.dest) {
                        (Some(value), Some(dest)) => {
                            let copy = importer.copy(body, value)?;
                            let store = body.add_node(Op::Store(dest), vec![copy]);
                            body.push_stmt(nb, store);
                        }
                        (Some(value), None) => {
                            if has_effects(&callee, value) {
                                let copy = importer.copy(body, value)?;
                                body.emit_eval(nb, copy);
                            }
                        }
                        (None, Some(dest)) => {
                            return Err(InlinerError::consistency(
                                method,
                                format!("{} returns nothing into {}", target.callee, dest),
                            ));
                        }
                        (None, None) => {}
                    }
                    if let Some(lock) = lock {
                        let object = lock.node(body);
                        let exit = body.add_node(Op::MonitorExit, vec![object]);
                        body.push_stmt(nb, exit);
                    }
                    body.set_terminator(nb, Terminator::Goto(splice.cont));
                }
                terminator => {
                    for succ in terminator.successors() {
                        lookup_block(&blocks, succ, method)?;
                    }
                    let mut operands = FxHashMap::default();
                    for operand in terminator.operands() {
                        operands.insert(operand, importer.copy(body, operand)?);
                    }
                    let mut mapped = terminator.remap(
                        |blk| blocks.get(&blk).copied().unwrap_or(splice.cont),
                        |n| operands.get(&n).copied().unwrap_or(n),
                    );
                    if let Terminator::Guard { guard, .. } = &mut mapped {
                        guard.id = body.new_guard_id();
                    }
                    body.set_terminator(nb, mapped);
                }
            }
        }

        for &r in &restart {
            let nb = lookup_block(&blocks, r, method)?;
            self.restart_block(body, nb, target.callee, splice);
            stats.restart_calls += 1;
        }

        let entry = lookup_block(&blocks, callee.entry(), method)?;
        let entry = match lock {
            Some(lock) => {
                let enter_block = body.insert_block_before(entry);
                let object = lock.node(body);
                let enter = body.add_node(Op::MonitorEnter, vec![object]);
                body.push_stmt(enter_block, enter);
                body.set_terminator(enter_block, Terminator::Goto(entry));
                let b = body.block_mut(enter_block);
                b.frequency = site_frequency;
                b.handler = splice.handler;
                b.loop_depth = splice.loop_depth;
                enter_block
            }
            None => entry,
        };
        stats.inlined_targets.push(target_id);
        debug!(
            method = %method,
            callee = %target.callee,
            blocks = blocks.len(),
            partial = !restart.is_empty(),
            synchronized = lock.is_some(),
            "inlined"
        );
        Ok(entry)
    }

    /// Handler releasing the monitor before rethrowing
    fn monitor_handler(&self, body: &mut MethodBody, splice: &Splice<'_>, lock: Lock) -> BlockId {
        let handler = body.insert_block_before(splice.cont);
        let object = lock.node(body);
        let exit = body.add_node(Op::MonitorExit, vec![object]);
        body.push_stmt(handler, exit);
        let exception = body.add_node(Op::CaughtException, Vec::new());
        body.set_terminator(handler, Terminator::Throw(exception));
        let h = body.block_mut(handler);
        h.frequency = 0;
        h.cold = true;
        h.handler = splice.handler;
        h.loop_depth = splice.loop_depth;
        handler
    }

    /// Fill a cold block with a call of the whole callee on the bound arguments
    fn restart_block(&self, body: &mut MethodBody, block: BlockId, callee: MethodId, splice: &Splice<'_>) {
        let args: Vec<NodeId> = splice.temps.iter().map(|&t| body.load(t)).collect();
        let call = body.add_node(
            Op::Call(CallOp {
                guard_fallback: true,
                ..splice.call_op
            }),
            args,
        );
        match splice.dest {
            Some(dest) => {
                body.emit_store(block, dest, call);
            }
            None => {
                body.emit_eval(block, call);
            }
        }
        body.set_terminator(block, Terminator::Goto(splice.cont));
        let b = body.block_mut(block);
        b.frequency = 0;
        b.cold = true;
        b.handler = splice.handler;
        b.loop_depth = splice.loop_depth;
        trace!(callee = %callee, block = %block, "restart call");
    }
}

/// Deep copy of callee nodes into the caller's arena
///
/// Sharing inside the callee is preserved: a node reached twice is copied once.
struct Importer<'s> {
    src: &'s MethodBody,
    locals: Vec<LocalId>,
    memo: FxHashMap<NodeId, NodeId>,
    seen: FxHashSet<NodeId>,
}

impl<'s> Importer<'s> {
    fn new(src: &'s MethodBody, dst: &mut MethodBody, params: &[LocalId]) -> Self {
        let mut locals = params.to_vec();
        for decl in &src.locals()[params.len()..] {
            let local = match decl.kind {
                LocalKind::Temp => dst.new_temp(decl.ty),
                LocalKind::Param | LocalKind::Auto => dst.new_local(decl.ty),
            };
            locals.push(local);
        }
        Self {
            src,
            locals,
            memo: FxHashMap::default(),
            seen: FxHashSet::default(),
        }
    }

    fn copy(&mut self, dst: &mut MethodBody, root: NodeId) -> InlinerResult<NodeId> {
        let src = self.src;
        for node in src.arena().post_order(root, &mut self.seen) {
            let children = src
                .arena()
                .children(node)
                .iter()
                .map(|&c| self.lookup(dst.method(), c))
                .collect::<InlinerResult<Vec<_>>>()?;
            let op = match *src.op(node) {
                Op::Load(local) => Op::Load(self.local(dst.method(), local)?),
                Op::Store(local) => Op::Store(self.local(dst.method(), local)?),
                op => op,
            };
            let copy = dst.add_node(op, children);
            self.memo.insert(node, copy);
        }
        self.lookup(dst.method(), root)
    }

    fn lookup(&self, method: MethodId, node: NodeId) -> InlinerResult<NodeId> {
        self.memo
            .get(&node)
            .copied()
            .ok_or_else(|| InlinerError::consistency(method, format!("callee node {} copied before its operands", node)))
    }

    fn local(&self, method: MethodId, local: LocalId) -> InlinerResult<LocalId> {
        self.locals
            .get(local.index())
            .copied()
            .ok_or_else(|| InlinerError::consistency(method, format!("callee local {} is undeclared", local)))
    }
}

fn lookup_block(blocks: &FxHashMap<BlockId, BlockId>, block: BlockId, method: MethodId) -> InlinerResult<BlockId> {
    blocks
        .get(&block)
        .copied()
        .ok_or_else(|| InlinerError::consistency(method, format!("callee block {} was not imported", block)))
}

/// Callee blocks reachable from its entry without entering a restart block
fn hot_blocks(body: &MethodBody, restart: &[BlockId]) -> FxHashSet<BlockId> {
    let cfg = body.cfg();
    let mut hot = FxHashSet::default();
    let mut pending = vec![body.entry()];
    while let Some(b) = pending.pop() {
        if restart.contains(&b) || !hot.insert(b) {
            continue;
        }
        pending.extend(cfg.successors(b).iter().copied());
    }
    hot
}

fn has_effects(body: &MethodBody, root: NodeId) -> bool {
    body.arena()
        .post_order(root, &mut FxHashSet::default())
        .into_iter()
        .any(|n| body.op(n).has_side_effects())
}

fn scale_frequency(callee: u32, site: u32) -> u32 {
    (u64::from(callee) * u64::from(site) / u64::from(MAX_BLOCK_FREQUENCY)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_graph::{CallSiteId, CallTarget};
    use crate::guard::{GuardKind, TestType, VirtualGuardSelection};
    use crate::ir::{BinaryOp, CallKind};
    use crate::program::ProgramDatabase;
    use core_types::{CallSiteKey, ClassInfo, MethodFlags};

    const CALLER: MethodId = MethodId(1);
    const ADD: MethodId = MethodId(2);

    fn program() -> ProgramDatabase {
        let mut db = ProgramDatabase::new();
        db.add_class(ClassInfo::new(ClassId(1), "Main", None));
        db.add_method(MethodInfo::new(CALLER, ClassId(1), "main", "(I)I", vec![ValueType::Int], ValueType::Int).with_flags(
            MethodFlags {
                is_static: true,
                ..MethodFlags::default()
            },
        ));
        db.add_method(
            MethodInfo::new(ADD, ClassId(1), "add", "(II)I", vec![ValueType::Int, ValueType::Int], ValueType::Int)
                .with_flags(MethodFlags {
                    is_static: true,
                    ..MethodFlags::default()
                }),
        );
        db
    }

    // add(a, b) = a + b
    fn add_body() -> MethodBody {
        let mut body = MethodBody::new(ADD, &[ValueType::Int, ValueType::Int]);
        let a = body.load(body.param(0));
        let b = body.load(body.param(1));
        let sum = body.binary(BinaryOp::Add, a, b);
        let entry = body.entry();
        body.set_terminator(entry, Terminator::Return(Some(sum)));
        body
    }

    fn graph_for(call: NodeId, callee: MethodId, guard: VirtualGuardSelection, body: MethodBody) -> CallGraph {
        let mut graph = CallGraph::new();
        let site = graph.add_site(CallSite {
            id: CallSiteId(0),
            caller: CALLER,
            call_node: call,
            key: CallSiteKey::new(CALLER, 0),
            kind: CallKind::Static,
            is_indirect: false,
            targets: Vec::new(),
            depth: 1,
            discovery_index: 0,
            block_frequency: MAX_BLOCK_FREQUENCY,
            loop_depth: 0,
            arg_count: 2,
            parent: None,
            tail_recursion: false,
            rejection: None,
        });
        let t = graph.add_target(site, callee, guard);
        let target: &mut CallTarget = graph.target_mut(t);
        target.body = Some(body);
        target.accepted = true;
        graph
    }

    #[test]
    fn test_direct_splice_of_returned_call() {
        let db = program();
        // main(x) = add(x, 1) * 2
        let mut body = MethodBody::new(CALLER, &[ValueType::Int]);
        let x = body.load(body.param(0));
        let one = body.int(1);
        let call = body.call(ADD, CallKind::Static, 0, vec![x, one]);
        let two = body.int(2);
        let product = body.binary(BinaryOp::Mul, call, two);
        let entry = body.entry();
        body.set_terminator(entry, Terminator::Return(Some(product)));

        let graph = graph_for(call, ADD, VirtualGuardSelection::none(), add_body());
        let stats = Transformer::new(&db, &graph).apply(&mut body).unwrap();
        assert_eq!(stats.inlined_sites, 1);
        assert_eq!(stats.guards_emitted, 0);
        assert!(body.calls_in_program_order().is_empty());
        assert_eq!(body.arena().uses(call), 0);
        body.verify().unwrap();

        // Every block either jumps on or returns the product of the result
        let returns: Vec<_> = body
            .layout()
            .iter()
            .filter(|&&b| matches!(body.block(b).terminator(), Terminator::Return(Some(_))))
            .collect();
        assert_eq!(returns.len(), 1);
    }

    #[test]
    fn test_guarded_splice_keeps_fallback_call() {
        let db = program();
        let mut body = MethodBody::new(CALLER, &[ValueType::Int]);
        let x = body.load(body.param(0));
        let y = body.load(body.param(0));
        let call = body.call(ADD, CallKind::Static, 0, vec![x, y]);
        let result = body.new_local(ValueType::Int);
        let entry = body.entry();
        body.emit_store(entry, result, call);
        let ret = body.load(result);
        body.set_terminator(entry, Terminator::Return(Some(ret)));

        let guard = VirtualGuardSelection::new(GuardKind::ProfiledGuard, TestType::VftTest, Some(ClassId(1)));
        let graph = graph_for(call, ADD, guard, add_body());
        let stats = Transformer::new(&db, &graph).apply(&mut body).unwrap();
        assert_eq!(stats.guards_emitted, 1);

        let Terminator::Guard { guard: info, fail, .. } = body.block(entry).terminator().clone() else {
            panic!("entry should end in a guard");
        };
        assert_eq!(info.selection, guard);
        assert_eq!(info.target, ADD);
        let f = body.block(fail);
        assert_eq!(f.frequency, 0);
        assert!(matches!(body.op(f.stmts()[0]), Op::Store(l) if *l == result));
        assert!(matches!(body.op(call), Op::Call(op) if op.guard_fallback));
        // Fallback calls never show up as candidates again
        assert!(body.calls_in_program_order().is_empty());
    }

    #[test]
    fn test_earlier_calls_hoisted_in_order() {
        let mut db = program();
        let side = MethodId(3);
        db.add_method(MethodInfo::new(side, ClassId(1), "side", "()I", vec![], ValueType::Int).with_flags(MethodFlags {
            is_static: true,
            ..MethodFlags::default()
        }));
        // main(x) = side() + add(x, x)
        let mut body = MethodBody::new(CALLER, &[ValueType::Int]);
        let first = body.call(side, CallKind::Static, 0, Vec::new());
        let x = body.load(body.param(0));
        let x2 = body.load(body.param(0));
        let call = body.call(ADD, CallKind::Static, 1, vec![x, x2]);
        let sum = body.binary(BinaryOp::Add, first, call);
        let entry = body.entry();
        body.set_terminator(entry, Terminator::Return(Some(sum)));

        let graph = graph_for(call, ADD, VirtualGuardSelection::none(), add_body());
        Transformer::new(&db, &graph).apply(&mut body).unwrap();

        let calls = body.calls_in_program_order();
        assert_eq!(calls, vec![first]);
        // side() is now stored before anything from add runs
        let stmt = body.block(entry).stmts()[0];
        assert!(matches!(body.op(stmt), Op::Store(_)));
        assert_eq!(body.arena().children(stmt), [first]);
    }

    #[test]
    fn test_double_splice_is_internal_error() {
        let db = program();
        let mut body = MethodBody::new(CALLER, &[ValueType::Int]);
        let x = body.load(body.param(0));
        let one = body.int(1);
        let call = body.call(ADD, CallKind::Static, 0, vec![x, one]);
        let entry = body.entry();
        body.emit_eval(entry, call);
        let graph = graph_for(call, ADD, VirtualGuardSelection::none(), add_body());
        let transformer = Transformer::new(&db, &graph);
        let mut done = FxHashSet::default();
        done.insert(CallTargetId(0));
        let site = graph.site(CallSiteId(0));
        let err = transformer
            .inline_site(&mut body, site, &[CallTargetId(0)], &mut done, &mut TransformStats::default())
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_scale_frequency() {
        assert_eq!(scale_frequency(MAX_BLOCK_FREQUENCY, 2500), 2500);
        assert_eq!(scale_frequency(5000, 2000), 1000);
        assert_eq!(scale_frequency(0, 2000), 0);
    }
}
