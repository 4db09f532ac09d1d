//! Method IR consumed and rewritten by the inliner
//!
//! Nodes live in a per-method arena and form trees whose subtrees may be
//! shared. A shared node is evaluated once, at its first reference in
//! program order. Every node counts the places that refer to it: parent
//! nodes, block statement lists and block terminators. The mutation API on
//! [`MethodBody`] keeps those counts exact, and a node whose last reference
//! goes away releases its own children.
//!
//! Blocks hold an ordered list of statement roots followed by a single
//! [`Terminator`]. The block layout is the program order used for call
//! discovery.

use crate::error::{InlinerError, InlinerResult};
use crate::guard::{GuardId, VirtualGuardSelection};
use core_types::{CallSiteKey, ClassId, KnownObjectId, MethodId, MethodInfo, ValueType};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

/// Frequency of a block that runs on every invocation
pub const MAX_BLOCK_FREQUENCY: u32 = 10_000;

/// Band above [`MAX_BLOCK_FREQUENCY`] the profiler reserves for cold blocks
pub const COLD_FREQUENCY_BAND: u32 = 100;

macro_rules! ir_index {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// Position in the owning table
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

ir_index!(
    /// Handle of a node in a [`NodeArena`]
    NodeId,
    "n"
);
ir_index!(
    /// Handle of a basic block in a [`MethodBody`]
    BlockId,
    "B"
);
ir_index!(
    /// Handle of a local variable slot
    LocalId,
    "L"
);

/// Binary arithmetic and comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Equality comparison
    Eq,
    /// Less-than comparison
    Lt,
}

/// Dispatch kind of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Static method, target known
    Static,
    /// Private or constructor call, target known
    Special,
    /// Virtual dispatch through the receiver's class
    Virtual,
    /// Interface dispatch
    Interface,
    /// Invocation of a method handle thunk
    MethodHandleThunk,
    /// Call through a mutable call site
    MutableCallSite,
}

impl CallKind {
    /// Check if the target depends on the runtime receiver
    pub fn is_indirect(self) -> bool {
        matches!(
            self,
            CallKind::Virtual | CallKind::Interface | CallKind::MutableCallSite
        )
    }
}

/// Payload of a call node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallOp {
    /// Statically referenced method
    pub method: MethodId,
    /// Dispatch kind
    pub kind: CallKind,
    /// Method whose bytecode holds the call; differs from the body's own
    /// method once the call has been inlined
    pub owner: MethodId,
    /// Bytecode index of the call within its owner
    pub bc_index: u32,
    /// Call left on the slow path of a guard or partial restart; never a
    /// candidate again
    pub guard_fallback: bool,
}

/// Node operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    /// Integer constant
    IntConst(i64),
    /// Null reference
    NullConst,
    /// Known heap object
    ObjectConst(KnownObjectId),
    /// Class literal
    ClassRef(ClassId),
    /// Read a local
    Load(LocalId),
    /// Write child 0 into a local (statement)
    Store(LocalId),
    /// Arithmetic on children 0 and 1
    Binary(BinaryOp),
    /// Convert child 0 to the given type
    Convert(ValueType),
    /// Allocate an instance
    New(ClassId),
    /// Call with arguments as children, receiver first
    Call(CallOp),
    /// Evaluate child 0 for its side effects (statement)
    Eval,
    /// Acquire the monitor of child 0 (statement)
    MonitorEnter,
    /// Release the monitor of child 0 (statement)
    MonitorExit,
    /// Yield point for asynchronous events (statement)
    AsyncCheck,
    /// Exception object delivered to a handler block
    CaughtException,
}

impl Op {
    /// Check if the op may root a statement
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Op::Store(_) | Op::Eval | Op::MonitorEnter | Op::MonitorExit | Op::AsyncCheck
        )
    }

    /// Check if evaluating the op itself has an observable effect
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            Op::Store(_)
                | Op::Call(_)
                | Op::New(_)
                | Op::MonitorEnter
                | Op::MonitorExit
                | Op::AsyncCheck
        )
    }

    /// Call payload, if this is a call
    pub fn as_call(&self) -> Option<&CallOp> {
        match self {
            Op::Call(call) => Some(call),
            _ => None,
        }
    }
}

/// A node in the arena
#[derive(Debug, Clone)]
pub struct Node {
    op: Op,
    children: Vec<NodeId>,
    uses: u32,
}

impl Node {
    /// Operation
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Ordered operands
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Number of places referring to this node
    pub fn uses(&self) -> u32 {
        self.uses
    }
}

/// Owner of all nodes of one method
#[derive(Debug, Clone, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Total nodes ever created, live or not
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if no node was ever created
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a node; each child gains one use
    pub fn create(&mut self, op: Op, children: Vec<NodeId>) -> NodeId {
        for &child in &children {
            self.acquire(child);
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            op,
            children,
            uses: 0,
        });
        id
    }

    /// Node by handle
    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Operation of a node
    pub fn op(&self, id: NodeId) -> &Op {
        &self.nodes[id.index()].op
    }

    /// Operands of a node
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// Reference count of a node
    pub fn uses(&self, id: NodeId) -> u32 {
        self.nodes[id.index()].uses
    }

    /// Check if more than one place refers to the node
    pub fn is_shared(&self, id: NodeId) -> bool {
        self.uses(id) > 1
    }

    /// Replace operand `index` of `parent`, adjusting both use counts
    pub fn replace_child(&mut self, parent: NodeId, index: usize, new: NodeId) {
        let old = self.nodes[parent.index()].children[index];
        if old == new {
            return;
        }
        self.acquire(new);
        self.nodes[parent.index()].children[index] = new;
        self.release(old);
    }

    /// Check if `target` occurs in the tree rooted at `root`
    pub fn contains(&self, root: NodeId, target: NodeId) -> bool {
        let mut seen = FxHashSet::default();
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            if id == target {
                return true;
            }
            if seen.insert(id) {
                pending.extend(self.children(id).iter().copied());
            }
        }
        false
    }

    /// Nodes of a tree in evaluation order, each shared node once
    pub fn post_order(&self, root: NodeId, seen: &mut FxHashSet<NodeId>) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.post_order_into(root, seen, &mut out);
        out
    }

    fn post_order_into(&self, id: NodeId, seen: &mut FxHashSet<NodeId>, out: &mut Vec<NodeId>) {
        if !seen.insert(id) {
            return;
        }
        for &child in self.children(id) {
            self.post_order_into(child, seen, out);
        }
        out.push(id);
    }

    pub(crate) fn acquire(&mut self, id: NodeId) {
        self.nodes[id.index()].uses += 1;
    }

    pub(crate) fn release(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let node = &mut self.nodes[id.index()];
            node.uses = node.uses.saturating_sub(1);
            if node.uses == 0 {
                pending.extend(node.children.iter().copied());
            }
        }
    }
}

/// Guard emitted as a block terminator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardInfo {
    /// Identity within the method
    pub id: GuardId,
    /// Test and assumption
    pub selection: VirtualGuardSelection,
    /// Method whose inlined body the guard protects
    pub target: MethodId,
}

/// Control transfer ending a block
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// Unconditional jump
    Goto(BlockId),
    /// Two-way branch on an integer condition
    Branch {
        /// Condition
        cond: NodeId,
        /// Target when non-zero
        taken: BlockId,
        /// Target when zero
        not_taken: BlockId,
    },
    /// Return from the method
    Return(Option<NodeId>),
    /// Throw an exception object
    Throw(NodeId),
    /// Virtual guard; `pass` when the assumption holds
    Guard {
        /// Guard descriptor
        guard: GuardInfo,
        /// Receiver the test inspects
        receiver: Option<NodeId>,
        /// Target when the test passes
        pass: BlockId,
        /// Target when the test fails
        fail: BlockId,
    },
}

impl Terminator {
    /// Nodes referenced by the terminator
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            Terminator::Goto(_) | Terminator::Return(None) => Vec::new(),
            Terminator::Branch { cond, .. } => vec![*cond],
            Terminator::Return(Some(value)) | Terminator::Throw(value) => vec![*value],
            Terminator::Guard { receiver, .. } => receiver.iter().copied().collect(),
        }
    }

    /// Successor blocks in branch order
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Goto(target) => vec![*target],
            Terminator::Branch {
                taken, not_taken, ..
            } => vec![*taken, *not_taken],
            Terminator::Guard { pass, fail, .. } => vec![*pass, *fail],
            Terminator::Return(_) | Terminator::Throw(_) => Vec::new(),
        }
    }

    /// Rewrite every block and node reference
    pub(crate) fn remap(
        &self,
        mut block: impl FnMut(BlockId) -> BlockId,
        mut node: impl FnMut(NodeId) -> NodeId,
    ) -> Terminator {
        match self {
            Terminator::Goto(target) => Terminator::Goto(block(*target)),
            Terminator::Branch {
                cond,
                taken,
                not_taken,
            } => Terminator::Branch {
                cond: node(*cond),
                taken: block(*taken),
                not_taken: block(*not_taken),
            },
            Terminator::Return(value) => Terminator::Return(value.map(node)),
            Terminator::Throw(value) => Terminator::Throw(node(*value)),
            Terminator::Guard {
                guard,
                receiver,
                pass,
                fail,
            } => Terminator::Guard {
                guard: *guard,
                receiver: receiver.map(node),
                pass: block(*pass),
                fail: block(*fail),
            },
        }
    }
}

/// Basic block
#[derive(Debug, Clone)]
pub struct Block {
    id: BlockId,
    stmts: Vec<NodeId>,
    terminator: Terminator,
    live: bool,
    /// Execution frequency, `MAX_BLOCK_FREQUENCY` meaning every invocation
    pub frequency: u32,
    /// Exception handler covering the block
    pub handler: Option<BlockId>,
    /// Number of enclosing loops
    pub loop_depth: u32,
    /// Block is known to be rarely executed
    pub cold: bool,
}

impl Block {
    /// Block handle
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Statement roots in order
    pub fn stmts(&self) -> &[NodeId] {
        &self.stmts
    }

    /// Terminator
    pub fn terminator(&self) -> &Terminator {
        &self.terminator
    }

    /// Check if the block is still part of the layout
    pub fn is_live(&self) -> bool {
        self.live
    }
}

/// Role of a local slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    /// Incoming argument, receiver first
    Param,
    /// Source-level local
    Auto,
    /// Compiler temporary
    Temp,
}

/// Declared local slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalDecl {
    /// Value type
    pub ty: ValueType,
    /// Role
    pub kind: LocalKind,
}

/// Position of the statement or terminator owning a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Statement `index` of a block
    Stmt(BlockId, usize),
    /// Terminator of a block
    Terminator(BlockId),
}

impl Anchor {
    /// Block owning the anchor
    pub fn block(self) -> BlockId {
        match self {
            Anchor::Stmt(block, _) | Anchor::Terminator(block) => block,
        }
    }
}

/// IR of one method
#[derive(Debug, Clone)]
pub struct MethodBody {
    method: MethodId,
    arena: NodeArena,
    blocks: Vec<Block>,
    layout: Vec<BlockId>,
    entry: BlockId,
    locals: Vec<LocalDecl>,
    param_count: usize,
    next_guard: u32,
    loop_header: Option<BlockId>,
}

impl MethodBody {
    /// Create a body with one empty entry block returning nothing
    ///
    /// `params` includes the receiver for instance methods.
    pub fn new(method: MethodId, params: &[ValueType]) -> Self {
        let locals = params
            .iter()
            .map(|&ty| LocalDecl {
                ty,
                kind: LocalKind::Param,
            })
            .collect();
        let mut body = Self {
            method,
            arena: NodeArena::new(),
            blocks: Vec::new(),
            layout: Vec::new(),
            entry: BlockId(0),
            locals,
            param_count: params.len(),
            next_guard: 0,
            loop_header: None,
        };
        body.entry = body.new_block();
        body
    }

    /// Create a body for a described method
    pub fn for_method(info: &MethodInfo) -> Self {
        Self::new(info.id, &info.arg_types())
    }

    /// Method this body belongs to
    pub fn method(&self) -> MethodId {
        self.method
    }

    /// Node arena
    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    /// Operation of a node
    pub fn op(&self, node: NodeId) -> &Op {
        self.arena.op(node)
    }

    /// Entry block
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub(crate) fn set_entry(&mut self, block: BlockId) {
        self.entry = block;
    }

    /// Blocks in program order
    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    /// Block by handle
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Mutable block properties
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    /// Number of block slots, including removed ones
    pub fn block_capacity(&self) -> usize {
        self.blocks.len()
    }

    /// Declared locals, parameters first
    pub fn locals(&self) -> &[LocalDecl] {
        &self.locals
    }

    /// Number of parameters, receiver included
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Local holding parameter `index`
    pub fn param(&self, index: usize) -> LocalId {
        LocalId(index as u32)
    }

    /// Type of a local
    pub fn local_type(&self, local: LocalId) -> ValueType {
        self.locals[local.index()].ty
    }

    /// Loop header created by tail recursion elimination, if any
    pub fn loop_header(&self) -> Option<BlockId> {
        self.loop_header
    }

    pub(crate) fn set_loop_header(&mut self, block: BlockId) {
        self.loop_header = Some(block);
    }

    /// Declare a source-level local
    pub fn new_local(&mut self, ty: ValueType) -> LocalId {
        self.push_local(ty, LocalKind::Auto)
    }

    /// Declare a compiler temporary
    pub fn new_temp(&mut self, ty: ValueType) -> LocalId {
        self.push_local(ty, LocalKind::Temp)
    }

    fn push_local(&mut self, ty: ValueType, kind: LocalKind) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(LocalDecl { ty, kind });
        id
    }

    /// Allocate a guard identity unique within this body
    pub fn new_guard_id(&mut self) -> GuardId {
        let id = GuardId(self.next_guard);
        self.next_guard += 1;
        id
    }

    /// Append an empty block returning nothing to the layout
    pub fn new_block(&mut self) -> BlockId {
        let id = self.alloc_block();
        self.layout.push(id);
        id
    }

    /// Insert an empty block directly after `after` in the layout
    pub fn insert_block_after(&mut self, after: BlockId) -> BlockId {
        let id = self.alloc_block();
        let pos = self
            .layout
            .iter()
            .position(|&b| b == after)
            .map_or(self.layout.len(), |p| p + 1);
        self.layout.insert(pos, id);
        id
    }

    /// Insert an empty block directly before `before` in the layout
    pub fn insert_block_before(&mut self, before: BlockId) -> BlockId {
        let id = self.alloc_block();
        let pos = self.layout.iter().position(|&b| b == before).unwrap_or(0);
        self.layout.insert(pos, id);
        id
    }

    fn alloc_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            id,
            stmts: Vec::new(),
            terminator: Terminator::Return(None),
            live: true,
            frequency: MAX_BLOCK_FREQUENCY,
            handler: None,
            loop_depth: 0,
            cold: false,
        });
        id
    }

    /// Create an unanchored node
    pub fn add_node(&mut self, op: Op, children: Vec<NodeId>) -> NodeId {
        self.arena.create(op, children)
    }

    /// Integer constant
    pub fn int(&mut self, value: i64) -> NodeId {
        self.add_node(Op::IntConst(value), Vec::new())
    }

    /// Null constant
    pub fn null(&mut self) -> NodeId {
        self.add_node(Op::NullConst, Vec::new())
    }

    /// Known object constant
    pub fn object(&mut self, object: KnownObjectId) -> NodeId {
        self.add_node(Op::ObjectConst(object), Vec::new())
    }

    /// Read of a local
    pub fn load(&mut self, local: LocalId) -> NodeId {
        self.add_node(Op::Load(local), Vec::new())
    }

    /// Arithmetic node
    pub fn binary(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.add_node(Op::Binary(op), vec![lhs, rhs])
    }

    /// Conversion node
    pub fn convert(&mut self, ty: ValueType, value: NodeId) -> NodeId {
        self.add_node(Op::Convert(ty), vec![value])
    }

    /// Allocation node
    pub fn new_object(&mut self, class: ClassId) -> NodeId {
        self.add_node(Op::New(class), Vec::new())
    }

    /// Call node
    pub fn call(&mut self, method: MethodId, kind: CallKind, bc_index: u32, args: Vec<NodeId>) -> NodeId {
        self.add_node(
            Op::Call(CallOp {
                method,
                kind,
                owner: self.method,
                bc_index,
                guard_fallback: false,
            }),
            args,
        )
    }

    /// Create and append `local = value`
    pub fn emit_store(&mut self, block: BlockId, local: LocalId, value: NodeId) -> NodeId {
        let store = self.add_node(Op::Store(local), vec![value]);
        self.push_stmt(block, store);
        store
    }

    /// Create and append an evaluation of `value`
    pub fn emit_eval(&mut self, block: BlockId, value: NodeId) -> NodeId {
        let eval = self.add_node(Op::Eval, vec![value]);
        self.push_stmt(block, eval);
        eval
    }

    /// Append a statement root
    pub fn push_stmt(&mut self, block: BlockId, node: NodeId) {
        let at = self.blocks[block.index()].stmts.len();
        self.insert_stmt(block, at, node);
    }

    /// Insert a statement root at `index`
    pub fn insert_stmt(&mut self, block: BlockId, index: usize, node: NodeId) {
        self.arena.acquire(node);
        self.blocks[block.index()].stmts.insert(index, node);
    }

    /// Remove statement `index`, releasing it
    pub fn remove_stmt(&mut self, block: BlockId, index: usize) -> NodeId {
        let node = self.blocks[block.index()].stmts.remove(index);
        self.arena.release(node);
        node
    }

    /// Replace a block's terminator, adjusting operand use counts
    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        for operand in terminator.operands() {
            self.arena.acquire(operand);
        }
        let old = std::mem::replace(&mut self.blocks[block.index()].terminator, terminator);
        for operand in old.operands() {
            self.arena.release(operand);
        }
    }

    /// Flag a call as a fallback so it is never a candidate again
    pub(crate) fn mark_fallback(&mut self, call: NodeId) {
        if let Op::Call(op) = &mut self.arena.nodes[call.index()].op {
            op.guard_fallback = true;
        }
    }

    /// Profile key of a call node
    pub fn call_site_key(&self, call: NodeId) -> Option<CallSiteKey> {
        self.op(call)
            .as_call()
            .map(|op| CallSiteKey::new(op.owner, op.bc_index))
    }

    /// Replace operand `index` of `parent`
    pub fn replace_child(&mut self, parent: NodeId, index: usize, new: NodeId) {
        self.arena.replace_child(parent, index, new);
    }

    /// Redirect every live reference to `old`, except from `keep`, to a
    /// node produced by `make`
    ///
    /// Returns the number of references rewritten.
    pub fn replace_all_uses(
        &mut self,
        old: NodeId,
        keep: Option<NodeId>,
        mut make: impl FnMut(&mut MethodBody) -> NodeId,
    ) -> usize {
        let mut rewritten = 0;
        for parent in self.live_nodes() {
            if Some(parent) == keep {
                continue;
            }
            for index in 0..self.arena.children(parent).len() {
                if self.arena.children(parent)[index] == old {
                    let new = make(self);
                    self.arena.replace_child(parent, index, new);
                    rewritten += 1;
                }
            }
        }
        for block in self.layout.clone() {
            if self.blocks[block.index()].terminator.operands().contains(&old) {
                let new = make(self);
                let term = self.blocks[block.index()]
                    .terminator
                    .remap(|b| b, |n| if n == old { new } else { n });
                self.set_terminator(block, term);
                rewritten += 1;
            }
        }
        rewritten
    }

    /// Every node reachable from a live anchor, each once
    pub fn live_nodes(&self) -> Vec<NodeId> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        for &block in &self.layout {
            for root in self.anchored_roots(block) {
                out.extend(self.arena.post_order(root, &mut seen));
            }
        }
        out
    }

    fn anchored_roots(&self, block: BlockId) -> Vec<NodeId> {
        let b = &self.blocks[block.index()];
        let mut roots = b.stmts.clone();
        roots.extend(b.terminator.operands());
        roots
    }

    /// Number of distinct live nodes
    pub fn node_count(&self) -> usize {
        self.live_nodes().len()
    }

    /// Call nodes in program order, excluding fallback and restart calls
    pub fn calls_in_program_order(&self) -> Vec<NodeId> {
        self.live_nodes()
            .into_iter()
            .filter(|&n| matches!(self.arena.op(n), Op::Call(call) if !call.guard_fallback))
            .collect()
    }

    /// Find the statement or terminator whose tree contains `node`
    pub fn locate(&self, node: NodeId) -> Option<Anchor> {
        for &block in &self.layout {
            let b = &self.blocks[block.index()];
            if let Some(index) = b.stmts.iter().position(|&s| self.arena.contains(s, node)) {
                return Some(Anchor::Stmt(block, index));
            }
            if b
                .terminator
                .operands()
                .iter()
                .any(|&t| self.arena.contains(t, node))
            {
                return Some(Anchor::Terminator(block));
            }
        }
        None
    }

    /// Number of live `Store` nodes writing `local`
    pub fn store_count(&self, local: LocalId) -> usize {
        self.live_nodes()
            .into_iter()
            .filter(|&n| *self.arena.op(n) == Op::Store(local))
            .count()
    }

    /// Move statements from `at` onwards, and the terminator, into a new
    /// block placed after `block`, which then jumps to it
    pub fn split_block(&mut self, block: BlockId, at: usize) -> BlockId {
        let tail = self.insert_block_after(block);
        let (stmts, terminator, frequency, handler, loop_depth, cold) = {
            let b = &mut self.blocks[block.index()];
            let stmts = b.stmts.split_off(at);
            let terminator = std::mem::replace(&mut b.terminator, Terminator::Goto(tail));
            (stmts, terminator, b.frequency, b.handler, b.loop_depth, b.cold)
        };
        let t = &mut self.blocks[tail.index()];
        t.stmts = stmts;
        t.terminator = terminator;
        t.frequency = frequency;
        t.handler = handler;
        t.loop_depth = loop_depth;
        t.cold = cold;
        tail
    }

    /// Control flow graph over live blocks
    pub fn cfg(&self) -> Cfg {
        Cfg::build(self)
    }

    /// Drop blocks not reachable from the entry, releasing their contents
    ///
    /// Returns the number of blocks removed.
    pub fn remove_unreachable(&mut self) -> usize {
        let reachable = self.cfg().reachable_from(self.entry);
        let dead: Vec<BlockId> = self
            .layout
            .iter()
            .copied()
            .filter(|b| !reachable.contains(b))
            .collect();
        for &block in &dead {
            while !self.blocks[block.index()].stmts.is_empty() {
                self.remove_stmt(block, 0);
            }
            self.set_terminator(block, Terminator::Return(None));
            self.blocks[block.index()].live = false;
        }
        self.layout.retain(|b| reachable.contains(b));
        dead.len()
    }

    /// Check structural invariants
    pub fn verify(&self) -> InlinerResult<()> {
        let fail = |message: String| Err(InlinerError::consistency(self.method, message));
        let live: FxHashSet<BlockId> = self.layout.iter().copied().collect();
        if !live.contains(&self.entry) {
            return fail(format!("entry {} is not in the layout", self.entry));
        }
        let mut counted: FxHashMap<NodeId, u32> = FxHashMap::default();
        for &block in &self.layout {
            let b = &self.blocks[block.index()];
            if !b.live {
                return fail(format!("{} is in the layout but marked removed", block));
            }
            for target in b.terminator.successors().into_iter().chain(b.handler) {
                if !live.contains(&target) {
                    return fail(format!("{} refers to missing block {}", block, target));
                }
            }
            for &stmt in &b.stmts {
                if !self.arena.op(stmt).is_statement() {
                    return fail(format!("{} roots non-statement {}", block, stmt));
                }
            }
            for root in self.anchored_roots(block) {
                *counted.entry(root).or_insert(0) += 1;
            }
        }
        let mut state: FxHashMap<NodeId, bool> = FxHashMap::default();
        for &block in &self.layout {
            for root in self.anchored_roots(block) {
                self.verify_tree(root, &mut state, &mut counted)?;
            }
        }
        for (&node, &refs) in &counted {
            if self.arena.uses(node) < refs {
                return fail(format!(
                    "{} has {} references but a use count of {}",
                    node,
                    refs,
                    self.arena.uses(node)
                ));
            }
        }
        Ok(())
    }

    fn verify_tree(
        &self,
        node: NodeId,
        state: &mut FxHashMap<NodeId, bool>,
        counted: &mut FxHashMap<NodeId, u32>,
    ) -> InlinerResult<()> {
        match state.get(&node) {
            Some(true) => return Ok(()),
            Some(false) => {
                return Err(InlinerError::consistency(
                    self.method,
                    format!("{} is its own ancestor", node),
                ))
            }
            None => {}
        }
        state.insert(node, false);
        for &child in self.arena.children(node) {
            *counted.entry(child).or_insert(0) += 1;
            self.verify_tree(child, state, counted)?;
        }
        state.insert(node, true);
        Ok(())
    }
}

/// Successor and predecessor relation over live blocks
///
/// Exception handler edges are included as successors.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    successors: FxHashMap<BlockId, Vec<BlockId>>,
    predecessors: FxHashMap<BlockId, Vec<BlockId>>,
}

impl Cfg {
    fn build(body: &MethodBody) -> Self {
        let mut cfg = Cfg::default();
        for &block in body.layout() {
            let b = body.block(block);
            let mut succs = b.terminator().successors();
            if let Some(handler) = b.handler {
                succs.push(handler);
            }
            for &succ in &succs {
                cfg.predecessors.entry(succ).or_default().push(block);
            }
            cfg.successors.insert(block, succs);
        }
        cfg
    }

    /// Successors of a block
    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        self.successors.get(&block).map_or(&[], Vec::as_slice)
    }

    /// Predecessors of a block
    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.predecessors.get(&block).map_or(&[], Vec::as_slice)
    }

    /// Blocks reachable from `start`, itself included
    pub fn reachable_from(&self, start: BlockId) -> FxHashSet<BlockId> {
        let mut seen = FxHashSet::default();
        let mut pending = vec![start];
        while let Some(block) = pending.pop() {
            if seen.insert(block) {
                pending.extend(self.successors(block).iter().copied());
            }
        }
        seen
    }
}
