//! Argument type propagation
//!
//! Facts about actual arguments (exact class, preexistence, known object
//! identity, constness) sharpen guard selection and bias weights. Facts
//! come from upstream global analysis, from the callee's declared
//! signature, and from the caller's own parameter facts when an argument
//! is a caller parameter or a local written exactly once.

use crate::ir::{LocalId, MethodBody, NodeId, Op};
use crate::program::MethodResolver;
use core_types::{ClassId, KnownObjectId, MethodInfo, ValueType};
use rustc_hash::FxHashMap;
use serde::Serialize;

/// What is known about one argument value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ArgFact {
    /// Class of the value, exact when `is_fixed`
    pub class: Option<ClassId>,
    /// `class` is the exact runtime class
    pub is_fixed: bool,
    /// Object identity is stable for the whole compiled region
    pub preexistent: bool,
    /// Value is this particular heap object
    pub known_object: Option<KnownObjectId>,
    /// Value is a compile-time constant
    pub is_constant: bool,
}

impl ArgFact {
    /// Value of exactly this class
    pub fn fixed(class: ClassId) -> Self {
        Self {
            class: Some(class),
            is_fixed: true,
            ..Self::default()
        }
    }

    /// A particular heap object
    pub fn known(object: KnownObjectId, class: Option<ClassId>) -> Self {
        Self {
            class,
            is_fixed: class.is_some(),
            preexistent: true,
            known_object: Some(object),
            is_constant: true,
        }
    }

    /// A primitive or null constant
    pub fn constant() -> Self {
        Self {
            is_constant: true,
            ..Self::default()
        }
    }

    /// Mark the value preexistent
    pub fn preexisting(mut self) -> Self {
        self.preexistent = true;
        self
    }

    fn rank(&self) -> u8 {
        if self.known_object.is_some() {
            3
        } else if self.is_fixed {
            2
        } else if self.class.is_some() {
            1
        } else {
            0
        }
    }

    /// Combine two facts; the more specific class information wins and
    /// flags accumulate
    pub fn merge(self, other: ArgFact) -> ArgFact {
        let (mut base, extra) = if other.rank() > self.rank() {
            (other, self)
        } else {
            (self, other)
        };
        base.preexistent |= extra.preexistent;
        base.is_constant |= extra.is_constant;
        if base.known_object.is_none() {
            base.known_object = extra.known_object;
        }
        base
    }
}

/// Per-parameter facts for one callee, receiver first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArgumentPrexInfo {
    args: Vec<Option<ArgFact>>,
}

impl ArgumentPrexInfo {
    /// No facts for `len` parameters
    pub fn new(len: usize) -> Self {
        Self {
            args: vec![None; len],
        }
    }

    /// Facts for parameter `ordinal`
    pub fn get(&self, ordinal: usize) -> Option<&ArgFact> {
        self.args.get(ordinal).and_then(Option::as_ref)
    }

    /// Record facts for parameter `ordinal`, growing the vector if needed
    pub fn set(&mut self, ordinal: usize, fact: ArgFact) {
        if self.args.len() <= ordinal {
            self.args.resize(ordinal + 1, None);
        }
        self.args[ordinal] = Some(fact);
    }

    /// Number of parameter slots
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Check if there are no parameter slots
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Iterate over all slots in ordinal order
    pub fn iter(&self) -> impl Iterator<Item = Option<&ArgFact>> {
        self.args.iter().map(Option::as_ref)
    }
}

/// Facts computed by an upstream global analysis, keyed by caller node
#[derive(Debug, Clone, Default)]
pub struct GlobalTypeInfo {
    node_facts: FxHashMap<NodeId, ArgFact>,
}

impl GlobalTypeInfo {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record what is known about a value node of the top-level method
    pub fn insert(&mut self, node: NodeId, fact: ArgFact) {
        self.node_facts.insert(node, fact);
    }

    /// Facts for a node
    pub fn get(&self, node: NodeId) -> Option<&ArgFact> {
        self.node_facts.get(&node)
    }
}

/// Argument whose inferred class contradicts the declared parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgConflict {
    /// Parameter ordinal, receiver first
    pub ordinal: usize,
}

/// Computes [`ArgumentPrexInfo`] for call targets
pub struct ArgumentPropagator<'a> {
    resolver: &'a dyn MethodResolver,
}

impl<'a> ArgumentPropagator<'a> {
    /// Create a propagator
    pub fn new(resolver: &'a dyn MethodResolver) -> Self {
        Self { resolver }
    }

    /// Facts for the arguments of `call` in `caller`, as seen by `callee`
    ///
    /// `global` only applies when `caller` is the top-level method.
    pub fn propagate(
        &self,
        caller: &MethodBody,
        caller_prex: &ArgumentPrexInfo,
        global: Option<&GlobalTypeInfo>,
        call: NodeId,
        callee: &MethodInfo,
    ) -> Result<ArgumentPrexInfo, ArgConflict> {
        let declared = callee.arg_types();
        let args = caller.arena().children(call);
        let mut info = ArgumentPrexInfo::new(declared.len());
        for (ordinal, (&arg, &ty)) in args.iter().zip(declared.iter()).enumerate() {
            let sources = [
                global.and_then(|g| g.get(arg)).copied(),
                self.from_caller(caller, caller_prex, arg),
                self.from_signature(ty),
            ];
            let merged = sources.into_iter().flatten().reduce(ArgFact::merge);
            if let Some(fact) = merged {
                if !self.is_compatible(&fact, ty) {
                    return Err(ArgConflict { ordinal });
                }
                info.set(ordinal, fact);
            }
        }
        Ok(info)
    }

    fn from_signature(&self, ty: ValueType) -> Option<ArgFact> {
        let class = ty.class()?;
        self.resolver
            .class(class)
            .filter(|c| c.is_final)
            .map(|_| ArgFact::fixed(class))
    }

    fn from_caller(&self, caller: &MethodBody, caller_prex: &ArgumentPrexInfo, arg: NodeId) -> Option<ArgFact> {
        match *caller.op(arg) {
            Op::IntConst(_) | Op::NullConst => Some(ArgFact::constant()),
            Op::ClassRef(_) => Some(ArgFact::constant().preexisting()),
            Op::ObjectConst(object) => Some(ArgFact::known(object, None)),
            Op::New(class) => Some(ArgFact::fixed(class)),
            Op::Load(local) => {
                let ordinal = local.index();
                if ordinal < caller.param_count() {
                    if caller.store_count(local) == 0 {
                        return caller_prex.get(ordinal).copied();
                    }
                    return None;
                }
                self.single_store_value(caller, local)
                    .and_then(|value| match *caller.op(value) {
                        Op::New(class) => Some(ArgFact::fixed(class)),
                        Op::ObjectConst(object) => Some(ArgFact::known(object, None)),
                        Op::IntConst(_) | Op::NullConst => Some(ArgFact::constant()),
                        _ => None,
                    })
            }
            _ => None,
        }
    }

    fn single_store_value(&self, caller: &MethodBody, local: LocalId) -> Option<NodeId> {
        let mut stores = caller
            .live_nodes()
            .into_iter()
            .filter(|&n| *caller.op(n) == Op::Store(local));
        let store = stores.next()?;
        if stores.next().is_some() {
            return None;
        }
        caller.arena().children(store).first().copied()
    }

    fn is_compatible(&self, fact: &ArgFact, declared: ValueType) -> bool {
        match declared {
            ValueType::Reference(expected) => fact
                .class
                .map_or(true, |class| self.resolver.is_instance_of(class, expected)),
            _ => fact.class.is_none() && fact.known_object.is_none(),
        }
    }
}
