//! Method inliner for the optimizing compiler
//!
//! This crate decides which calls of a method should be replaced by the
//! callee's own IR and performs the substitution:
//! - Call graph construction with devirtualization and bounded peeking
//! - Size estimation, heuristic weighing and budgeted selection
//! - Tail recursion elimination for self calls in tail position
//! - Splicing with guards, monitor handling and partial inlining
//!
//! # Example
//!
//! ```
//! use core_types::{ClassId, ClassInfo, MethodFlags, MethodId, MethodInfo, ValueType};
//! use inliner::{
//!     ArgumentPrexInfo, BinaryOp, CallKind, InlinerConfig, InlinerPass, MethodBody, ProgramDatabase,
//!     Terminator,
//! };
//!
//! let statik = MethodFlags { is_static: true, ..MethodFlags::default() };
//! let mut program = ProgramDatabase::new();
//! program.add_class(ClassInfo::new(ClassId(1), "Main", None));
//! let twice = program.add_method(
//!     MethodInfo::new(MethodId(2), ClassId(1), "twice", "(I)I", vec![ValueType::Int], ValueType::Int)
//!         .with_flags(statik),
//! );
//! let main = program.add_method(
//!     MethodInfo::new(MethodId(1), ClassId(1), "main", "(I)I", vec![ValueType::Int], ValueType::Int)
//!         .with_flags(statik),
//! );
//!
//! // twice(x) = x + x
//! let mut callee = MethodBody::new(twice, &[ValueType::Int]);
//! let a = callee.load(callee.param(0));
//! let b = callee.load(callee.param(0));
//! let sum = callee.binary(BinaryOp::Add, a, b);
//! let entry = callee.entry();
//! callee.set_terminator(entry, Terminator::Return(Some(sum)));
//! program.add_body(callee);
//!
//! // main(x) = twice(x)
//! let mut body = MethodBody::new(main, &[ValueType::Int]);
//! let x = body.load(body.param(0));
//! let call = body.call(twice, CallKind::Static, 0, vec![x]);
//! let entry = body.entry();
//! body.set_terminator(entry, Terminator::Return(Some(call)));
//!
//! let config = InlinerConfig::default();
//! let report = InlinerPass::new(&config, &program, None)
//!     .run(&mut body, &ArgumentPrexInfo::default())
//!     .unwrap();
//! assert_eq!(report.inlined_sites, 1);
//! assert!(body.calls_in_program_order().is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod budget;
pub mod builder;
pub mod call_graph;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod estimate;
pub mod guard;
pub mod ir;
pub mod pass;
pub mod policy;
pub mod prex;
pub mod program;
pub mod tail_recursion;
pub mod transform;
pub mod weigh;

// Re-export main types at crate root
pub use budget::{Allocation, BudgetAllocator};
pub use builder::{CallGraphBuilder, ResolvedTarget};
pub use call_graph::{
    CallGraph, CallSite, CallSiteId, CallStack, CallTarget, CallTargetId, EstimateFailure, PartialInline,
    RejectReason,
};
pub use config::InlinerConfig;
pub use diagnostics::{Decision, InlineLog, Outcome};
pub use error::{InlinerError, InlinerResult};
pub use estimate::SizeEstimator;
pub use guard::{GuardId, GuardKind, TestType, VirtualGuardSelection};
pub use ir::{
    Anchor, BinaryOp, Block, BlockId, CallKind, CallOp, Cfg, GuardInfo, LocalDecl, LocalId, LocalKind, MethodBody,
    NodeArena, NodeId, Op, Terminator,
};
pub use pass::{InlinePlan, InlineReport, InlinerPass};
pub use policy::{LegacyRule, PolicyBits, PolicyTable};
pub use prex::{ArgFact, ArgumentPrexInfo, ArgumentPropagator, GlobalTypeInfo};
pub use program::{IrProvider, MethodResolver, ProgramDatabase};
pub use tail_recursion::{TailCall, TailForm};
pub use transform::{TransformStats, Transformer};
pub use weigh::Weigher;
