//! Shared fixtures for inliner integration tests

#![allow(dead_code)]

use core_types::{ClassId, ClassInfo, MethodFlags, MethodId, MethodInfo, ValueType};
use inliner::{BinaryOp, CallKind, MethodBody, NodeId, Op, ProgramDatabase, Terminator};
use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Route inliner tracing to the test output, filtered by `RUST_LOG`
pub fn init_logging() {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("inliner=warn"));
        let _ = fmt()
            .with_env_filter(env_filter)
            .with_test_writer()
            .with_target(false)
            .compact()
            .try_init();
    });
}

pub const MAIN_CLASS: ClassId = ClassId(1);

pub fn static_flags() -> MethodFlags {
    MethodFlags {
        is_static: true,
        ..MethodFlags::default()
    }
}

/// Static `int name(int, ...)` on the main class
pub fn static_int_method(id: u32, name: &str, params: usize) -> MethodInfo {
    let signature = format!("({})I", "I".repeat(params));
    MethodInfo::new(
        MethodId(id),
        MAIN_CLASS,
        name,
        signature,
        vec![ValueType::Int; params],
        ValueType::Int,
    )
    .with_flags(static_flags())
}

/// Database holding only the main class
pub fn program() -> ProgramDatabase {
    let mut db = ProgramDatabase::new();
    db.add_class(ClassInfo::new(MAIN_CLASS, "Main", None));
    db
}

/// `inc(y) = y + 1`
pub fn inc_body(method: MethodId) -> MethodBody {
    let mut body = MethodBody::new(method, &[ValueType::Int]);
    let y = body.load(body.param(0));
    let one = body.int(1);
    let sum = body.binary(BinaryOp::Add, y, one);
    let entry = body.entry();
    body.set_terminator(entry, Terminator::Return(Some(sum)));
    body
}

/// Add `links` constants to `start`, one node pair per link
pub fn add_chain(body: &mut MethodBody, start: NodeId, links: i64) -> NodeId {
    let mut acc = start;
    for i in 0..links {
        let k = body.int(i);
        acc = body.binary(BinaryOp::Add, acc, k);
    }
    acc
}

/// `big(y) = y + 0 + 1 + ... ` with `2 * links + 1` nodes
pub fn chain_body(method: MethodId, links: i64) -> MethodBody {
    let mut body = MethodBody::new(method, &[ValueType::Int]);
    let y = body.load(body.param(0));
    let acc = add_chain(&mut body, y, links);
    let entry = body.entry();
    body.set_terminator(entry, Terminator::Return(Some(acc)));
    body
}

/// Caller evaluating one static call per callee on its own parameter and
/// returning the sum of the results
pub fn calling_each(method: MethodId, callees: &[MethodId]) -> (MethodBody, Vec<NodeId>) {
    let mut body = MethodBody::new(method, &[ValueType::Int]);
    let entry = body.entry();
    let mut calls = Vec::new();
    let mut total = body.int(0);
    for (i, &callee) in callees.iter().enumerate() {
        let x = body.load(body.param(0));
        let call = body.call(callee, CallKind::Static, i as u32, vec![x]);
        let result = body.new_local(ValueType::Int);
        body.emit_store(entry, result, call);
        let value = body.load(result);
        total = body.binary(BinaryOp::Add, total, value);
        calls.push(call);
    }
    body.set_terminator(entry, Terminator::Return(Some(total)));
    (body, calls)
}

/// Live call nodes, fallback and restart calls included
pub fn all_calls(body: &MethodBody) -> Vec<NodeId> {
    body.live_nodes()
        .into_iter()
        .filter(|&n| matches!(body.op(n), Op::Call(_)))
        .collect()
}

/// Live nodes with the given operation
pub fn count_ops(body: &MethodBody, pred: impl Fn(&Op) -> bool) -> usize {
    body.live_nodes().into_iter().filter(|&n| pred(body.op(n))).count()
}
