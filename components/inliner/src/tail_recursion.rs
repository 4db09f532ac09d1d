//! Tail recursion elimination
//!
//! A self call whose result flows straight to a return becomes a jump back
//! to a loop header placed in front of the original entry. Arguments are
//! evaluated into fresh temporaries before any parameter is rebound, so
//! swapped arguments such as `f(b, a)` stay correct.

use crate::error::{InlinerError, InlinerResult};
use crate::guard::VirtualGuardSelection;
use crate::ir::{Anchor, BlockId, GuardInfo, LocalId, MethodBody, NodeId, Op, Terminator};
use core_types::ValueType;
use rustc_hash::FxHashSet;
use tracing::debug;

/// How the self call reaches the return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailForm {
    /// Last statement of its block, `Eval(call)` or `Store(result, call)`,
    /// followed by empty jumps to a return of the stored value
    Stmt {
        /// Statement index
        index: usize,
        /// Local receiving the result
        result: Option<LocalId>,
    },
    /// Operand of the block's return, optionally under one conversion
    Return {
        /// Conversion applied to the result
        convert: Option<ValueType>,
    },
}

/// A self call in tail position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailCall {
    /// Call node
    pub call: NodeId,
    /// Block holding the call
    pub block: BlockId,
    /// Shape of the tail position
    pub form: TailForm,
}

/// Check if `call` is a self call of `body` in tail position
///
/// Only the IR shape is checked; callers decide whether the call really
/// targets the method itself.
pub fn analyze(body: &MethodBody, call: NodeId) -> Option<TailCall> {
    let op = body.op(call).as_call()?;
    if op.guard_fallback || body.arena().uses(call) != 1 {
        return None;
    }
    match body.locate(call)? {
        Anchor::Stmt(block, index) => {
            let b = body.block(block);
            if b.handler.is_some() || index + 1 != b.stmts().len() {
                return None;
            }
            let stmt = b.stmts()[index];
            if body.arena().children(stmt).first() != Some(&call) {
                return None;
            }
            let result = match *body.op(stmt) {
                Op::Eval => None,
                Op::Store(local) => Some(local),
                _ => return None,
            };
            if !returns_result(body, block, result) {
                return None;
            }
            Some(TailCall {
                call,
                block,
                form: TailForm::Stmt { index, result },
            })
        }
        Anchor::Terminator(block) => {
            let b = body.block(block);
            if b.handler.is_some() {
                return None;
            }
            let Terminator::Return(Some(value)) = *b.terminator() else {
                return None;
            };
            if value == call {
                return Some(TailCall {
                    call,
                    block,
                    form: TailForm::Return { convert: None },
                });
            }
            match *body.op(value) {
                Op::Convert(ty) if body.arena().children(value) == [call] && body.arena().uses(value) == 1 => {
                    Some(TailCall {
                        call,
                        block,
                        form: TailForm::Return { convert: Some(ty) },
                    })
                }
                _ => None,
            }
        }
    }
}

/// Follow empty jump blocks from `start` and check the return hands back
/// `result` unchanged, or under a single conversion
fn returns_result(body: &MethodBody, start: BlockId, result: Option<LocalId>) -> bool {
    let mut seen = FxHashSet::default();
    let mut terminator = body.block(start).terminator();
    loop {
        match *terminator {
            Terminator::Goto(next) => {
                if !seen.insert(next) {
                    return false;
                }
                let b = body.block(next);
                if !b.stmts().is_empty() || b.handler.is_some() {
                    return false;
                }
                terminator = b.terminator();
            }
            Terminator::Return(value) => {
                return match (value, result) {
                    (None, None) => true,
                    (Some(value), Some(local)) => {
                        let value = match *body.op(value) {
                            Op::Convert(_) => match body.arena().children(value) {
                                [inner] => *inner,
                                _ => return false,
                            },
                            _ => value,
                        };
                        *body.op(value) == Op::Load(local)
                    }
                    _ => false,
                };
            }
            _ => return false,
        }
    }
}

/// Turn the tail call into a jump to the loop header
///
/// With a guard, the jump is only taken when the guard passes; the call
/// itself stays on the failing path. The guard gets a fresh identity.
pub fn eliminate(body: &mut MethodBody, call: NodeId, guard: Option<VirtualGuardSelection>) -> InlinerResult<()> {
    let method = body.method();
    let tail = analyze(body, call)
        .ok_or_else(|| InlinerError::consistency(method, format!("{} is no longer a tail call", call)))?;
    let args = body.arena().children(call).to_vec();
    if args.len() != body.param_count() {
        return Err(InlinerError::consistency(
            method,
            format!("self call {} passes {} arguments to {} parameters", call, args.len(), body.param_count()),
        ));
    }
    let header = loop_header(body);
    let block = tail.block;

    let insert_at = match tail.form {
        TailForm::Stmt { index, .. } => index,
        TailForm::Return { .. } => body.block(block).stmts().len(),
    };
    let mut temps = Vec::with_capacity(args.len());
    for (ordinal, &arg) in args.iter().enumerate() {
        let ty = body.local_type(body.param(ordinal));
        let temp = body.new_temp(ty);
        let store = body.add_node(Op::Store(temp), vec![arg]);
        body.insert_stmt(block, insert_at + ordinal, store);
        temps.push(temp);
    }
    let stmt_index = insert_at + args.len();

    let guard = guard.filter(VirtualGuardSelection::is_guarded);
    let rebind = match guard {
        None => block,
        Some(_) => body.insert_block_after(block),
    };
    for (ordinal, &temp) in temps.iter().enumerate() {
        let value = body.load(temp);
        let param = body.param(ordinal);
        body.emit_store(rebind, param, value);
    }

    match guard {
        None => {
            if let TailForm::Stmt { .. } = tail.form {
                body.remove_stmt(block, stmt_index);
            }
            body.set_terminator(block, Terminator::Goto(header));
        }
        Some(selection) => {
            let frequency = body.block(block).frequency;
            body.block_mut(rebind).frequency = frequency;
            body.set_terminator(rebind, Terminator::Goto(header));

            for (ordinal, &temp) in temps.iter().enumerate() {
                let value = body.load(temp);
                body.replace_child(call, ordinal, value);
            }
            body.mark_fallback(call);

            let fallback = body.insert_block_after(rebind);
            {
                let f = body.block_mut(fallback);
                f.frequency = 0;
                f.cold = true;
            }
            if let TailForm::Stmt { .. } = tail.form {
                let stmt = body.block(block).stmts()[stmt_index];
                body.push_stmt(fallback, stmt);
                body.remove_stmt(block, stmt_index);
            }
            let continuation = body.block(block).terminator().clone();
            body.set_terminator(fallback, continuation);

            let receiver = if temps.is_empty() {
                None
            } else {
                Some(body.load(temps[0]))
            };
            let guard = GuardInfo {
                id: body.new_guard_id(),
                selection,
                target: method,
            };
            body.set_terminator(
                block,
                Terminator::Guard {
                    guard,
                    receiver,
                    pass: rebind,
                    fail: fallback,
                },
            );
        }
    }
    debug!(method = %method, call = %call, guarded = guard.is_some(), "tail call turned into loop");
    Ok(())
}

fn loop_header(body: &mut MethodBody) -> BlockId {
    if let Some(header) = body.loop_header() {
        return header;
    }
    let entry = body.entry();
    let header = body.insert_block_before(entry);
    let check = body.add_node(Op::AsyncCheck, Vec::new());
    body.push_stmt(header, check);
    body.set_terminator(header, Terminator::Goto(entry));
    let frequency = body.block(entry).frequency;
    body.block_mut(header).frequency = frequency;
    body.set_entry(header);
    body.set_loop_header(header);
    header
}
