//! Instructions other than calls and channel operations.

use golite_ast::{BinaryOperator, NodeKind, UnaryOperator};

use crate::builtins::Method;
use crate::error::RuntimeError;
use crate::goroutine::{Cx, Flow, GoRoutine};
use crate::ops;
use crate::value::{Addr, BranchKind, Instr, Item, MarkerKind, PopKind, Value};

use super::unexpected;

impl GoRoutine {
    pub(in crate::goroutine) fn exec_instr(&mut self, instr: Instr, cx: &mut Cx<'_>) -> Result<Flow, RuntimeError> {
        match instr {
            Instr::VarDecl(id) => {
                let node = cx.machine.ast.get(id)?;
                let NodeKind::VariableDeclaration { names, .. } = &node.kind else {
                    return Err(unexpected(id, "variable declaration"));
                };
                let addrs = self.take_values(cx, names.len())?;
                for (name, addr) in names.iter().zip(addrs) {
                    self.env.declare(&mut cx.machine.frames, name, addr)?;
                }
            }

            Instr::Assign(id) => {
                let node = cx.machine.ast.get(id)?;
                let NodeKind::Assignment { left, .. } = &node.kind else {
                    return Err(unexpected(id, "assignment"));
                };
                let addrs = self.take_values(cx, left.len())?;
                for (target, addr) in left.iter().zip(addrs) {
                    let NodeKind::Identifier { name } = &target.kind else {
                        return Err(RuntimeError::invalid(format!("cannot assign to {}", target.describe())));
                    };
                    if !self.env.assign(&mut cx.machine.frames, name, addr) {
                        return Err(RuntimeError::UndefinedIdentifier(name.clone()));
                    }
                }
            }

            Instr::Unary(UnaryOperator::Receive) => return self.receive(cx),
            Instr::Unary(op) => {
                let operand = cx.machine.heap.value(self.pop_stash()?)?;
                let result = ops::unary(op, &operand)?;
                self.push_value(cx, result)?;
            }

            Instr::Binary(op) => {
                let right = cx.machine.heap.value(self.pop_stash()?)?;
                let left = cx.machine.heap.value(self.pop_stash()?)?;
                let result = ops::binary(op, &left, &right, &cx.machine.ast)?;
                self.push_value(cx, result)?;
            }

            Instr::EnvRestore(frame) => self.env.set_cursor(frame),

            Instr::Pop(PopKind::Stash) => {
                self.pop_stash()?;
            }
            Instr::Pop(kind) => {
                if let Some(target) = kind.target() {
                    self.unwind(target, cx)?;
                }
            }

            Instr::Marker(MarkerKind::Return) => {
                // Fell off the end of a function.
                self.stash.push(cx.machine.heap.constants().nil);
                self.callers.pop();
            }
            Instr::Marker(_) => {}

            Instr::Branch { node, kind } => self.branch(node, kind, cx)?,

            Instr::Select(id) => {
                let node = cx.machine.ast.get(id)?;
                let NodeKind::SelectorExpression { operand, selector } = &node.kind else {
                    return Err(unexpected(id, "selector"));
                };
                let recv = *self.stash.last().ok_or_else(|| RuntimeError::Internal("stash underflow".into()))?;
                let receiver = cx.machine.heap.value(recv)?;
                ops::require_value(&receiver)?;
                let method = Method::lookup(&receiver, selector).ok_or_else(|| {
                    RuntimeError::invalid(format!(
                        "{}.{} undefined (type {} has no field or method {})",
                        operand.describe(),
                        selector,
                        receiver.type_name(),
                        selector
                    ))
                })?;
                let bound = self.alloc(cx, Value::Method { recv, method })?;
                self.stash.pop();
                self.stash.push(bound);
            }

            Instr::Send => return self.send(cx),
            Instr::Call { node, argc } => return self.call(node, argc as usize, cx),
            Instr::Go { node, argc } => return self.go(node, argc as usize, cx),
        }
        Ok(Flow::Continue)
    }

    /// Pop the top `n` stash entries, checking each holds a usable value.
    fn take_values(&mut self, cx: &mut Cx<'_>, n: usize) -> Result<Vec<Addr>, RuntimeError> {
        let base = self.stash_base(n)?;
        for value in cx.machine.heap.resolve_many(&self.stash[base..])? {
            ops::require_value(&value)?;
        }
        Ok(self.stash.split_off(base))
    }

    fn pop_bool(&mut self, cx: &mut Cx<'_>, context: &str) -> Result<bool, RuntimeError> {
        match cx.machine.heap.value(self.pop_stash()?)? {
            Value::Bool(b) => Ok(b),
            other => {
                ops::require_value(&other)?;
                Err(RuntimeError::invalid(format!(
                    "non-boolean condition in {} (type {})",
                    context,
                    other.type_name()
                )))
            }
        }
    }

    fn branch(&mut self, id: u32, kind: BranchKind, cx: &mut Cx<'_>) -> Result<(), RuntimeError> {
        let node = cx.machine.ast.get(id)?;
        match (kind, &node.kind) {
            (BranchKind::If, NodeKind::IfStatement { consequent, alternative, .. }) => {
                if self.pop_bool(cx, "if statement")? {
                    self.push_node(cx, consequent)?;
                } else if let Some(alternative) = alternative {
                    self.push_node(cx, alternative)?;
                }
            }
            (BranchKind::LoopTest, NodeKind::ForStatement { condition, .. }) => {
                self.push_record(cx, Instr::Branch { node: id, kind: BranchKind::LoopBody })?;
                match condition {
                    Some(condition) => self.push_node(cx, condition)?,
                    None => self.push(cx.machine.heap.constants().true_),
                }
            }
            (BranchKind::LoopBody, NodeKind::ForStatement { post, body, .. }) => {
                if self.pop_bool(cx, "for statement")? {
                    self.push_record(cx, Instr::Branch { node: id, kind: BranchKind::LoopTest })?;
                    if let Some(post) = post {
                        self.push_node(cx, post)?;
                    }
                    self.push(cx.machine.heap.constants().marker(MarkerKind::Continue));
                    self.push_node(cx, body)?;
                }
            }
            (BranchKind::ShortCircuit, NodeKind::BinaryExpression { operator, right, .. }) => {
                let left = cx.machine.heap.value(self.pop_stash()?)?;
                let Value::Bool(b) = left else {
                    ops::require_value(&left)?;
                    return Err(RuntimeError::invalid(format!(
                        "invalid operation: operator {} not defined on {}",
                        operator.symbol(),
                        left.type_name()
                    )));
                };
                let decided = match operator {
                    BinaryOperator::LogicalAnd => !b,
                    _ => b,
                };
                if decided {
                    self.stash.push(cx.machine.heap.constants().bool(b));
                } else {
                    self.push_node(cx, right)?;
                }
            }
            _ => return Err(unexpected(id, "branch target")),
        }
        Ok(())
    }

    /// Discard control items up to and including the nearest `target`
    /// marker, restoring every environment the discarded items would have.
    fn unwind(&mut self, target: MarkerKind, cx: &mut Cx<'_>) -> Result<(), RuntimeError> {
        while let Some(step) = self.control.pop() {
            match cx.machine.heap.resolve(step.addr())? {
                Item::Instr(Instr::Marker(kind)) if kind == target => {
                    if kind == MarkerKind::Return {
                        self.callers.pop();
                    }
                    return Ok(());
                }
                Item::Instr(Instr::Marker(MarkerKind::Return)) => {
                    let statement = if target == MarkerKind::LoopEnd { "break" } else { "continue" };
                    return Err(RuntimeError::invalid(format!("{} is not in a loop", statement)));
                }
                Item::Instr(Instr::EnvRestore(frame)) => self.env.set_cursor(frame),
                _ => {}
            }
        }
        Err(RuntimeError::Internal(format!("no {:?} marker to unwind to", target)))
    }
}
