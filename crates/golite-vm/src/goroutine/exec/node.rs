//! Syntax-tree nodes.
//!
//! The control stack is LIFO, so a node that must evaluate operands before
//! applying an operation pushes the operation first and the operands after
//! it, last operand first.

use golite_ast::{LiteralValue, Node, NodeKind, TypeExpr};

use crate::error::RuntimeError;
use crate::goroutine::{Cx, Flow, GoRoutine};
use crate::value::{Addr, BranchKind, Instr, MakeRequest, MarkerKind, PopKind, Record, Value};

impl GoRoutine {
    pub(in crate::goroutine) fn eval_node(
        &mut self,
        node: &Node,
        addr: Addr,
        cx: &mut Cx<'_>,
    ) -> Result<Flow, RuntimeError> {
        if node.loc.is_some() {
            self.location = node.loc;
        }
        let consts = cx.machine.heap.constants().clone();
        match &node.kind {
            NodeKind::SourceFile { declarations } => self.push_nodes(cx, declarations)?,

            NodeKind::Block { statements } => {
                self.push_record(cx, Instr::EnvRestore(self.env.cursor()))?;
                self.push_nodes(cx, statements)?;
                self.env.extend(&mut cx.machine.frames, Vec::new());
            }

            NodeKind::VariableDeclaration { names, var_type, values } => {
                if values.is_empty() {
                    for name in names {
                        let zero = self.zero_value(cx, var_type.as_ref())?;
                        self.env.declare_zero_value(&mut cx.machine.frames, name, zero)?;
                    }
                } else if values.len() != names.len() {
                    return Err(RuntimeError::AssignmentArityMismatch {
                        variables: names.len(),
                        values: values.len(),
                    });
                } else {
                    self.push_record(cx, Instr::VarDecl(node.id))?;
                    self.push_nodes(cx, values)?;
                }
            }

            NodeKind::FunctionDeclaration { name, .. } => {
                let closure = self.alloc(cx, Value::Closure { func: node.id, frame: self.env.cursor() })?;
                self.env.declare(&mut cx.machine.frames, name, closure)?;
            }

            NodeKind::FunctionLiteral { .. } => {
                let closure = self.alloc(cx, Value::Closure { func: node.id, frame: self.env.cursor() })?;
                self.stash.push(closure);
            }

            NodeKind::ReturnStatement { value } => {
                self.push(consts.pop(PopKind::UntilReturn));
                match value {
                    Some(value) => self.push_node(cx, value)?,
                    None => self.push(consts.nil),
                }
            }

            NodeKind::IfStatement { init: Some(_), .. } | NodeKind::ForStatement { init: Some(_), .. } => {
                let block = cx.machine.ast.desugared(node).ok_or_else(|| {
                    RuntimeError::Internal(format!("no rewrite for {} node {}", node.kind_name(), node.id))
                })?;
                self.push_node(cx, &block)?;
            }

            NodeKind::IfStatement { condition, .. } => {
                self.push_record(cx, Instr::Branch { node: node.id, kind: BranchKind::If })?;
                self.push_node(cx, condition)?;
            }

            NodeKind::ForStatement { .. } => {
                self.push(consts.marker(MarkerKind::LoopEnd));
                self.push_record(cx, Instr::Branch { node: node.id, kind: BranchKind::LoopTest })?;
            }

            NodeKind::BreakStatement => self.push(consts.pop(PopKind::UntilLoopEnd)),
            NodeKind::ContinueStatement => self.push(consts.pop(PopKind::UntilContinue)),
            NodeKind::EmptyStatement => {}

            NodeKind::ExpressionStatement { expression } => {
                self.push(consts.pop(PopKind::Stash));
                self.push_node(cx, expression)?;
            }

            NodeKind::GoStatement { call } => {
                let NodeKind::CallExpression { callee, args } = &call.kind else {
                    return Err(RuntimeError::GoStatementNonCall);
                };
                self.push_record(cx, Instr::Go { node: call.id, argc: args.len() as u32 })?;
                self.push_nodes(cx, args)?;
                self.push_node(cx, callee)?;
            }

            NodeKind::SendStatement { channel, value } => {
                self.push(consts.send);
                self.push_node(cx, value)?;
                self.push_node(cx, channel)?;
            }

            NodeKind::Assignment { left, operator, right } => {
                for target in left {
                    if !matches!(target.kind, NodeKind::Identifier { .. }) {
                        return Err(RuntimeError::invalid(format!("cannot assign to {}", target.describe())));
                    }
                }
                if left.len() != right.len() {
                    return Err(RuntimeError::AssignmentArityMismatch {
                        variables: left.len(),
                        values: right.len(),
                    });
                }
                match operator {
                    Some(op) if op.is_logical() || left.len() != 1 => {
                        return Err(RuntimeError::invalid(format!(
                            "invalid operation: operator {}= not supported here",
                            op.symbol()
                        )));
                    }
                    Some(op) => {
                        self.push_record(cx, Instr::Assign(node.id))?;
                        self.push_record(cx, Instr::Binary(*op))?;
                        self.push_node(cx, &right[0])?;
                        self.push_node(cx, &left[0])?;
                    }
                    None => {
                        self.push_record(cx, Instr::Assign(node.id))?;
                        self.push_nodes(cx, right)?;
                    }
                }
            }

            NodeKind::UnaryExpression { operator, argument } => {
                self.push_record(cx, Instr::Unary(*operator))?;
                self.push_node(cx, argument)?;
            }

            NodeKind::BinaryExpression { operator, left, right } => {
                if operator.is_logical() {
                    self.push_record(cx, Instr::Branch { node: node.id, kind: BranchKind::ShortCircuit })?;
                } else {
                    self.push_record(cx, Instr::Binary(*operator))?;
                    self.push_node(cx, right)?;
                }
                self.push_node(cx, left)?;
            }

            NodeKind::Identifier { name } => {
                let found = self.env.lookup(&cx.machine.frames, name);
                let value = found.ok_or_else(|| RuntimeError::UndefinedIdentifier(name.clone()))?;
                self.stash.push(value);
            }

            NodeKind::Literal { value: LiteralValue::Number(n) } => self.push_value(cx, Value::Number(*n))?,
            // String and type literals are their own value.
            NodeKind::Literal { value: LiteralValue::String(_) } | NodeKind::TypeLiteral { .. } => {
                self.stash.push(addr)
            }

            NodeKind::CallExpression { callee, args } => {
                self.push_record(cx, Instr::Call { node: node.id, argc: args.len() as u32 })?;
                self.push_nodes(cx, args)?;
                self.push_node(cx, callee)?;
            }

            NodeKind::SelectorExpression { operand, selector } => {
                // `sync.WaitGroup` and friends are bound under their
                // qualified name unless `sync` itself is shadowed.
                if let NodeKind::Identifier { name } = &operand.kind {
                    let frames = &cx.machine.frames;
                    let qualified = self.env.lookup(frames, &format!("{}.{}", name, selector));
                    if let (Some(found), None) = (qualified, self.env.lookup(frames, name)) {
                        self.stash.push(found);
                        return Ok(Flow::Continue);
                    }
                }
                self.push_record(cx, Instr::Select(node.id))?;
                self.push_node(cx, operand)?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Zero value for `var x T`.
    fn zero_value(&self, cx: &mut Cx<'_>, ty: Option<&TypeExpr>) -> Result<Addr, RuntimeError> {
        let record = match ty {
            Some(TypeExpr::WaitGroup) => Record::Make(MakeRequest::WaitGroup),
            Some(TypeExpr::Mutex) => Record::Make(MakeRequest::Mutex),
            Some(t) if t.is_bool() => Value::Bool(false).into(),
            Some(TypeExpr::Channel { .. } | TypeExpr::Function) => Value::Nil.into(),
            _ => Value::Number(0.0).into(),
        };
        self.alloc(cx, record)
    }
}
