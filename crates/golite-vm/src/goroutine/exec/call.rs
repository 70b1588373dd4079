//! Calls and `go` statements.
//!
//! A call finds its callee and arguments on the stash, callee deepest. A
//! closure call binds parameters in a frame under the closure's own frame
//! and pushes, in order, an environment restore for the caller, the return
//! marker and the body. Builtins and sync methods run to completion here,
//! except `Wait` and `Lock`, which block until they can.

use golite_ast::{AstId, NodeKind, TypeExpr};
use tracing::debug;

use crate::builtins::{format_line, Builtin, Method};
use crate::error::RuntimeError;
use crate::goroutine::{Cx, Flow, GoRoutine};
use crate::host::RAW_DISPLAY;
use crate::objects::{Mutex, WaitGroup};
use crate::ops;
use crate::value::{is_integral, Addr, Instr, MakeRequest, MarkerKind, Record, Value};

use super::unexpected;

/// Largest buffer `make(chan T, n)` accepts.
const MAX_CHANNEL_CAPACITY: f64 = u8::MAX as f64;

impl GoRoutine {
    pub(in crate::goroutine) fn call(&mut self, node: AstId, argc: usize, cx: &mut Cx<'_>) -> Result<Flow, RuntimeError> {
        let base = self.stash_base(argc + 1)?;
        let callee = cx.machine.heap.value(self.stash[base])?;
        let args = cx.machine.heap.resolve_many(&self.stash[base + 1..])?;
        for arg in &args {
            ops::require_value(arg)?;
        }

        match callee {
            Value::Closure { func, frame } => {
                let name = callee_name(node, cx)?;
                let parts = cx.machine.ast.function(func)?;
                self.check_arity(&name, argc, parts.params.len())?;

                self.push_record(cx, Instr::EnvRestore(self.env.cursor()))?;
                self.push(cx.machine.heap.constants().marker(MarkerKind::Return));
                self.push_node(cx, &parts.body)?;

                let bound = self.stash.split_off(base + 1);
                self.stash.pop();
                self.env.set_cursor(frame);
                let bindings = parts.params.into_iter().map(|p| p.name).zip(bound).collect();
                self.env.extend(&mut cx.machine.frames, bindings);
                self.callers.push(name);
                Ok(Flow::Continue)
            }
            Value::Builtin(builtin) => {
                let result = self.call_builtin(builtin, &args, cx)?;
                self.stash.truncate(base);
                self.stash.push(result);
                Ok(Flow::Continue)
            }
            Value::Method { recv, method } => {
                let name = callee_name(node, cx)?;
                self.check_arity(&name, argc, method.arity())?;
                if self.call_method(recv, method, &args, cx)? == Flow::Block {
                    return Ok(Flow::Block);
                }
                self.stash.truncate(base);
                self.stash.push(cx.machine.heap.constants().nil);
                Ok(Flow::Continue)
            }
            Value::Nil => Err(RuntimeError::invalid(
                "panic: runtime error: invalid memory address or nil pointer dereference",
            )),
            other => Err(RuntimeError::invalid(format!(
                "invalid operation: cannot call non-function {} (value of type {})",
                callee_name(node, cx)?,
                other.type_name()
            ))),
        }
    }

    /// `go f(args)`: the callee and arguments are already evaluated in this
    /// goroutine; the call itself runs in a new one.
    pub(in crate::goroutine) fn go(&mut self, node: AstId, argc: usize, cx: &mut Cx<'_>) -> Result<Flow, RuntimeError> {
        let base = self.stash_base(argc + 1)?;
        let callee = cx.machine.heap.value(self.stash[base])?;
        let mut env = self.env.copy();

        let routine = match callee {
            Value::Closure { func, frame } => {
                let name = callee_name(node, cx)?;
                let parts = cx.machine.ast.function(func)?;
                self.check_arity(&name, argc, parts.params.len())?;
                for arg in cx.machine.heap.resolve_many(&self.stash[base + 1..])? {
                    ops::require_value(&arg)?;
                }
                let body = self.alloc(cx, Value::Node(parts.body.id))?;
                let id = cx.machine.next_routine_id()?;

                let bound = self.stash.split_off(base + 1);
                self.stash.pop();
                env.set_cursor(frame);
                let bindings = parts.params.into_iter().map(|p| p.name).zip(bound).collect();
                env.extend(&mut cx.machine.frames, bindings);

                let ret = cx.machine.heap.constants().marker(MarkerKind::Return);
                let mut routine = GoRoutine::new(id, false, env, vec![ret, body]);
                routine.callers.push(name);
                routine
            }
            Value::Builtin(_) | Value::Method { .. } => {
                let call = self.alloc(cx, Instr::Call { node, argc: argc as u32 })?;
                let id = cx.machine.next_routine_id()?;
                let mut routine = GoRoutine::new(id, false, env, vec![call]);
                routine.stash = self.stash.split_off(base);
                routine
            }
            other => {
                ops::require_value(&other)?;
                return Err(RuntimeError::invalid(format!(
                    "invalid operation: cannot call non-function {} (value of type {})",
                    callee_name(node, cx)?,
                    other.type_name()
                )));
            }
        };

        debug!(parent = self.id, routine = routine.id, "spawned goroutine");
        cx.machine.spawn(routine);
        Ok(Flow::Continue)
    }

    fn check_arity(&self, callee: &str, received: usize, expected: usize) -> Result<(), RuntimeError> {
        if received == expected {
            return Ok(());
        }
        Err(RuntimeError::FunctionArityMismatch {
            caller: self.caller_name(),
            callee: callee.to_string(),
            received,
            expected,
        })
    }

    fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: &[Value],
        cx: &mut Cx<'_>,
    ) -> Result<Addr, RuntimeError> {
        match builtin {
            Builtin::Println => {
                let line = format_line(args, &cx.machine.ast);
                cx.host.call_native(RAW_DISPLAY, &line)?;
                Ok(cx.machine.heap.constants().nil)
            }
            Builtin::Make => {
                match args.len() {
                    0 => self.check_arity("make", 0, 1)?,
                    1 | 2 => {}
                    n => self.check_arity("make", n, 2)?,
                }
                let ty = type_argument(&args[0], "make", cx)?;
                let TypeExpr::Channel { .. } = ty else {
                    return Err(RuntimeError::invalid(format!(
                        "invalid argument: cannot make {}; type must be a channel",
                        ty
                    )));
                };
                let capacity = match args.get(1) {
                    None => 0,
                    Some(Value::Number(n)) if is_integral(*n) && (0.0..=MAX_CHANNEL_CAPACITY).contains(n) => *n as u8,
                    Some(Value::Number(n)) if is_integral(*n) => {
                        return Err(RuntimeError::invalid(format!(
                            "invalid argument: buffer size {} out of range [0, {}]",
                            n, MAX_CHANNEL_CAPACITY
                        )));
                    }
                    Some(other) => {
                        return Err(RuntimeError::invalid(format!(
                            "invalid argument: buffer size must be an integer, not {}",
                            other.type_name()
                        )));
                    }
                };
                self.alloc(cx, Record::Make(MakeRequest::Channel { capacity }))
            }
            Builtin::New => {
                self.check_arity("new", args.len(), 1)?;
                let request = match type_argument(&args[0], "new", cx)? {
                    TypeExpr::WaitGroup => MakeRequest::WaitGroup,
                    TypeExpr::Mutex => MakeRequest::Mutex,
                    ty => {
                        return Err(RuntimeError::invalid(format!("invalid argument: cannot use new with {}", ty)));
                    }
                };
                self.alloc(cx, Record::Make(request))
            }
        }
    }

    fn call_method(&mut self, recv: Addr, method: Method, args: &[Value], cx: &mut Cx<'_>) -> Result<Flow, RuntimeError> {
        let heap = &mut cx.machine.heap;
        match method {
            Method::Add => {
                let delta = match args.first() {
                    Some(Value::Number(n)) if is_integral(*n) && n.abs() <= i32::MAX as f64 => *n as i32,
                    Some(other) => {
                        return Err(RuntimeError::invalid(format!(
                            "cannot use value of type {} as int in argument to Add",
                            other.type_name()
                        )));
                    }
                    None => return Err(RuntimeError::Internal("Add without argument".to_string())),
                };
                WaitGroup(recv).add(heap, delta)?;
            }
            Method::Done => WaitGroup(recv).done(heap)?,
            Method::Wait if !WaitGroup(recv).is_released(heap) => return Ok(Flow::Block),
            Method::Wait => {}
            Method::Lock if !Mutex(recv).try_lock(heap) => return Ok(Flow::Block),
            Method::Lock => {}
            Method::Unlock => Mutex(recv).unlock(heap)?,
        }
        Ok(Flow::Continue)
    }
}

/// Source text of the callee of call node `node`, as used in messages.
fn callee_name(node: AstId, cx: &Cx<'_>) -> Result<String, RuntimeError> {
    let call = cx.machine.ast.get(node)?;
    match &call.kind {
        NodeKind::CallExpression { callee, .. } => Ok(callee.describe()),
        _ => Err(unexpected(node, "call")),
    }
}

/// The type named by the first argument of `make` or `new`.
fn type_argument(arg: &Value, builtin: &str, cx: &Cx<'_>) -> Result<TypeExpr, RuntimeError> {
    let found = match arg {
        Value::Node(id) => cx.machine.ast.type_of(*id),
        _ => None,
    };
    found.ok_or_else(|| RuntimeError::invalid(format!("invalid argument: first argument to {} must be a type", builtin)))
}
