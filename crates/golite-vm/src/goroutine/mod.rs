//! Goroutines: one control stack, one stash and an environment cursor each.
//!
//! [`GoRoutine::tick`] pops one control item and runs it. Syntax-tree nodes
//! expand into further control items; instructions consume operands from the
//! stash and push results back. A handler that cannot finish yet (channel
//! not ready, lock held, wait group busy) returns [`Flow::Block`] and the same
//! item is put back as [`Step::Awaiting`] for the next attempt.

mod exec;

use golite_ast::Location;
use tracing::trace;

use crate::env::Environment;
use crate::error::RuntimeError;
use crate::heap::{Marker, Roots};
use crate::host::HostContext;
use crate::machine::Machine;
use crate::value::{Addr, Item, Record, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoRoutineState {
    Running,
    Blocked,
    Exited,
}

/// A control-stack entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ready(Addr),
    /// Put back after its handler blocked; retried as-is.
    Awaiting(Addr),
}

impl Step {
    #[inline]
    pub fn addr(self) -> Addr {
        match self {
            Step::Ready(a) | Step::Awaiting(a) => a,
        }
    }
}

/// Outcome of a single handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Block,
}

/// What a tick may touch besides the goroutine itself.
pub struct Cx<'a> {
    pub machine: &'a mut Machine,
    /// Every other goroutine the scheduler holds, for collections.
    pub peers: &'a dyn Roots,
    pub host: &'a mut HostContext,
}

#[derive(Debug)]
pub struct GoRoutine {
    id: i16,
    is_main: bool,
    control: Vec<Step>,
    stash: Vec<Addr>,
    env: Environment,
    state: GoRoutineState,
    /// Item executed by the previous tick.
    last_step: Option<Addr>,
    progressed: bool,
    /// Item being executed, rooted for the duration of its handler.
    current: Option<Addr>,
    /// Names of the functions with an open call, innermost last.
    callers: Vec<String>,
    location: Option<Location>,
}

impl GoRoutine {
    /// New goroutine whose control stack holds `control`, last element on top.
    pub fn new(id: i16, is_main: bool, env: Environment, control: Vec<Addr>) -> Self {
        Self {
            id,
            is_main,
            control: control.into_iter().map(Step::Ready).collect(),
            stash: Vec::new(),
            env,
            state: GoRoutineState::Running,
            last_step: None,
            progressed: true,
            current: None,
            callers: Vec::new(),
            location: None,
        }
    }

    #[inline]
    pub fn id(&self) -> i16 {
        self.id
    }

    #[inline]
    pub fn is_main(&self) -> bool {
        self.is_main
    }

    #[inline]
    pub fn state(&self) -> GoRoutineState {
        self.state
    }

    /// Whether the last tick ran a different item than the one before it.
    #[inline]
    pub fn progressed(&self) -> bool {
        self.progressed
    }

    /// Source location of the last node this goroutine evaluated.
    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn control_depth(&self) -> usize {
        self.control.len()
    }

    pub fn stash(&self) -> &[Addr] {
        &self.stash
    }

    pub(crate) fn exit(&mut self) {
        self.state = GoRoutineState::Exited;
    }

    /// Run one control item.
    pub fn tick(&mut self, cx: &mut Cx<'_>) -> Result<GoRoutineState, RuntimeError> {
        let Some(step) = self.control.pop() else {
            self.state = GoRoutineState::Exited;
            return Ok(self.state);
        };
        let addr = step.addr();
        self.progressed = self.last_step != Some(addr);
        self.last_step = Some(addr);
        self.current = Some(addr);
        let flow = self.dispatch(addr, cx);
        self.current = None;

        if flow? == Flow::Block {
            trace!(routine = self.id, item = %addr, "blocked");
            self.control.push(Step::Awaiting(addr));
            self.state = GoRoutineState::Blocked;
            return Ok(self.state);
        }
        let limit = cx.machine.config.max_control_depth;
        if self.control.len() > limit {
            return Err(RuntimeError::StackOverflow { limit });
        }
        self.state = if self.control.is_empty() {
            GoRoutineState::Exited
        } else {
            GoRoutineState::Running
        };
        Ok(self.state)
    }

    fn dispatch(&mut self, addr: Addr, cx: &mut Cx<'_>) -> Result<Flow, RuntimeError> {
        match cx.machine.heap.resolve(addr)? {
            Item::Value(Value::Node(id)) => {
                let node = cx.machine.ast.get(id)?;
                self.eval_node(&node, addr, cx)
            }
            Item::Value(_) => {
                self.stash.push(addr);
                Ok(Flow::Continue)
            }
            Item::Instr(instr) => self.exec_instr(instr, cx),
        }
    }

    // =========================================================================
    // Helpers shared by the handlers
    // =========================================================================

    /// Allocate with this goroutine and its peers as roots.
    fn alloc(&self, cx: &mut Cx<'_>, record: impl Into<Record>) -> Result<Addr, RuntimeError> {
        cx.machine.alloc(record.into(), &[self as &dyn Roots, cx.peers])
    }

    #[inline]
    fn push(&mut self, addr: Addr) {
        self.control.push(Step::Ready(addr));
    }

    fn push_record(&mut self, cx: &mut Cx<'_>, record: impl Into<Record>) -> Result<(), RuntimeError> {
        let addr = self.alloc(cx, record)?;
        self.push(addr);
        Ok(())
    }

    fn push_node(&mut self, cx: &mut Cx<'_>, node: &golite_ast::Node) -> Result<(), RuntimeError> {
        self.push_record(cx, Value::Node(node.id))
    }

    /// Push nodes so that the first one runs first.
    fn push_nodes(&mut self, cx: &mut Cx<'_>, nodes: &[golite_ast::NodeRef]) -> Result<(), RuntimeError> {
        for node in nodes.iter().rev() {
            self.push_node(cx, node)?;
        }
        Ok(())
    }

    /// Allocate a value and put it on the stash.
    fn push_value(&mut self, cx: &mut Cx<'_>, value: Value) -> Result<(), RuntimeError> {
        let addr = self.alloc(cx, value)?;
        self.stash.push(addr);
        Ok(())
    }

    fn pop_stash(&mut self) -> Result<Addr, RuntimeError> {
        self.stash.pop().ok_or_else(|| RuntimeError::Internal("stash underflow".to_string()))
    }

    /// Index of the first of the top `n` stash entries.
    fn stash_base(&self, n: usize) -> Result<usize, RuntimeError> {
        self.stash
            .len()
            .checked_sub(n)
            .ok_or_else(|| RuntimeError::Internal("stash underflow".to_string()))
    }

    fn caller_name(&self) -> String {
        match self.callers.last() {
            Some(name) => name.clone(),
            None if self.is_main => "main".to_string(),
            None => format!("goroutine {}", self.id),
        }
    }
}

impl Roots for GoRoutine {
    fn trace(&self, marker: &mut Marker) {
        for step in &self.control {
            marker.mark(step.addr());
        }
        for &addr in &self.stash {
            marker.mark(addr);
        }
        if let Some(addr) = self.current {
            marker.mark(addr);
        }
        marker.mark_frame(self.env.cursor());
    }
}
