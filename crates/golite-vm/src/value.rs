//! Structured forms of heap records.
//!
//! The evaluator never touches record bytes directly: it hands a [`Record`]
//! to the heap and gets an [`Addr`] back, and resolves addresses into
//! [`Item`]s. The heap owns the byte encoding.

use std::fmt;

use golite_ast::{AstId, BinaryOperator, UnaryOperator};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::builtins::{Builtin, Method};
use crate::env::FrameId;
use crate::heap::layout::WORD;

/// Byte offset of a record in the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr(pub u32);

impl Addr {
    #[inline]
    pub fn from_word(word: usize) -> Self {
        Addr((word * WORD) as u32)
    }

    #[inline]
    pub fn word(self) -> usize {
        self.0 as usize / WORD
    }

    #[inline]
    pub fn offset(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Runtime values.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Number(f64),
    /// Result of a call that produced nothing.
    Nil,
    /// A syntax-tree node: a string literal or type literal when used as a
    /// value, a node to evaluate when found on the control stack.
    Node(AstId),
    Closure { func: AstId, frame: FrameId },
    Builtin(Builtin),
    /// Method bound to its receiver (`wg.Add`).
    Method { recv: Addr, method: Method },
    Channel(Addr),
    Mutex(Addr),
    WaitGroup(Addr),
}

impl Value {
    /// Type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Number(n) if is_integral(*n) => "int",
            Value::Number(_) => "float64",
            Value::Nil => "nil",
            Value::Node(_) => "untyped constant",
            Value::Closure { .. } | Value::Builtin(_) | Value::Method { .. } => "func",
            Value::Channel(_) => "chan",
            Value::Mutex(_) => "sync.Mutex",
            Value::WaitGroup(_) => "sync.WaitGroup",
        }
    }
}

#[inline]
pub fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum MarkerKind {
    Return = 0,
    LoopEnd = 1,
    Continue = 2,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum PopKind {
    UntilReturn = 0,
    UntilLoopEnd = 1,
    UntilContinue = 2,
    /// Discard one stash value.
    Stash = 3,
}

impl PopKind {
    pub fn target(self) -> Option<MarkerKind> {
        match self {
            PopKind::UntilReturn => Some(MarkerKind::Return),
            PopKind::UntilLoopEnd => Some(MarkerKind::LoopEnd),
            PopKind::UntilContinue => Some(MarkerKind::Continue),
            PopKind::Stash => None,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum BranchKind {
    If = 0,
    LoopTest = 1,
    LoopBody = 2,
    ShortCircuit = 3,
}

/// Evaluator instructions pushed on the control stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instr {
    VarDecl(AstId),
    Assign(AstId),
    Unary(UnaryOperator),
    Binary(BinaryOperator),
    Call { node: AstId, argc: u32 },
    Go { node: AstId, argc: u32 },
    EnvRestore(FrameId),
    Pop(PopKind),
    Marker(MarkerKind),
    Branch { node: AstId, kind: BranchKind },
    Send,
    Select(AstId),
}

/// Objects built by `make` and `new`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MakeRequest {
    /// Capacity 0 makes an unbuffered channel.
    Channel { capacity: u8 },
    Mutex,
    WaitGroup,
}

/// Anything that can be allocated.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Value(Value),
    Instr(Instr),
    Make(MakeRequest),
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Record::Value(value)
    }
}

impl From<Instr> for Record {
    fn from(instr: Instr) -> Self {
        Record::Instr(instr)
    }
}

/// What an address resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Value(Value),
    Instr(Instr),
}
