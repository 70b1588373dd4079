//! Predeclared functions, sync methods and value formatting.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ast_map::AstMap;
use crate::value::{is_integral, Value};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum Builtin {
    Println = 0,
    Make = 1,
    New = 2,
}

impl Builtin {
    pub const ALL: [Builtin; 3] = [Builtin::Println, Builtin::Make, Builtin::New];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Println => "println",
            Builtin::Make => "make",
            Builtin::New => "new",
        }
    }
}

/// Methods of `sync.WaitGroup` and `sync.Mutex`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum Method {
    Add = 0,
    Done = 1,
    Wait = 2,
    Lock = 3,
    Unlock = 4,
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::Add => "Add",
            Method::Done => "Done",
            Method::Wait => "Wait",
            Method::Lock => "Lock",
            Method::Unlock => "Unlock",
        }
    }

    /// Method `name` on `receiver`, if the receiver's type has it.
    pub fn lookup(receiver: &Value, name: &str) -> Option<Method> {
        let method = match name {
            "Add" => Method::Add,
            "Done" => Method::Done,
            "Wait" => Method::Wait,
            "Lock" => Method::Lock,
            "Unlock" => Method::Unlock,
            _ => return None,
        };
        match (receiver, method) {
            (Value::WaitGroup(_), Method::Add | Method::Done | Method::Wait) => Some(method),
            (Value::Mutex(_), Method::Lock | Method::Unlock) => Some(method),
            _ => None,
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Method::Add => 1,
            _ => 0,
        }
    }
}

/// Text `println` shows for a value.
pub fn format_value(value: &Value, ast: &AstMap) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::Nil => "nil".to_string(),
        Value::Node(id) => match (ast.string_literal(*id), ast.type_of(*id)) {
            (Some(s), _) => s,
            (None, Some(ty)) => ty.to_string(),
            (None, None) => format!("<node {}>", id),
        },
        Value::Closure { .. } | Value::Builtin(_) | Value::Method { .. } => "func".to_string(),
        Value::Channel(addr) | Value::Mutex(addr) | Value::WaitGroup(addr) => addr.to_string(),
    }
}

/// 2^53. Integral values below it convert to `i64` exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

pub fn format_number(n: f64) -> String {
    if is_integral(n) && n.abs() < MAX_EXACT_INTEGER {
        format!("{}", n as i64)
    } else if is_integral(n) {
        format!("{:.0}", n)
    } else if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "+Inf".to_string() } else { "-Inf".to_string() }
    } else {
        format!("{}", n)
    }
}

/// One `println` line.
pub fn format_line(values: &[Value], ast: &AstMap) -> String {
    values.iter().map(|v| format_value(v, ast)).collect::<Vec<_>>().join(" ")
}
