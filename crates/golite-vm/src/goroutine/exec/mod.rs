//! Control-item handlers.
//!
//! - `node`: expansion of syntax-tree nodes
//! - `instr`: declarations, operators, branches and unwinding
//! - `call`: calls and goroutine spawn
//! - `chan`: channel send and receive

mod call;
mod chan;
mod instr;
mod node;

use golite_ast::AstId;

use crate::error::RuntimeError;

/// A control item referred to a node of the wrong kind.
fn unexpected(id: AstId, expected: &str) -> RuntimeError {
    RuntimeError::Internal(format!("syntax node {} is not a {}", id, expected))
}
