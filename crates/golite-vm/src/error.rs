//! Runtime errors and diagnostics.

use std::fmt;

use golite_ast::Location;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A record whose tag byte decodes to nothing the evaluator knows.
    #[error("internal error: unknown instruction tag {0}")]
    UnknownInstruction(u8),

    #[error("{0}")]
    InvalidOperation(String),

    #[error("undefined: {0}")]
    UndefinedIdentifier(String),

    #[error("{0} redeclared in this block")]
    Redeclaration(String),

    #[error("assignment mismatch: {} but {}", count(.variables, "variable"), count(.values, "value"))]
    AssignmentArityMismatch { variables: usize, values: usize },

    #[error("{} arguments in call to {callee}: have {received}, want {expected}", arity_word(.received, .expected))]
    FunctionArityMismatch { caller: String, callee: String, received: usize, expected: usize },

    #[error("expression in go must be function call")]
    GoStatementNonCall,

    #[error("fatal error: all goroutines are asleep - deadlock!")]
    Deadlock,

    #[error("fatal error: out of memory allocating {requested} words")]
    OutOfMemory { requested: usize },

    #[error("runtime: goroutine stack exceeds {limit} control items")]
    StackOverflow { limit: usize },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn count(n: &usize, noun: &str) -> String {
    if *n == 1 { format!("1 {}", noun) } else { format!("{} {}s", n, noun) }
}

fn arity_word(received: &usize, expected: &usize) -> &'static str {
    if received < expected { "not enough" } else { "too many" }
}

impl RuntimeError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        RuntimeError::InvalidOperation(msg.into())
    }

    /// Errors that stop the whole run rather than one goroutine.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RuntimeError::OutOfMemory { .. }
                | RuntimeError::Deadlock
                | RuntimeError::UnknownInstruction(_)
        )
    }
}

/// An error as reported to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub error: RuntimeError,
    /// Goroutine that raised the error, if any.
    pub routine: Option<i16>,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn new(error: RuntimeError) -> Self {
        Self { error, routine: None, location: None }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = self.routine {
            write!(f, "[goroutine {}] ", id)?;
        }
        if let Some(loc) = self.location {
            write!(f, "{}: ", loc)?;
        }
        write!(f, "{}", self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_messages() {
        let e = RuntimeError::AssignmentArityMismatch { variables: 2, values: 1 };
        assert_eq!(e.to_string(), "assignment mismatch: 2 variables but 1 value");
        let e = RuntimeError::FunctionArityMismatch {
            caller: "main".to_string(),
            callee: "add".to_string(),
            received: 1,
            expected: 2,
        };
        assert_eq!(e.to_string(), "not enough arguments in call to add: have 1, want 2");
    }

    #[test]
    fn test_fatal_classes() {
        assert!(RuntimeError::Deadlock.is_fatal());
        assert!(RuntimeError::OutOfMemory { requested: 2 }.is_fatal());
        assert!(!RuntimeError::StackOverflow { limit: 10 }.is_fatal());
        assert!(!RuntimeError::UndefinedIdentifier("x".into()).is_fatal());
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic {
            error: RuntimeError::UndefinedIdentifier("y".into()),
            routine: Some(2),
            location: Some(Location { line: 3, column: 9 }),
        };
        assert_eq!(d.to_string(), "[goroutine 2] 3:9: undefined: y");
    }
}
