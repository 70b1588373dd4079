//! Result tags for script parsing.
//!
//! The last line the runner prints tells test scripts how the run ended.

use golite_vm::{Diagnostic, RunOutcome};

/// Run finished with no diagnostics.
pub const TAG_OK: &str = "[GOLITE:OK]";

/// Prefix of the tag for a run that reported diagnostics.
pub const TAG_ERROR_PREFIX: &str = "[GOLITE:ERROR:";

pub fn format_error(msg: &str) -> String {
    format!("{}{}]", TAG_ERROR_PREFIX, msg)
}

/// Closing tag for a finished run.
pub fn result_tag(outcome: RunOutcome, errors: &[Diagnostic]) -> String {
    match (outcome, errors.is_empty()) {
        (RunOutcome::MainExited, true) => TAG_OK.to_string(),
        (RunOutcome::Deadlock, _) => format_error("deadlock"),
        (RunOutcome::Fatal, _) => format_error("fatal"),
        (RunOutcome::MainExited, false) => format_error(&format!("{} error(s)", errors.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use golite_vm::RuntimeError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_result_tags() {
        assert_eq!(result_tag(RunOutcome::MainExited, &[]), "[GOLITE:OK]");
        assert_eq!(result_tag(RunOutcome::Deadlock, &[]), "[GOLITE:ERROR:deadlock]");
        let errors = vec![Diagnostic::new(RuntimeError::GoStatementNonCall)];
        assert_eq!(result_tag(RunOutcome::MainExited, &errors), "[GOLITE:ERROR:1 error(s)]");
    }
}
