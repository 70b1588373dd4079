//! Execution engine for golite, a small Go-like teaching language.
//!
//! A program is a syntax tree (see `golite-ast`). The engine evaluates it with
//! an explicit control stack and value stash per goroutine, keeps every
//! intermediate value in a fixed-size word heap managed by a buddy allocator
//! and a mark-sweep collector, and interleaves goroutines with a cooperative
//! round-robin scheduler that detects deadlock.
//!
//! ```ignore
//! let mut host = HostContext::capturing();
//! evaluate(&program, 4096, &mut host);
//! assert!(host.errors.is_empty());
//! ```

pub mod ast_map;
pub mod builtins;
pub mod config;
pub mod env;
pub mod error;
pub mod goroutine;
pub mod heap;
pub mod host;
pub mod machine;
pub mod objects;
pub mod ops;
pub mod scheduler;
pub mod value;

pub use config::{EngineConfig, GcConfig, DEFAULT_HEAP_WORDS};
pub use error::{Diagnostic, RuntimeError};
pub use goroutine::{GoRoutine, GoRoutineState};
pub use host::HostContext;
pub use machine::Machine;
pub use scheduler::{RunOutcome, Scheduler};
pub use value::{Addr, Value};

use golite_ast::NodeRef;
use tracing::{info, info_span};

/// What [`evaluate`] returns however the run ends.
pub const PROGRAM_EXITED: &str = "Program exited";

/// Run `program` on a heap of `heap_words` words. Output and errors go to
/// `host`.
pub fn evaluate(program: &NodeRef, heap_words: usize, host: &mut HostContext) -> &'static str {
    evaluate_with(program, &EngineConfig::with_heap_words(heap_words), host)
}

pub fn evaluate_with(program: &NodeRef, config: &EngineConfig, host: &mut HostContext) -> &'static str {
    run_program(program, config, host);
    PROGRAM_EXITED
}

/// Like [`evaluate_with`], also saying how the run ended.
pub fn run_program(program: &NodeRef, config: &EngineConfig, host: &mut HostContext) -> RunOutcome {
    let span = info_span!("run", heap_words = config.heap_words, seed = ?config.seed);
    let _enter = span.enter();

    let setup = Machine::new(program.clone(), config.clone())
        .and_then(|mut machine| machine.main_routine().map(|main| (machine, main)));
    let (mut machine, main) = match setup {
        Ok(ready) => ready,
        Err(error) => {
            host.report(Diagnostic::new(error));
            return RunOutcome::Fatal;
        }
    };
    let mut scheduler = Scheduler::new(config);
    scheduler.spawn(main);
    let outcome = scheduler.run(&mut machine, host);
    info!(
        ?outcome,
        errors = host.errors.len(),
        allocations = machine.heap.stats().allocations,
        collections = machine.heap.stats().collections,
        "run finished"
    );
    outcome
}
