//! Round-robin cooperative scheduler.
//!
//! Each turn takes the goroutine at the head of the queue and ticks it until
//! its quantum runs out or it stops running. Quanta are drawn uniformly from
//! the configured range. A turn in which no tick ran a new control item counts
//! as stalled; once as many consecutive turns have stalled as there are
//! goroutines queued, every goroutine is waiting on another and the run stops
//! with a deadlock.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::error::{Diagnostic, RuntimeError};
use crate::goroutine::{Cx, GoRoutine, GoRoutineState};
use crate::heap::{Marker, Roots};
use crate::host::HostContext;
use crate::machine::Machine;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The main goroutine finished, normally or with an error.
    MainExited,
    Deadlock,
    /// Out of memory or an interpreter fault.
    Fatal,
}

#[derive(Debug)]
pub struct Scheduled {
    pub routine: GoRoutine,
    pub quantum: u32,
}

/// Goroutines waiting for a turn.
#[derive(Debug, Default)]
pub struct RunQueue(VecDeque<Scheduled>);

impl RunQueue {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Roots for RunQueue {
    fn trace(&self, marker: &mut Marker) {
        for scheduled in &self.0 {
            scheduled.routine.trace(marker);
        }
    }
}

pub struct Scheduler {
    queue: RunQueue,
    rng: fastrand::Rng,
    /// Consecutive turns without progress.
    stalled: usize,
    min_quantum: u32,
    max_quantum: u32,
}

impl Scheduler {
    pub fn new(config: &EngineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self {
            queue: RunQueue::default(),
            rng,
            stalled: 0,
            min_quantum: config.min_quantum,
            max_quantum: config.max_quantum,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Enqueue `routine` at the tail with a fresh quantum.
    pub fn spawn(&mut self, routine: GoRoutine) {
        let quantum = self.rng.u32(self.min_quantum..=self.max_quantum);
        self.queue.0.push_back(Scheduled { routine, quantum });
    }

    /// Run until the main goroutine exits, a deadlock is found or an error
    /// stops the whole run. Errors go to `host`.
    pub fn run(&mut self, machine: &mut Machine, host: &mut HostContext) -> RunOutcome {
        while let Some(Scheduled { mut routine, quantum }) = self.queue.0.pop_front() {
            let mut progressed = false;
            let mut failure = None;
            for _ in 0..quantum {
                let mut cx = Cx { machine: &mut *machine, peers: &self.queue, host: &mut *host };
                match routine.tick(&mut cx) {
                    Ok(state) => {
                        progressed |= routine.progressed();
                        if state != GoRoutineState::Running {
                            break;
                        }
                    }
                    Err(error) => {
                        failure = Some(error);
                        break;
                    }
                }
            }
            trace!(
                routine = routine.id(),
                state = ?routine.state(),
                progressed,
                depth = routine.control_depth(),
                "turn"
            );
            for spawned in machine.take_spawned() {
                self.spawn(spawned);
                progressed = true;
            }

            if let Some(error) = failure {
                let fatal = error.is_fatal();
                self.report(host, &routine, error);
                routine.exit();
                if fatal {
                    return RunOutcome::Fatal;
                }
                progressed = true;
            }

            match routine.state() {
                GoRoutineState::Exited if routine.is_main() => {
                    debug!(abandoned = self.queue.len(), "main goroutine exited");
                    return RunOutcome::MainExited;
                }
                GoRoutineState::Exited => {
                    debug!(routine = routine.id(), "goroutine exited");
                    progressed = true;
                }
                _ => self.spawn(routine),
            }

            if progressed {
                self.stalled = 0;
            } else {
                self.stalled += 1;
                if self.stalled >= self.queue.len() {
                    warn!(goroutines = self.queue.len(), "deadlock");
                    host.report(Diagnostic::new(RuntimeError::Deadlock));
                    return RunOutcome::Deadlock;
                }
            }
        }
        // Only reachable when nothing was ever spawned.
        RunOutcome::MainExited
    }

    fn report(&self, host: &mut HostContext, routine: &GoRoutine, error: RuntimeError) {
        if error.is_fatal() {
            warn!(routine = routine.id(), %error, "fatal error");
        } else {
            debug!(routine = routine.id(), %error, "goroutine failed");
        }
        host.report(Diagnostic {
            error,
            routine: Some(routine.id()),
            location: routine.location(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use golite_ast::{AstBuilder, NodeRef};
    use pretty_assertions::assert_eq;

    fn setup(program: NodeRef, seed: u64) -> (Machine, Scheduler) {
        let config = EngineConfig { seed: Some(seed), ..EngineConfig::default() };
        let mut machine = Machine::new(program, config.clone()).unwrap();
        let mut scheduler = Scheduler::new(&config);
        scheduler.spawn(machine.main_routine().unwrap());
        (machine, scheduler)
    }

    #[test]
    fn test_quantum_within_bounds() {
        let mut b = AstBuilder::new();
        let main = b.func_decl("main", &[], vec![]);
        let (mut machine, mut scheduler) = setup(b.source_file(vec![main]), 7);
        for _ in 0..50 {
            scheduler.spawn(machine.main_routine().unwrap());
        }
        for s in &scheduler.queue.0 {
            assert!((5..=20).contains(&s.quantum), "quantum {}", s.quantum);
        }
    }

    #[test]
    fn test_empty_main_exits() {
        let mut b = AstBuilder::new();
        let main = b.func_decl("main", &[], vec![]);
        let (mut machine, mut scheduler) = setup(b.source_file(vec![main]), 1);
        let mut host = HostContext::capturing();
        assert_eq!(scheduler.run(&mut machine, &mut host), RunOutcome::MainExited);
        assert!(host.errors.is_empty());
    }

    #[test]
    fn test_lone_receiver_deadlocks() {
        let mut b = AstBuilder::new();
        let chan_ty = b.chan_type();
        let make = b.call_named("make", vec![chan_ty]);
        let decl = b.define("ch", make);
        let ch = b.ident("ch");
        let recv = b.recv(ch);
        let stmt = b.expr_stmt(recv);
        let main = b.func_decl("main", &[], vec![decl, stmt]);
        let (mut machine, mut scheduler) = setup(b.source_file(vec![main]), 3);
        let mut host = HostContext::capturing();
        assert_eq!(scheduler.run(&mut machine, &mut host), RunOutcome::Deadlock);
        assert_eq!(host.errors.len(), 1);
        assert_eq!(host.errors[0].error, RuntimeError::Deadlock);
        assert_eq!(host.errors[0].routine, None);
    }

    #[test]
    fn test_failed_goroutine_does_not_stop_main() {
        let mut b = AstBuilder::new();
        let bad = b.println(vec![]);
        let undefined = b.ident("nope");
        let use_it = b.expr_stmt(undefined);
        let lit = b.func_lit(&[], vec![use_it]);
        let call = b.call(lit, vec![]);
        let go = b.go(call);
        // Yield long enough for the goroutine to run.
        let zero = b.number(0.0);
        let init = b.define("i", zero);
        let i = b.ident("i");
        let limit = b.number(100.0);
        let cond = b.binary(golite_ast::BinaryOperator::Lt, i, limit);
        let one = b.number(1.0);
        let post = b.op_assign("i", golite_ast::BinaryOperator::Add, one);
        let spin = b.for_loop(Some(init), Some(cond), Some(post), vec![]);
        let main = b.func_decl("main", &[], vec![go, spin, bad]);
        let (mut machine, mut scheduler) = setup(b.source_file(vec![main]), 11);
        let mut host = HostContext::capturing();
        assert_eq!(scheduler.run(&mut machine, &mut host), RunOutcome::MainExited);
        assert_eq!(host.output(), vec![String::new()]);
        assert_eq!(host.errors.len(), 1);
        assert_eq!(host.errors[0].error, RuntimeError::UndefinedIdentifier("nope".to_string()));
        assert_eq!(host.errors[0].routine, Some(1));
    }
}
