//! State shared by every goroutine of a run.

use golite_ast::{NodeRef, TypeExpr};
use tracing::debug;

use crate::ast_map::AstMap;
use crate::builtins::Builtin;
use crate::config::EngineConfig;
use crate::env::{Environment, FrameArena, FrameId};
use crate::error::RuntimeError;
use crate::goroutine::GoRoutine;
use crate::heap::{CollectStats, Heap, Marker, Roots};
use crate::value::{Addr, Record, Value};

/// Heap, frames and syntax tree of one run, plus goroutines spawned since
/// the scheduler last looked.
pub struct Machine {
    pub heap: Heap,
    pub frames: FrameArena,
    pub ast: AstMap,
    pub config: EngineConfig,
    spawned: Vec<GoRoutine>,
    next_routine_id: i32,
    universe: FrameId,
    package: FrameId,
}

/// Addresses held outside any goroutine while a batch is allocated.
impl Roots for Vec<Addr> {
    fn trace(&self, marker: &mut Marker) {
        for &addr in self {
            marker.mark(addr);
        }
    }
}

impl Machine {
    pub fn new(program: NodeRef, config: EngineConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let ast = AstMap::new(program)?;
        let heap = Heap::new(config.heap_words, config.gc.coalesce)?;
        let mut frames = FrameArena::new();
        let universe = frames.root();
        let package = frames.child(universe, Vec::new());
        let mut machine = Self {
            heap,
            frames,
            ast,
            config,
            spawned: Vec::new(),
            next_routine_id: 0,
            universe,
            package,
        };
        machine.install_universe()?;
        Ok(machine)
    }

    fn install_universe(&mut self) -> Result<(), RuntimeError> {
        let universe = Environment::new(self.universe);
        let consts = self.heap.constants().clone();
        universe.declare(&mut self.frames, "true", consts.true_)?;
        universe.declare(&mut self.frames, "false", consts.false_)?;
        for builtin in Builtin::ALL {
            universe.declare(&mut self.frames, builtin.name(), consts.builtin(builtin))?;
        }
        for (name, ty) in [("sync.WaitGroup", TypeExpr::WaitGroup), ("sync.Mutex", TypeExpr::Mutex)] {
            let node = self.ast.type_literal(ty);
            let addr = self.alloc(Value::Node(node.id).into(), &[])?;
            universe.declare(&mut self.frames, name, addr)?;
        }
        Ok(())
    }

    /// The goroutine that runs the program and then calls `main()`.
    pub fn main_routine(&mut self) -> Result<GoRoutine, RuntimeError> {
        let main_call = self.ast.main_call();
        let program = self.ast.root().id;
        let control = self.alloc_many(
            vec![Value::Node(main_call.id).into(), Value::Node(program).into()],
            &[],
        )?;
        let id = self.next_routine_id()?;
        Ok(GoRoutine::new(id, true, Environment::new(self.package), control))
    }

    pub fn next_routine_id(&mut self) -> Result<i16, RuntimeError> {
        let id = i16::try_from(self.next_routine_id)
            .map_err(|_| RuntimeError::Internal("goroutine ids exhausted".to_string()))?;
        self.next_routine_id += 1;
        Ok(id)
    }

    pub fn spawn(&mut self, routine: GoRoutine) {
        self.spawned.push(routine);
    }

    pub fn take_spawned(&mut self) -> Vec<GoRoutine> {
        std::mem::take(&mut self.spawned)
    }

    /// Allocate `record`, collecting once if the heap is full. `roots` are
    /// the goroutines and addresses the caller still needs; goroutines waiting
    /// in `spawned` are always kept.
    pub fn alloc(&mut self, record: Record, roots: &[&dyn Roots]) -> Result<Addr, RuntimeError> {
        if let Some(addr) = self.heap.try_alloc(&record)? {
            return Ok(addr);
        }
        self.collect(roots)?;
        self.heap
            .try_alloc(&record)?
            .ok_or(RuntimeError::OutOfMemory { requested: Heap::words_for(&record) })
    }

    /// Allocate several records; earlier results stay rooted while later ones
    /// are placed.
    pub fn alloc_many(&mut self, records: Vec<Record>, roots: &[&dyn Roots]) -> Result<Vec<Addr>, RuntimeError> {
        let mut done: Vec<Addr> = Vec::with_capacity(records.len());
        for record in records {
            let mut all: Vec<&dyn Roots> = roots.to_vec();
            let held = done.clone();
            all.push(&held);
            let addr = self.alloc(record, &all)?;
            done.push(addr);
        }
        Ok(done)
    }

    pub fn collect(&mut self, roots: &[&dyn Roots]) -> Result<CollectStats, RuntimeError> {
        let mut marker = Marker::new();
        marker.mark_frame(self.universe);
        marker.mark_frame(self.package);
        for root in roots {
            root.trace(&mut marker);
        }
        for routine in &self.spawned {
            routine.trace(&mut marker);
        }
        let stats = self.heap.collect(marker, &mut self.frames, self.config.gc.conservative_frames)?;
        debug!(
            live = stats.live,
            freed = stats.freed,
            frames_dropped = stats.frames_dropped,
            free_words = self.heap.free_words(),
            "garbage collection"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use golite_ast::AstBuilder;
    use pretty_assertions::assert_eq;

    fn machine(words: usize) -> Machine {
        let mut b = AstBuilder::new();
        let main = b.func_decl("main", &[], vec![]);
        let file = b.source_file(vec![main]);
        Machine::new(file, EngineConfig::with_heap_words(words)).unwrap()
    }

    #[test]
    fn test_universe_bindings() {
        let m = machine(256);
        let env = Environment::new(m.package);
        assert_eq!(env.lookup(&m.frames, "true"), Some(m.heap.constants().true_));
        assert_eq!(
            env.lookup(&m.frames, "make"),
            Some(m.heap.constants().builtin(Builtin::Make))
        );
        let wg = env.lookup(&m.frames, "sync.WaitGroup").unwrap();
        let Value::Node(id) = m.heap.value(wg).unwrap() else {
            panic!("expected a type literal");
        };
        assert_eq!(m.ast.type_of(id), Some(TypeExpr::WaitGroup));
    }

    #[test]
    fn test_alloc_collects_then_reports_oom() {
        let mut m = machine(64);
        let mut kept = Vec::new();
        let err = loop {
            let roots: Vec<&dyn Roots> = vec![&kept];
            match m.alloc(Value::Number(1.0).into(), &roots) {
                Ok(addr) => kept.push(addr),
                Err(e) => break e,
            }
        };
        assert_eq!(err, RuntimeError::OutOfMemory { requested: 2 });
        assert!(m.heap.stats().collections >= 1);
    }

    #[test]
    fn test_garbage_is_reclaimed_without_growth() {
        let mut m = machine(64);
        for i in 0..200 {
            m.alloc(Value::Number(i as f64).into(), &[]).unwrap();
        }
        assert!(m.heap.stats().collections > 0);
        assert_eq!(m.heap.total_words(), 64);
    }

    #[test]
    fn test_routine_ids_are_sequential() {
        let mut m = machine(64);
        let main = m.main_routine().unwrap();
        assert_eq!(main.id(), 0);
        assert_eq!(m.next_routine_id().unwrap(), 1);
    }
}
