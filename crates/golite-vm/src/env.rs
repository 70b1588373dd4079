//! Lexical environments.
//!
//! Frames live in one [`FrameArena`] owned by the machine and are addressed by
//! [`FrameId`]. An [`Environment`] is only a cursor into that arena, so copying
//! it shares every frame while each goroutine moves its own cursor.

use hashbrown::HashMap;

use crate::error::RuntimeError;
use crate::value::Addr;

pub type FrameId = u64;

#[derive(Debug, Default)]
pub struct Frame {
    pub(crate) bindings: HashMap<String, Addr>,
    pub(crate) parent: Option<FrameId>,
}

#[derive(Debug, Default)]
pub struct FrameArena {
    frames: HashMap<FrameId, Frame>,
    next_id: FrameId,
}

impl FrameArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, frame: Frame) -> FrameId {
        let id = self.next_id;
        self.next_id += 1;
        self.frames.insert(id, frame);
        id
    }

    /// New frame without a parent.
    pub fn root(&mut self) -> FrameId {
        self.insert(Frame::default())
    }

    pub fn child(&mut self, parent: FrameId, bindings: Vec<(String, Addr)>) -> FrameId {
        self.insert(Frame { bindings: bindings.into_iter().collect(), parent: Some(parent) })
    }

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(&id)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn ids(&self) -> Vec<FrameId> {
        self.frames.keys().copied().collect()
    }

    /// Keep only frames matching `keep`; returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(FrameId) -> bool) -> usize {
        let before = self.frames.len();
        self.frames.retain(|&id, _| keep(id));
        before - self.frames.len()
    }

    /// Frame ids from `start` up to the root.
    fn chain(&self, start: FrameId) -> impl Iterator<Item = FrameId> + '_ {
        std::iter::successors(Some(start), move |id| self.frames.get(id).and_then(|f| f.parent))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    cursor: FrameId,
}

impl Environment {
    pub fn new(cursor: FrameId) -> Self {
        Self { cursor }
    }

    #[inline]
    pub fn cursor(&self) -> FrameId {
        self.cursor
    }

    #[inline]
    pub fn set_cursor(&mut self, frame: FrameId) {
        self.cursor = frame;
    }

    /// Bind `name` in the current frame.
    pub fn declare(&self, arena: &mut FrameArena, name: &str, value: Addr) -> Result<(), RuntimeError> {
        let frame = arena
            .frames
            .get_mut(&self.cursor)
            .ok_or_else(|| RuntimeError::Internal(format!("frame {} was collected", self.cursor)))?;
        if frame.bindings.contains_key(name) {
            return Err(RuntimeError::Redeclaration(name.to_string()));
        }
        frame.bindings.insert(name.to_string(), value);
        Ok(())
    }

    /// Bind `name` to the zero value of its declared type.
    pub fn declare_zero_value(
        &self,
        arena: &mut FrameArena,
        name: &str,
        zero: Addr,
    ) -> Result<(), RuntimeError> {
        self.declare(arena, name, zero)
    }

    /// Rebind `name` in the nearest frame that has it. Returns false when no
    /// frame in the chain binds it.
    pub fn assign(&self, arena: &mut FrameArena, name: &str, value: Addr) -> bool {
        let Some(id) = arena.chain(self.cursor).find(|id| {
            arena.frames.get(id).is_some_and(|f| f.bindings.contains_key(name))
        }) else {
            return false;
        };
        match arena.frames.get_mut(&id).and_then(|f| f.bindings.get_mut(name)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, arena: &FrameArena, name: &str) -> Option<Addr> {
        arena
            .chain(self.cursor)
            .find_map(|id| arena.frames.get(&id).and_then(|f| f.bindings.get(name).copied()))
    }

    /// Create a child of the current frame holding `bindings` and move the
    /// cursor into it.
    pub fn extend(&mut self, arena: &mut FrameArena, bindings: Vec<(String, Addr)>) -> FrameId {
        self.cursor = arena.child(self.cursor, bindings);
        self.cursor
    }

    /// Independent cursor over the same frames.
    pub fn copy(&self) -> Environment {
        *self
    }
}
