//! Stop-the-world mark and sweep.
//!
//! Marking starts from whatever the [`Roots`] implementors report and follows
//! references transitively through records and environment frames. Sweeping
//! walks the heap block by block: free blocks are skipped by their order,
//! allocated blocks by the size in their header.

use hashbrown::HashSet;

use super::buddy::order_for;
use super::{Heap, Tag};
use crate::env::{FrameArena, FrameId};
use crate::error::RuntimeError;
use crate::objects::channel::{BufferedChannel, UnbufferedChannel};
use crate::value::Addr;

/// Anything holding heap addresses or frame ids the collector must keep.
pub trait Roots {
    fn trace(&self, marker: &mut Marker);
}

impl<T: Roots + ?Sized> Roots for &T {
    fn trace(&self, marker: &mut Marker) {
        (**self).trace(marker)
    }
}

/// Mark state: the marked sets plus worklists of records and frames still to
/// be scanned.
#[derive(Debug, Default)]
pub struct Marker {
    pending: Vec<Addr>,
    pending_frames: Vec<FrameId>,
    marked: HashSet<Addr>,
    live_frames: HashSet<FrameId>,
}

impl Marker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn mark(&mut self, addr: Addr) {
        if self.marked.insert(addr) {
            self.pending.push(addr);
        }
    }

    #[inline]
    pub fn mark_frame(&mut self, frame: FrameId) {
        if self.live_frames.insert(frame) {
            self.pending_frames.push(frame);
        }
    }

    #[inline]
    pub fn is_marked(&self, addr: Addr) -> bool {
        self.marked.contains(&addr)
    }

    #[inline]
    pub fn is_frame_live(&self, frame: FrameId) -> bool {
        self.live_frames.contains(&frame)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub live: usize,
    pub freed: usize,
    pub frames_dropped: usize,
}

impl Heap {
    /// Free every block not reachable from `marker`'s roots. With
    /// `conservative_frames` every stored frame counts as a root and none is
    /// dropped; otherwise unreachable frames are removed from `frames`.
    pub fn collect(
        &mut self,
        mut marker: Marker,
        frames: &mut FrameArena,
        conservative_frames: bool,
    ) -> Result<CollectStats, RuntimeError> {
        if conservative_frames {
            for id in frames.ids() {
                marker.mark_frame(id);
            }
        }
        self.propagate(&mut marker, frames)?;
        let freed = self.sweep(&marker)?;
        let frames_dropped =
            if conservative_frames { 0 } else { frames.retain(|id| marker.is_frame_live(id)) };

        self.stats.collections += 1;
        self.stats.freed += freed as u64;
        Ok(CollectStats { live: marker.marked.len(), freed, frames_dropped })
    }

    fn propagate(&self, marker: &mut Marker, frames: &FrameArena) -> Result<(), RuntimeError> {
        loop {
            if let Some(addr) = marker.pending.pop() {
                self.trace_record(addr, marker)?;
            } else if let Some(id) = marker.pending_frames.pop() {
                if let Some(frame) = frames.get(id) {
                    for &addr in frame.bindings.values() {
                        marker.mark(addr);
                    }
                    if let Some(parent) = frame.parent {
                        marker.mark_frame(parent);
                    }
                }
            } else {
                return Ok(());
            }
        }
    }

    fn trace_record(&self, addr: Addr, marker: &mut Marker) -> Result<(), RuntimeError> {
        match self.header(addr)?.tag {
            Tag::Closure | Tag::EnvOp => marker.mark_frame(self.word(addr, 1)),
            Tag::MethodOp => marker.mark(Addr(self.word(addr, 1) as u32)),
            Tag::BufferedChannel => {
                for value in BufferedChannel(addr).queued(self) {
                    marker.mark(value);
                }
            }
            Tag::UnbufferedChannel => {
                if let Some(value) = UnbufferedChannel(addr).in_flight(self) {
                    marker.mark(value);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn sweep(&mut self, marker: &Marker) -> Result<usize, RuntimeError> {
        let total = self.buddy.total_words();
        let mut dead = Vec::new();
        let mut word = 0;
        while word < total {
            if let Some(order) = self.buddy.free_order_at(word) {
                word += 1 << order;
                continue;
            }
            let addr = Addr::from_word(word);
            let header = self.header(addr)?;
            let order = order_for(header.words());
            let permanent = header.tag == Tag::AstNode || self.pinned.contains(&addr);
            if !permanent && !marker.is_marked(addr) {
                dead.push((word, order));
            }
            word += 1 << order;
        }
        for &(start, order) in &dead {
            self.buddy.free(start, order);
        }
        Ok(dead.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Instr, MakeRequest, Record, Value};
    use pretty_assertions::assert_eq;

    struct Pinned(Vec<Addr>);

    impl Roots for Pinned {
        fn trace(&self, marker: &mut Marker) {
            for &a in &self.0 {
                marker.mark(a);
            }
        }
    }

    fn alloc(heap: &mut Heap, record: Record) -> Option<Addr> {
        heap.try_alloc(&record).unwrap()
    }

    fn collect(heap: &mut Heap, frames: &mut FrameArena, roots: &dyn Roots) -> CollectStats {
        let mut marker = Marker::new();
        roots.trace(&mut marker);
        heap.collect(marker, frames, false).unwrap()
    }

    #[test]
    fn test_unreachable_numbers_are_freed() {
        let mut heap = Heap::new(64, true).unwrap();
        let mut frames = FrameArena::new();
        let mut numbers = Vec::new();
        while let Some(a) = alloc(&mut heap, Value::Number(numbers.len() as f64).into()) {
            numbers.push(a);
        }
        assert!(numbers.len() > 10);
        let keep = numbers[3];

        let stats = collect(&mut heap, &mut frames, &Pinned(vec![keep]));
        assert_eq!(stats.freed, numbers.len() - 1);
        assert_eq!(heap.value(keep).unwrap(), Value::Number(3.0));

        let again = alloc(&mut heap, Value::Number(99.0).into());
        assert!(again.is_some());
        assert_eq!(heap.total_words(), 64);
        assert_eq!(heap.stats().collections, 1);
    }

    #[test]
    fn test_ast_blocks_and_constants_survive() {
        let mut heap = Heap::new(64, true).unwrap();
        let mut frames = FrameArena::new();
        let node = alloc(&mut heap, Value::Node(5).into()).unwrap();
        let stats = collect(&mut heap, &mut frames, &Pinned(vec![]));
        assert_eq!(stats.freed, 0);
        assert_eq!(heap.value(node).unwrap(), Value::Node(5));
        assert_eq!(heap.value(heap.constants().true_).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_closure_keeps_frame_chain() {
        let mut heap = Heap::new(128, true).unwrap();
        let mut frames = FrameArena::new();
        let root = frames.root();
        let bound = alloc(&mut heap, Value::Number(1.0).into()).unwrap();
        let outer = frames.child(root, vec![("x".to_string(), bound)]);
        let inner = frames.child(outer, vec![]);
        let orphan_value = alloc(&mut heap, Value::Number(2.0).into()).unwrap();
        let orphan = frames.child(root, vec![("y".to_string(), orphan_value)]);
        let closure = alloc(&mut heap, Value::Closure { func: 1, frame: inner }.into()).unwrap();

        let stats = collect(&mut heap, &mut frames, &Pinned(vec![closure]));
        assert_eq!(stats.freed, 1);
        assert_eq!(stats.frames_dropped, 1);
        assert!(frames.get(orphan).is_none());
        assert!(frames.get(root).is_some());
        assert_eq!(heap.value(bound).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_conservative_frames_keep_everything_bound() {
        let mut heap = Heap::new(128, true).unwrap();
        let mut frames = FrameArena::new();
        let root = frames.root();
        let v = alloc(&mut heap, Value::Number(2.0).into()).unwrap();
        let orphan = frames.child(root, vec![("y".to_string(), v)]);

        let stats = heap.collect(Marker::new(), &mut frames, true).unwrap();
        assert_eq!(stats.freed, 0);
        assert!(frames.get(orphan).is_some());
    }

    #[test]
    fn test_channels_keep_queued_values() {
        let mut heap = Heap::new(128, true).unwrap();
        let mut frames = FrameArena::new();
        let ch = alloc(&mut heap, Record::Make(MakeRequest::Channel { capacity: 2 })).unwrap();
        let queued = alloc(&mut heap, Value::Number(7.0).into()).unwrap();
        assert!(BufferedChannel(ch).try_send(&mut heap, queued));
        let garbage = alloc(&mut heap, Instr::Call { node: 1, argc: 0 }.into()).unwrap();

        let stats = collect(&mut heap, &mut frames, &Pinned(vec![ch]));
        assert_eq!(stats.freed, 1);
        assert_eq!(BufferedChannel(ch).try_recv(&mut heap), Some(queued));
        assert_eq!(heap.value(queued).unwrap(), Value::Number(7.0));
        let _ = garbage;
    }
}
