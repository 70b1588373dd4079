//! Mutex and WaitGroup records: one header word each.
//!
//! The mutex keeps its locked flag in byte 1; the wait group keeps a signed
//! counter in bytes 1..5. Neither has a wait queue, callers poll.

use crate::error::RuntimeError;
use crate::heap::Heap;
use crate::value::Addr;

const LOCKED: usize = 1;
const COUNTER: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutex(pub Addr);

impl Mutex {
    pub fn is_locked(self, heap: &Heap) -> bool {
        heap.byte(self.0, LOCKED) != 0
    }

    /// Take the lock if it is free.
    pub fn try_lock(self, heap: &mut Heap) -> bool {
        if self.is_locked(heap) {
            return false;
        }
        heap.set_byte(self.0, LOCKED, 1);
        true
    }

    pub fn unlock(self, heap: &mut Heap) -> Result<(), RuntimeError> {
        if !self.is_locked(heap) {
            return Err(RuntimeError::InvalidOperation(
                "fatal error: sync: unlock of unlocked mutex".to_string(),
            ));
        }
        heap.set_byte(self.0, LOCKED, 0);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitGroup(pub Addr);

impl WaitGroup {
    pub fn counter(self, heap: &Heap) -> i32 {
        heap.i32_at(self.0, COUNTER)
    }

    pub fn add(self, heap: &mut Heap, delta: i32) -> Result<(), RuntimeError> {
        let next = self.counter(heap).checked_add(delta).filter(|n| *n >= 0).ok_or_else(|| {
            RuntimeError::InvalidOperation("panic: sync: negative WaitGroup counter".to_string())
        })?;
        heap.set_i32(self.0, COUNTER, next);
        Ok(())
    }

    pub fn done(self, heap: &mut Heap) -> Result<(), RuntimeError> {
        self.add(heap, -1)
    }

    /// True when `Wait` may return.
    pub fn is_released(self, heap: &Heap) -> bool {
        self.counter(heap) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{MakeRequest, Record};

    fn make(heap: &mut Heap, req: MakeRequest) -> Addr {
        heap.try_alloc(&Record::Make(req)).unwrap().unwrap()
    }

    #[test]
    fn test_mutex_lock_cycle() {
        let mut heap = Heap::new(32, true).unwrap();
        let mu = Mutex(make(&mut heap, MakeRequest::Mutex));
        assert!(!mu.is_locked(&heap));
        assert!(mu.try_lock(&mut heap));
        assert!(!mu.try_lock(&mut heap));
        mu.unlock(&mut heap).unwrap();
        assert!(mu.unlock(&mut heap).is_err());
    }

    #[test]
    fn test_waitgroup_counter() {
        let mut heap = Heap::new(32, true).unwrap();
        let wg = WaitGroup(make(&mut heap, MakeRequest::WaitGroup));
        assert!(wg.is_released(&heap));
        wg.add(&mut heap, 2).unwrap();
        wg.done(&mut heap).unwrap();
        assert_eq!(wg.counter(&heap), 1);
        assert!(!wg.is_released(&heap));
        wg.done(&mut heap).unwrap();
        assert!(wg.is_released(&heap));
        let err = wg.done(&mut heap).unwrap_err();
        assert!(err.to_string().contains("negative WaitGroup counter"));
        assert_eq!(wg.counter(&heap), 0);
    }
}
