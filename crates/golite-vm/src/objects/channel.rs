//! Channel records.
//!
//! Both channel kinds are handles over a heap address; state lives in the
//! record bytes. Neither operation blocks: a `false`/`None` result tells the
//! evaluator to retry later.
//!
//! Unbuffered (2 words):
//!
//! ```text
//! bytes 1..3  receiver routine id (i16, -1 = none)
//! bytes 3..5  sender routine id   (i16, -1 = none)
//! byte  7     synced flag
//! word  1     value being handed off
//! ```
//!
//! Buffered (`1 + capacity` words): byte 1 read index, byte 2 write index,
//! byte 3 current size, one slot word per element.

use crate::heap::{Heap, Tag};
use crate::value::Addr;

/// Routine id meaning "no party registered".
pub const NULL_ID: i16 = -1;

const RECV_ID: usize = 1;
const SEND_ID: usize = 3;
const SYNCED: usize = 7;

const READ_IDX: usize = 1;
const WRITE_IDX: usize = 2;
const SIZE: usize = 3;

/// Which kind of channel sits at `addr`, if any.
pub fn kind_of(heap: &Heap, addr: Addr) -> Option<Tag> {
    match heap.header(addr).ok()?.tag {
        tag @ (Tag::BufferedChannel | Tag::UnbufferedChannel) => Some(tag),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnbufferedChannel(pub Addr);

impl UnbufferedChannel {
    pub fn recv_id(self, heap: &Heap) -> i16 {
        heap.i16_at(self.0, RECV_ID)
    }

    pub fn send_id(self, heap: &Heap) -> i16 {
        heap.i16_at(self.0, SEND_ID)
    }

    pub fn synced(self, heap: &Heap) -> bool {
        heap.byte(self.0, SYNCED) != 0
    }

    pub fn is_idle(self, heap: &Heap) -> bool {
        self.recv_id(heap) == NULL_ID && self.send_id(heap) == NULL_ID && !self.synced(heap)
    }

    /// Value the collector must keep: stored by a waiting sender or handed
    /// over and not yet picked up.
    pub fn in_flight(self, heap: &Heap) -> Option<Addr> {
        (self.send_id(heap) != NULL_ID || self.synced(heap)).then(|| Addr(heap.word(self.0, 1) as u32))
    }

    fn reset(self, heap: &mut Heap) {
        heap.set_i16(self.0, RECV_ID, NULL_ID);
        heap.set_i16(self.0, SEND_ID, NULL_ID);
        heap.set_byte(self.0, SYNCED, 0);
        heap.set_word(self.0, 1, 0);
    }

    /// Offer `value` on behalf of `routine`. Returns true once the send is
    /// complete for this routine.
    pub fn try_send(self, heap: &mut Heap, routine: i16, value: Addr) -> bool {
        let synced = self.synced(heap);
        if self.send_id(heap) == routine {
            // Registered first; done once the receiver has taken the value.
            if synced {
                self.reset(heap);
            }
            return synced;
        }
        if synced || self.send_id(heap) != NULL_ID {
            return false;
        }
        heap.set_word(self.0, 1, value.0 as u64);
        if self.recv_id(heap) != NULL_ID {
            heap.set_byte(self.0, SYNCED, 1);
            true
        } else {
            heap.set_i16(self.0, SEND_ID, routine);
            false
        }
    }

    /// Ask for a value on behalf of `routine`.
    pub fn try_recv(self, heap: &mut Heap, routine: i16) -> Option<Addr> {
        let synced = self.synced(heap);
        if self.recv_id(heap) == routine {
            // Registered first; the sender left the value and set `synced`.
            if !synced {
                return None;
            }
            let value = Addr(heap.word(self.0, 1) as u32);
            self.reset(heap);
            return Some(value);
        }
        if synced || self.recv_id(heap) != NULL_ID {
            return None;
        }
        if self.send_id(heap) != NULL_ID {
            heap.set_byte(self.0, SYNCED, 1);
            Some(Addr(heap.word(self.0, 1) as u32))
        } else {
            heap.set_i16(self.0, RECV_ID, routine);
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferedChannel(pub Addr);

impl BufferedChannel {
    pub fn capacity(self, heap: &Heap) -> usize {
        heap.header(self.0).map(|h| h.size as usize).unwrap_or(0)
    }

    pub fn len(self, heap: &Heap) -> usize {
        heap.byte(self.0, SIZE) as usize
    }

    pub fn is_empty(self, heap: &Heap) -> bool {
        self.len(heap) == 0
    }

    pub fn try_send(self, heap: &mut Heap, value: Addr) -> bool {
        let cap = self.capacity(heap);
        let size = self.len(heap);
        if size == cap {
            return false;
        }
        let write = heap.byte(self.0, WRITE_IDX) as usize;
        heap.set_word(self.0, 1 + write, value.0 as u64);
        heap.set_byte(self.0, WRITE_IDX, ((write + 1) % cap) as u8);
        heap.set_byte(self.0, SIZE, (size + 1) as u8);
        true
    }

    pub fn try_recv(self, heap: &mut Heap) -> Option<Addr> {
        let size = self.len(heap);
        if size == 0 {
            return None;
        }
        let cap = self.capacity(heap);
        let read = heap.byte(self.0, READ_IDX) as usize;
        let value = Addr(heap.word(self.0, 1 + read) as u32);
        heap.set_word(self.0, 1 + read, 0);
        heap.set_byte(self.0, READ_IDX, ((read + 1) % cap) as u8);
        heap.set_byte(self.0, SIZE, (size - 1) as u8);
        Some(value)
    }

    /// Queued values in FIFO order.
    pub fn queued(self, heap: &Heap) -> Vec<Addr> {
        let cap = self.capacity(heap);
        let read = heap.byte(self.0, READ_IDX) as usize;
        (0..self.len(heap))
            .map(|i| Addr(heap.word(self.0, 1 + (read + i) % cap) as u32))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{MakeRequest, Record, Value};
    use pretty_assertions::assert_eq;

    fn make(heap: &mut Heap, capacity: u8) -> Addr {
        heap.try_alloc(&Record::Make(MakeRequest::Channel { capacity })).unwrap().unwrap()
    }

    fn number(heap: &mut Heap, n: f64) -> Addr {
        heap.try_alloc(&Value::Number(n).into()).unwrap().unwrap()
    }

    #[test]
    fn test_fresh_unbuffered_is_idle() {
        let mut heap = Heap::new(64, true).unwrap();
        let ch = UnbufferedChannel(make(&mut heap, 0));
        assert!(ch.is_idle(&heap));
        assert_eq!(kind_of(&heap, ch.0), Some(Tag::UnbufferedChannel));
        assert_eq!(heap.header(ch.0).unwrap().words(), 2);
    }

    #[test]
    fn test_sender_first_rendezvous() {
        let mut heap = Heap::new(64, true).unwrap();
        let ch = UnbufferedChannel(make(&mut heap, 0));
        let v = number(&mut heap, 42.0);

        assert!(!ch.try_send(&mut heap, 1, v));
        assert_eq!(ch.send_id(&heap), 1);
        assert_eq!(ch.in_flight(&heap), Some(v));
        // Still waiting without a receiver.
        assert!(!ch.try_send(&mut heap, 1, v));
        // A second sender is turned away.
        assert!(!ch.try_send(&mut heap, 2, v));

        assert_eq!(ch.try_recv(&mut heap, 0), Some(v));
        assert!(ch.synced(&heap));
        // New parties are rejected while the hand-off completes.
        assert_eq!(ch.try_recv(&mut heap, 3), None);

        assert!(ch.try_send(&mut heap, 1, v));
        assert!(ch.is_idle(&heap));
    }

    #[test]
    fn test_receiver_first_rendezvous() {
        let mut heap = Heap::new(64, true).unwrap();
        let ch = UnbufferedChannel(make(&mut heap, 0));
        let v = number(&mut heap, 7.0);

        assert_eq!(ch.try_recv(&mut heap, 0), None);
        assert_eq!(ch.recv_id(&heap), 0);
        assert!(ch.try_send(&mut heap, 1, v));
        assert_eq!(ch.send_id(&heap), NULL_ID);
        assert_eq!(ch.try_recv(&mut heap, 0), Some(v));
        assert!(ch.is_idle(&heap));
    }

    #[test]
    fn test_buffered_fifo_and_bounds() {
        let mut heap = Heap::new(128, true).unwrap();
        let ch = BufferedChannel(make(&mut heap, 3));
        assert_eq!(kind_of(&heap, ch.0), Some(Tag::BufferedChannel));
        assert_eq!(ch.capacity(&heap), 3);
        let values: Vec<Addr> = (0..5).map(|i| number(&mut heap, i as f64)).collect();

        for &v in &values[..3] {
            assert!(ch.try_send(&mut heap, v));
        }
        assert!(!ch.try_send(&mut heap, values[3]));
        assert_eq!(ch.len(&heap), 3);

        let mut received = vec![ch.try_recv(&mut heap).unwrap()];
        // Write index wraps around to the freed slot.
        assert!(ch.try_send(&mut heap, values[3]));
        assert_eq!(ch.queued(&heap), vec![values[1], values[2], values[3]]);
        while let Some(v) = ch.try_recv(&mut heap) {
            assert!(ch.len(&heap) <= ch.capacity(&heap));
            received.push(v);
        }
        assert_eq!(received, values[..4].to_vec());
        assert!(ch.is_empty(&heap));
    }
}
