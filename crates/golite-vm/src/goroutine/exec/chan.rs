//! Channel send and receive.

use crate::error::RuntimeError;
use crate::goroutine::{Cx, Flow, GoRoutine};
use crate::heap::{Heap, Tag};
use crate::objects::{kind_of, BufferedChannel, UnbufferedChannel};
use crate::ops;
use crate::value::{Addr, Value};

impl GoRoutine {
    /// `ch <- v`, with the channel and value on top of the stash.
    pub(in crate::goroutine) fn send(&mut self, cx: &mut Cx<'_>) -> Result<Flow, RuntimeError> {
        let base = self.stash_base(2)?;
        let (ch, value) = (self.stash[base], self.stash[base + 1]);
        ops::require_value(&cx.machine.heap.value(value)?)?;
        let heap = &mut cx.machine.heap;
        let done = match channel_kind(heap, ch, "send to")? {
            Some(Tag::UnbufferedChannel) => UnbufferedChannel(ch).try_send(heap, self.id, value),
            Some(_) => BufferedChannel(ch).try_send(heap, value),
            None => false,
        };
        if !done {
            return Ok(Flow::Block);
        }
        self.stash.truncate(base);
        Ok(Flow::Continue)
    }

    /// `<-ch`, replacing the channel on the stash with the received value.
    pub(in crate::goroutine) fn receive(&mut self, cx: &mut Cx<'_>) -> Result<Flow, RuntimeError> {
        let base = self.stash_base(1)?;
        let ch = self.stash[base];
        let heap = &mut cx.machine.heap;
        let received = match channel_kind(heap, ch, "receive from")? {
            Some(Tag::UnbufferedChannel) => UnbufferedChannel(ch).try_recv(heap, self.id),
            Some(_) => BufferedChannel(ch).try_recv(heap),
            None => None,
        };
        match received {
            Some(value) => {
                self.stash[base] = value;
                Ok(Flow::Continue)
            }
            None => Ok(Flow::Block),
        }
    }
}

/// Channel kind at `addr`; `None` for a nil channel, which never becomes
/// ready.
fn channel_kind(heap: &Heap, addr: Addr, action: &str) -> Result<Option<Tag>, RuntimeError> {
    if let Some(tag) = kind_of(heap, addr) {
        return Ok(Some(tag));
    }
    match heap.value(addr)? {
        Value::Nil => Ok(None),
        other => Err(RuntimeError::invalid(format!(
            "invalid operation: cannot {} non-channel (value of type {})",
            action,
            other.type_name()
        ))),
    }
}
