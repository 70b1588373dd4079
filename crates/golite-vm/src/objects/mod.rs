//! Heap-resident synchronization objects.

pub mod channel;
pub mod sync;

pub use channel::{kind_of, BufferedChannel, UnbufferedChannel, NULL_ID};
pub use sync::{Mutex, WaitGroup};
