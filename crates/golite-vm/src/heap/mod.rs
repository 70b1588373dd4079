//! Software-managed heap.
//!
//! A fixed byte buffer carved up by a [`BuddyAllocator`]. Every runtime value
//! and every evaluator instruction lives here as a tagged record; see
//! [`layout`] for the header format.
//!
//! - `alloc`/`resolve` convert between [`Record`]s and addresses
//! - AST-node records are cached per node id and never collected
//! - a fixed set of canonical records (booleans, nil, markers, pop
//!   instructions, the send instruction and builtin function values) is
//!   allocated once per heap and pinned

pub mod buddy;
pub mod gc;
pub mod layout;

use golite_ast::{AstId, BinaryOperator, UnaryOperator};
use hashbrown::{HashMap, HashSet};

use crate::builtins::{Builtin, Method};
use crate::error::RuntimeError;
use crate::value::{Addr, Instr, Item, MakeRequest, MarkerKind, PopKind, Record, Value};

pub use buddy::BuddyAllocator;
pub use gc::{CollectStats, Marker, Roots};
pub use layout::{Header, Tag, WORD};

/// Addresses of the canonical records.
#[derive(Debug, Clone)]
pub struct Constants {
    pub false_: Addr,
    pub true_: Addr,
    pub nil: Addr,
    markers: [Addr; 3],
    pops: [Addr; 4],
    pub send: Addr,
    builtins: [Addr; 3],
}

impl Constants {
    #[inline]
    pub fn bool(&self, b: bool) -> Addr {
        if b { self.true_ } else { self.false_ }
    }

    #[inline]
    pub fn marker(&self, kind: MarkerKind) -> Addr {
        self.markers[u8::from(kind) as usize]
    }

    #[inline]
    pub fn pop(&self, kind: PopKind) -> Addr {
        self.pops[u8::from(kind) as usize]
    }

    #[inline]
    pub fn builtin(&self, builtin: Builtin) -> Addr {
        self.builtins[u8::from(builtin) as usize]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub allocations: u64,
    pub collections: u64,
    pub freed: u64,
}

pub struct Heap {
    mem: Vec<u8>,
    buddy: BuddyAllocator,
    ast_blocks: HashMap<AstId, Addr>,
    pinned: HashSet<Addr>,
    consts: Constants,
    stats: HeapStats,
}

impl Heap {
    /// Create a heap of `words` words and place the canonical records.
    pub fn new(words: usize, coalesce: bool) -> Result<Self, RuntimeError> {
        let mut allocator = BuddyAllocator::new(words, coalesce);
        let mut mem = vec![0u8; words * WORD];
        let mut pinned = HashSet::new();
        let mut place = |header: Header| -> Result<Addr, RuntimeError> {
            let start = allocator
                .alloc(buddy::order_for(header.words()))
                .ok_or(RuntimeError::OutOfMemory { requested: header.words() })?;
            let addr = Addr::from_word(start);
            mem[addr.offset()..addr.offset() + WORD].copy_from_slice(&header.encode());
            pinned.insert(addr);
            Ok(addr)
        };

        let false_ = place(Header::bare(Tag::False))?;
        let true_ = place(Header::bare(Tag::True))?;
        let nil = place(Header::bare(Tag::Nil))?;
        let mut markers = [Addr(0); 3];
        for (i, slot) in markers.iter_mut().enumerate() {
            *slot = place(Header::new(Tag::Marker, 0, 0, i as u8))?;
        }
        let mut pops = [Addr(0); 4];
        for (i, slot) in pops.iter_mut().enumerate() {
            *slot = place(Header::new(Tag::PopOp, 0, 0, i as u8))?;
        }
        let send = place(Header::bare(Tag::SendOp))?;
        let mut builtins = [Addr(0); 3];
        for (i, slot) in builtins.iter_mut().enumerate() {
            *slot = place(Header::new(Tag::Builtin, 0, 0, i as u8))?;
        }

        let consts = Constants { false_, true_, nil, markers, pops, send, builtins };
        Ok(Self {
            mem,
            buddy: allocator,
            ast_blocks: HashMap::new(),
            pinned,
            consts,
            stats: HeapStats::default(),
        })
    }

    #[inline]
    pub fn constants(&self) -> &Constants {
        &self.consts
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    pub fn total_words(&self) -> usize {
        self.buddy.total_words()
    }

    pub fn free_words(&self) -> usize {
        self.buddy.free_words()
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate `record`, or `None` when no block is free. Canonical records,
    /// cached AST nodes and already-allocated objects return their existing
    /// address.
    pub fn try_alloc(&mut self, record: &Record) -> Result<Option<Addr>, RuntimeError> {
        if let Some(addr) = self.existing(record) {
            return Ok(Some(addr));
        }
        let (header, word) = encode(record)?;
        let Some(addr) = self.place(header, word) else {
            return Ok(None);
        };
        if let Record::Value(Value::Node(id)) = record {
            self.ast_blocks.insert(*id, addr);
        }
        Ok(Some(addr))
    }

    /// Words a record needs, used for out-of-memory reports.
    pub fn words_for(record: &Record) -> usize {
        encode(record).map(|(h, _)| h.words()).unwrap_or(1)
    }

    fn existing(&self, record: &Record) -> Option<Addr> {
        let c = &self.consts;
        match record {
            Record::Value(Value::Bool(b)) => Some(c.bool(*b)),
            Record::Value(Value::Nil) => Some(c.nil),
            Record::Value(Value::Builtin(b)) => Some(c.builtin(*b)),
            Record::Value(Value::Node(id)) => self.ast_blocks.get(id).copied(),
            Record::Value(Value::Channel(a) | Value::Mutex(a) | Value::WaitGroup(a)) => Some(*a),
            Record::Instr(Instr::Marker(kind)) => Some(c.marker(*kind)),
            Record::Instr(Instr::Pop(kind)) => Some(c.pop(*kind)),
            Record::Instr(Instr::Send) => Some(c.send),
            _ => None,
        }
    }

    fn place(&mut self, header: Header, word: Option<u64>) -> Option<Addr> {
        let order = buddy::order_for(header.words());
        let start = self.buddy.alloc(order)?;
        let addr = Addr::from_word(start);
        let from = addr.offset();
        self.mem[from..from + header.words() * WORD].fill(0);
        self.mem[from..from + WORD].copy_from_slice(&header.encode());
        if let Some(word) = word {
            self.set_word(addr, 1, word);
        }
        self.stats.allocations += 1;
        Some(addr)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    pub fn header(&self, addr: Addr) -> Result<Header, RuntimeError> {
        let bytes = self.bytes(addr)?;
        let tag = Tag::try_from(bytes[0]).map_err(|_| RuntimeError::UnknownInstruction(bytes[0]))?;
        Ok(Header {
            tag,
            a: u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
            size: layout::size_field(bytes),
            b: bytes[7],
        })
    }

    /// Reconstruct the structured form of the record at `addr`.
    pub fn resolve(&self, addr: Addr) -> Result<Item, RuntimeError> {
        let h = self.header(addr)?;
        let word = || self.word(addr, 1);
        let item = match h.tag {
            Tag::False => Item::Value(Value::Bool(false)),
            Tag::True => Item::Value(Value::Bool(true)),
            Tag::Nil => Item::Value(Value::Nil),
            Tag::Number => Item::Value(Value::Number(f64::from_bits(word()))),
            Tag::AstNode => Item::Value(Value::Node(h.a)),
            Tag::Builtin => Item::Value(Value::Builtin(decode(h.b, "builtin")?)),
            Tag::Closure => Item::Value(Value::Closure { func: h.a, frame: word() }),
            Tag::MethodOp => Item::Value(Value::Method {
                recv: Addr(word() as u32),
                method: decode::<Method>(h.b, "method")?,
            }),
            Tag::BufferedChannel | Tag::UnbufferedChannel => Item::Value(Value::Channel(addr)),
            Tag::Mutex => Item::Value(Value::Mutex(addr)),
            Tag::WaitGroup => Item::Value(Value::WaitGroup(addr)),
            Tag::VarDecl => Item::Instr(Instr::VarDecl(h.a)),
            Tag::Assign => Item::Instr(Instr::Assign(h.a)),
            Tag::SelectOp => Item::Instr(Instr::Select(h.a)),
            Tag::Unary => Item::Instr(Instr::Unary(decode::<UnaryOperator>(h.b, "unary operator")?)),
            Tag::Binary => {
                Item::Instr(Instr::Binary(decode::<BinaryOperator>(h.b, "binary operator")?))
            }
            Tag::Call => Item::Instr(Instr::Call { node: h.a, argc: word() as u32 }),
            Tag::Go => Item::Instr(Instr::Go { node: h.a, argc: word() as u32 }),
            Tag::EnvOp => Item::Instr(Instr::EnvRestore(word())),
            Tag::PopOp => Item::Instr(Instr::Pop(decode(h.b, "pop kind")?)),
            Tag::Marker => Item::Instr(Instr::Marker(decode(h.b, "marker kind")?)),
            Tag::BranchOp => Item::Instr(Instr::Branch { node: h.a, kind: decode(h.b, "branch kind")? }),
            Tag::SendOp => Item::Instr(Instr::Send),
        };
        Ok(item)
    }

    /// Resolve an address that must hold a value.
    pub fn value(&self, addr: Addr) -> Result<Value, RuntimeError> {
        match self.resolve(addr)? {
            Item::Value(v) => Ok(v),
            Item::Instr(i) => Err(RuntimeError::Internal(format!("instruction {:?} used as a value", i))),
        }
    }

    pub fn resolve_many(&self, addrs: &[Addr]) -> Result<Vec<Value>, RuntimeError> {
        addrs.iter().map(|&a| self.value(a)).collect()
    }

    // =========================================================================
    // Raw access for objects
    // =========================================================================

    fn bytes(&self, addr: Addr) -> Result<&[u8], RuntimeError> {
        self.mem
            .get(addr.offset()..addr.offset() + WORD)
            .ok_or_else(|| RuntimeError::Internal(format!("address {} outside the heap", addr)))
    }

    #[inline]
    pub(crate) fn byte(&self, addr: Addr, at: usize) -> u8 {
        self.mem[addr.offset() + at]
    }

    #[inline]
    pub(crate) fn set_byte(&mut self, addr: Addr, at: usize, v: u8) {
        self.mem[addr.offset() + at] = v;
    }

    #[inline]
    pub(crate) fn i16_at(&self, addr: Addr, at: usize) -> i16 {
        let o = addr.offset() + at;
        i16::from_be_bytes([self.mem[o], self.mem[o + 1]])
    }

    #[inline]
    pub(crate) fn set_i16(&mut self, addr: Addr, at: usize, v: i16) {
        let o = addr.offset() + at;
        self.mem[o..o + 2].copy_from_slice(&v.to_be_bytes());
    }

    #[inline]
    pub(crate) fn i32_at(&self, addr: Addr, at: usize) -> i32 {
        let o = addr.offset() + at;
        i32::from_be_bytes([self.mem[o], self.mem[o + 1], self.mem[o + 2], self.mem[o + 3]])
    }

    #[inline]
    pub(crate) fn set_i32(&mut self, addr: Addr, at: usize, v: i32) {
        let o = addr.offset() + at;
        self.mem[o..o + 4].copy_from_slice(&v.to_be_bytes());
    }

    /// Payload word `index` (1-based; word 0 is the header).
    #[inline]
    pub(crate) fn word(&self, addr: Addr, index: usize) -> u64 {
        let o = addr.offset() + index * WORD;
        let mut buf = [0u8; WORD];
        buf.copy_from_slice(&self.mem[o..o + WORD]);
        u64::from_be_bytes(buf)
    }

    #[inline]
    pub(crate) fn set_word(&mut self, addr: Addr, index: usize, v: u64) {
        let o = addr.offset() + index * WORD;
        self.mem[o..o + WORD].copy_from_slice(&v.to_be_bytes());
    }
}

fn decode<T: TryFrom<u8>>(code: u8, what: &str) -> Result<T, RuntimeError> {
    T::try_from(code).map_err(|_| RuntimeError::Internal(format!("invalid {} code {}", what, code)))
}

/// Header and optional first payload word of a fresh record.
fn encode(record: &Record) -> Result<(Header, Option<u64>), RuntimeError> {
    let out = match record {
        Record::Value(v) => match v {
            Value::Bool(b) => (Header::bare(if *b { Tag::True } else { Tag::False }), None),
            Value::Nil => (Header::bare(Tag::Nil), None),
            Value::Number(n) => (Header::new(Tag::Number, 0, 1, 0), Some(n.to_bits())),
            Value::Node(id) => (Header::new(Tag::AstNode, *id, 0, 0), None),
            Value::Builtin(b) => (Header::new(Tag::Builtin, 0, 0, (*b).into()), None),
            Value::Closure { func, frame } => (Header::new(Tag::Closure, *func, 1, 0), Some(*frame)),
            Value::Method { recv, method } => {
                (Header::new(Tag::MethodOp, 0, 1, (*method).into()), Some(recv.0 as u64))
            }
            Value::Channel(_) | Value::Mutex(_) | Value::WaitGroup(_) => {
                return Err(RuntimeError::Internal("objects are created through make/new".to_string()));
            }
        },
        Record::Instr(i) => match *i {
            Instr::VarDecl(id) => (Header::new(Tag::VarDecl, id, 0, 0), None),
            Instr::Assign(id) => (Header::new(Tag::Assign, id, 0, 0), None),
            Instr::Select(id) => (Header::new(Tag::SelectOp, id, 0, 0), None),
            Instr::Unary(op) => (Header::new(Tag::Unary, 0, 0, op.into()), None),
            Instr::Binary(op) => (Header::new(Tag::Binary, 0, 0, op.into()), None),
            Instr::Call { node, argc } => (Header::new(Tag::Call, node, 1, 0), Some(argc as u64)),
            Instr::Go { node, argc } => (Header::new(Tag::Go, node, 1, 0), Some(argc as u64)),
            Instr::EnvRestore(frame) => (Header::new(Tag::EnvOp, 0, 1, 0), Some(frame)),
            Instr::Pop(kind) => (Header::new(Tag::PopOp, 0, 0, kind.into()), None),
            Instr::Marker(kind) => (Header::new(Tag::Marker, 0, 0, kind.into()), None),
            Instr::Branch { node, kind } => (Header::new(Tag::BranchOp, node, 0, kind.into()), None),
            Instr::Send => (Header::bare(Tag::SendOp), None),
        },
        Record::Make(req) => match *req {
            MakeRequest::Channel { capacity: 0 } => {
                // recv id and send id both -1, not synced, one value word
                (Header::new(Tag::UnbufferedChannel, u32::MAX, 1, 0), None)
            }
            MakeRequest::Channel { capacity } => {
                (Header::new(Tag::BufferedChannel, 0, capacity as u16, 0), None)
            }
            MakeRequest::Mutex => (Header::bare(Tag::Mutex), None),
            MakeRequest::WaitGroup => (Header::bare(Tag::WaitGroup), None),
        },
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::BranchKind;
    use pretty_assertions::assert_eq;

    fn heap() -> Heap {
        Heap::new(256, true).unwrap()
    }

    fn alloc(heap: &mut Heap, record: impl Into<Record>) -> Addr {
        heap.try_alloc(&record.into()).unwrap().unwrap()
    }

    #[test]
    fn test_number_roundtrip() {
        let mut heap = heap();
        let a = alloc(&mut heap, Value::Number(-2.5));
        assert_eq!(heap.value(a).unwrap(), Value::Number(-2.5));
        let h = heap.header(a).unwrap();
        assert_eq!((h.tag, h.size), (Tag::Number, 1));
    }

    #[test]
    fn test_canonical_records_are_shared() {
        let mut heap = heap();
        let t1 = alloc(&mut heap, Value::Bool(true));
        let t2 = alloc(&mut heap, Value::Bool(true));
        assert_eq!(t1, t2);
        assert_eq!(t1, heap.constants().true_);
        let m = alloc(&mut heap, Instr::Marker(MarkerKind::Continue));
        assert_eq!(m, heap.constants().marker(MarkerKind::Continue));
        assert_eq!(heap.resolve(m).unwrap(), Item::Instr(Instr::Marker(MarkerKind::Continue)));
    }

    #[test]
    fn test_ast_blocks_are_cached() {
        let mut heap = heap();
        let a = alloc(&mut heap, Value::Node(41));
        let b = alloc(&mut heap, Value::Node(41));
        let c = alloc(&mut heap, Value::Node(42));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.value(c).unwrap(), Value::Node(42));
    }

    #[test]
    fn test_instruction_roundtrip() {
        let mut heap = heap();
        let instrs = [
            Instr::Call { node: 7, argc: 2 },
            Instr::Go { node: 9, argc: 0 },
            Instr::EnvRestore(1 << 40),
            Instr::Binary(BinaryOperator::BitClear),
            Instr::Unary(UnaryOperator::Receive),
            Instr::Branch { node: 3, kind: BranchKind::LoopBody },
            Instr::Select(12),
        ];
        for instr in instrs {
            let a = alloc(&mut heap, instr);
            assert_eq!(heap.resolve(a).unwrap(), Item::Instr(instr));
        }
    }

    #[test]
    fn test_closure_and_method_values() {
        let mut heap = heap();
        let c = alloc(&mut heap, Value::Closure { func: 5, frame: 77 });
        assert_eq!(heap.value(c).unwrap(), Value::Closure { func: 5, frame: 77 });
        let wg = heap.try_alloc(&Record::Make(MakeRequest::WaitGroup)).unwrap().unwrap();
        let m = alloc(&mut heap, Value::Method { recv: wg, method: Method::Done });
        assert_eq!(heap.value(m).unwrap(), Value::Method { recv: wg, method: Method::Done });
        assert_eq!(heap.value(wg).unwrap(), Value::WaitGroup(wg));
        assert_eq!(alloc(&mut heap, Value::WaitGroup(wg)), wg);
    }

    #[test]
    fn test_unknown_tag_is_reported() {
        let mut heap = heap();
        let a = alloc(&mut heap, Value::Number(1.0));
        heap.set_byte(a, 0, 200);
        assert_eq!(heap.resolve(a), Err(RuntimeError::UnknownInstruction(200)));
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let mut heap = Heap::new(16, true).unwrap();
        // 14 canonical one-word records leave two words.
        assert_eq!(heap.free_words(), 2);
        assert!(heap.try_alloc(&Value::Number(1.0).into()).unwrap().is_some());
        assert_eq!(heap.try_alloc(&Value::Number(2.0).into()).unwrap(), None);
    }
}
