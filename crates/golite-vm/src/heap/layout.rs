//! Byte layout of heap records.
//!
//! Every record starts with an 8-byte header word:
//!
//! ```text
//! byte  0     tag
//! bytes 1..5  field `a` (u32, big-endian)
//! bytes 5..7  payload size in words (u16, big-endian)
//! byte  7     field `b`
//! ```
//!
//! Channels and sync primitives reuse bytes 1..5 and 7 for their own state;
//! see `objects`.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Bytes per heap word.
pub const WORD: usize = 8;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum Tag {
    False = 0,
    True = 1,
    Number = 2,
    AstNode = 3,
    VarDecl = 4,
    Assign = 5,
    Unary = 6,
    Binary = 7,
    Call = 8,
    Go = 9,
    Builtin = 10,
    Closure = 11,
    EnvOp = 12,
    PopOp = 13,
    BufferedChannel = 14,
    UnbufferedChannel = 15,
    Mutex = 16,
    WaitGroup = 17,
    Marker = 18,
    Nil = 19,
    BranchOp = 20,
    SendOp = 21,
    MethodOp = 22,
    SelectOp = 23,
}

/// Decoded header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: Tag,
    pub a: u32,
    pub size: u16,
    pub b: u8,
}

impl Header {
    #[inline]
    pub fn new(tag: Tag, a: u32, size: u16, b: u8) -> Self {
        Self { tag, a, size, b }
    }

    #[inline]
    pub fn bare(tag: Tag) -> Self {
        Self::new(tag, 0, 0, 0)
    }

    /// Total block length in words, header included.
    #[inline]
    pub fn words(&self) -> usize {
        1 + self.size as usize
    }

    pub fn encode(&self) -> [u8; WORD] {
        let mut out = [0u8; WORD];
        out[0] = self.tag.into();
        out[1..5].copy_from_slice(&self.a.to_be_bytes());
        out[5..7].copy_from_slice(&self.size.to_be_bytes());
        out[7] = self.b;
        out
    }
}

/// Payload size of the record at `bytes`, read without decoding the tag.
#[inline]
pub fn size_field(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[5], bytes[6]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_header_bytes() {
        let header = Header::new(Tag::Closure, 0x0102_0304, 1, 9);
        let bytes = header.encode();
        assert_eq!(bytes, [11, 1, 2, 3, 4, 0, 1, 9]);
        assert_eq!(size_field(&bytes), 1);
        assert_eq!(header.words(), 2);
    }

    #[test]
    fn test_tag_codes() {
        assert_eq!(u8::from(Tag::UnbufferedChannel), 15);
        assert_eq!(Tag::try_from(14u8).unwrap(), Tag::BufferedChannel);
        assert!(Tag::try_from(24u8).is_err());
    }
}
