use crate::util::{decode_fixed_uint64, extract_user_key};

pub const MAX_SEQUENCE_NUMBER: u64 = (1u64 << 56) - 1;

#[repr(u8)]
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum ValueType {
    TypeDeletion = 0x0,
    TypeValue = 0x1,
    TypeMerge = 0x2,
    TypeSingleDeletion = 0x7,
    TypeRangeDeletion = 0xF,
    TypeBlobIndex = 0x11,
    MaxValue = 0x7F,
    Unknown = 0xFF,
}

// The highest value type an iterator may position to when seeking with a
// user key. Keys are ordered type-descending within a sequence.
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::TypeBlobIndex;

impl From<u8> for ValueType {
    fn from(x: u8) -> Self {
        match x {
            0x0 => ValueType::TypeDeletion,
            0x1 => ValueType::TypeValue,
            0x2 => ValueType::TypeMerge,
            0x7 => ValueType::TypeSingleDeletion,
            0xF => ValueType::TypeRangeDeletion,
            0x11 => ValueType::TypeBlobIndex,
            0x7F => ValueType::MaxValue,
            _ => ValueType::Unknown,
        }
    }
}

#[inline]
pub fn pack_sequence_and_type(seq: u64, t: ValueType) -> u64 {
    (seq << 8) | t as u64
}

#[inline]
pub fn extract_internal_key_footer(key: &[u8]) -> u64 {
    assert!(key.len() >= 8);
    decode_fixed_uint64(&key[key.len() - 8..])
}

#[inline]
pub fn extract_value_type(key: &[u8]) -> ValueType {
    ((extract_internal_key_footer(key) & 0xff) as u8).into()
}

/// Builds `user_key ++ little_endian(seq << 8 | type)`, the wire form of an
/// internal key everywhere in the engine.
pub fn make_internal_key(user_key: &[u8], sequence: u64, tp: ValueType) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_key.len() + 8);
    key.extend_from_slice(user_key);
    key.extend_from_slice(&pack_sequence_and_type(sequence, tp).to_le_bytes());
    key
}

/// A borrowed decomposition of an encoded internal key.
pub struct ParsedInternalKey<'a> {
    key: &'a [u8],
    pub sequence: u64,
    pub tp: ValueType,
}

impl<'a> ParsedInternalKey<'a> {
    pub fn new(key: &'a [u8]) -> Self {
        if key.len() < 8 {
            return Self {
                key,
                sequence: 0,
                tp: ValueType::Unknown,
            };
        }
        let footer = extract_internal_key_footer(key);
        Self {
            key,
            sequence: footer >> 8,
            tp: ((footer & 0xff) as u8).into(),
        }
    }

    pub fn valid(&self) -> bool {
        self.key.len() >= 8 && self.tp != ValueType::Unknown && self.sequence <= MAX_SEQUENCE_NUMBER
    }

    pub fn user_key(&self) -> &'a [u8] {
        extract_user_key(self.key)
    }
}
