//! Property values and their binary encoding
//!
//! [`Value`] is the variant type every block property is read into and written
//! from. It is also the unit of the generic value-encoding layer used by the
//! stream codec: each value is written as a one-byte tag followed by a
//! little-endian payload. The layout of that encoding is versioned separately
//! from the stream format through [`VALUE_ENCODING_VERSION`].

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the value encoding written into stream headers.
pub const VALUE_ENCODING_VERSION: u32 = 1;

/// Nesting limit for list values when decoding.
const MAX_LIST_DEPTH: usize = 64;

const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_UINT: u8 = 0x03;
const TAG_LONG: u8 = 0x04;
const TAG_ULONG: u8 = 0x05;
const TAG_DOUBLE: u8 = 0x06;
const TAG_STRING: u8 = 0x0a;
const TAG_BYTES: u8 = 0x0c;
const TAG_LIST: u8 = 0x10;

/// Property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean value
    Bool(bool),
    /// 32-bit signed integer
    Int(i32),
    /// 32-bit unsigned integer
    UInt(u32),
    /// 64-bit signed integer
    Long(i64),
    /// 64-bit unsigned integer
    ULong(u64),
    /// Double precision floating point number
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Ordered list of values
    List(Vec<Value>),
}

/// The kind of a [`Value`], used to report type mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    UInt,
    Long,
    ULong,
    Double,
    String,
    Bytes,
    List,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::UInt => "uint",
            ValueKind::Long => "long",
            ValueKind::ULong => "ulong",
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::List => "list",
        };
        f.write_str(name)
    }
}

/// Errors raised while decoding an encoded value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueDecodeError {
    /// The buffer ended in the middle of a value
    #[error("Truncated value: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// The tag byte does not name a known value kind
    #[error("Unknown value tag: {0:#04x}")]
    UnknownTag(u8),

    /// A string payload was not valid UTF-8
    #[error("Invalid UTF-8 in string value")]
    InvalidUtf8,

    /// Lists nested deeper than the decoder accepts
    #[error("List values nested too deeply")]
    TooDeep,
}

impl Value {
    /// The kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::UInt(_) => ValueKind::UInt,
            Value::Long(_) => ValueKind::Long,
            Value::ULong(_) => ValueKind::ULong,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::List(_) => ValueKind::List,
        }
    }

    /// Try to convert to string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to convert to boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to convert to a signed integer, widening smaller integer kinds
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            Value::UInt(u) => Some(i64::from(*u)),
            Value::Long(l) => Some(*l),
            Value::ULong(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Try to convert to an unsigned integer
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(i) => u64::try_from(*i).ok(),
            Value::UInt(u) => Some(u64::from(*u)),
            Value::Long(l) => u64::try_from(*l).ok(),
            Value::ULong(u) => Some(*u),
            _ => None,
        }
    }

    /// Try to convert to a floating point number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(f64::from(*i)),
            Value::UInt(u) => Some(f64::from(*u)),
            _ => None,
        }
    }

    /// Try to convert to raw bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Try to convert to a list
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Append the encoded form of this value to `buf`.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        match self {
            Value::Bool(b) => {
                buf.put_u8(TAG_BOOL);
                buf.put_u8(u8::from(*b));
            }
            Value::Int(i) => {
                buf.put_u8(TAG_INT);
                buf.put_i32_le(*i);
            }
            Value::UInt(u) => {
                buf.put_u8(TAG_UINT);
                buf.put_u32_le(*u);
            }
            Value::Long(l) => {
                buf.put_u8(TAG_LONG);
                buf.put_i64_le(*l);
            }
            Value::ULong(u) => {
                buf.put_u8(TAG_ULONG);
                buf.put_u64_le(*u);
            }
            Value::Double(d) => {
                buf.put_u8(TAG_DOUBLE);
                buf.put_f64_le(*d);
            }
            Value::String(s) => {
                buf.put_u8(TAG_STRING);
                put_blob(buf, s.as_bytes());
            }
            Value::Bytes(b) => {
                buf.put_u8(TAG_BYTES);
                put_blob(buf, b);
            }
            Value::List(items) => {
                buf.put_u8(TAG_LIST);
                buf.put_u32_le(items.len() as u32);
                for item in items {
                    item.encode(buf);
                }
            }
        }
    }

    /// Number of bytes [`Value::encode`] writes for this value.
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Value::Bool(_) => 1,
            Value::Int(_) | Value::UInt(_) => 4,
            Value::Long(_) | Value::ULong(_) | Value::Double(_) => 8,
            Value::String(s) => 4 + s.len(),
            Value::Bytes(b) => 4 + b.len(),
            Value::List(items) => 4 + items.iter().map(Value::encoded_len).sum::<usize>(),
        }
    }

    /// Decode one value from the front of `buf`, advancing it.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Value, ValueDecodeError> {
        Self::decode_nested(buf, 0)
    }

    fn decode_nested<B: Buf>(buf: &mut B, depth: usize) -> Result<Value, ValueDecodeError> {
        ensure(buf, 1)?;
        let tag = buf.get_u8();
        let value = match tag {
            TAG_BOOL => {
                ensure(buf, 1)?;
                Value::Bool(buf.get_u8() != 0)
            }
            TAG_INT => {
                ensure(buf, 4)?;
                Value::Int(buf.get_i32_le())
            }
            TAG_UINT => {
                ensure(buf, 4)?;
                Value::UInt(buf.get_u32_le())
            }
            TAG_LONG => {
                ensure(buf, 8)?;
                Value::Long(buf.get_i64_le())
            }
            TAG_ULONG => {
                ensure(buf, 8)?;
                Value::ULong(buf.get_u64_le())
            }
            TAG_DOUBLE => {
                ensure(buf, 8)?;
                Value::Double(buf.get_f64_le())
            }
            TAG_STRING => {
                let raw = get_blob(buf)?;
                Value::String(String::from_utf8(raw).map_err(|_| ValueDecodeError::InvalidUtf8)?)
            }
            TAG_BYTES => Value::Bytes(get_blob(buf)?),
            TAG_LIST => {
                if depth >= MAX_LIST_DEPTH {
                    return Err(ValueDecodeError::TooDeep);
                }
                ensure(buf, 4)?;
                let count = buf.get_u32_le() as usize;
                // Every item takes at least two bytes; do not trust the count for allocation.
                let mut items = Vec::with_capacity(count.min(buf.remaining() / 2));
                for _ in 0..count {
                    items.push(Self::decode_nested(buf, depth + 1)?);
                }
                Value::List(items)
            }
            other => return Err(ValueDecodeError::UnknownTag(other)),
        };
        Ok(value)
    }
}

fn put_blob<B: BufMut>(buf: &mut B, data: &[u8]) {
    buf.put_u32_le(data.len() as u32);
    buf.put_slice(data);
}

fn get_blob<B: Buf>(buf: &mut B) -> Result<Vec<u8>, ValueDecodeError> {
    ensure(buf, 4)?;
    let len = buf.get_u32_le() as usize;
    ensure(buf, len)?;
    let mut data = vec![0u8; len];
    buf.copy_to_slice(&mut data);
    Ok(data)
}

fn ensure<B: Buf>(buf: &B, needed: usize) -> Result<(), ValueDecodeError> {
    if buf.remaining() < needed {
        return Err(ValueDecodeError::Truncated {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Value::UInt(u)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::ULong(u)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}
