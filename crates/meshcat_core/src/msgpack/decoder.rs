//! Decode-only MessagePack reader.
//!
//! The leading byte of every value selects its encoding. Fixed families
//! embed a small length or value in the tag byte; sized families follow
//! the tag with an 8/16/32-bit big-endian length. Extension records are
//! handed to an [`ExtHook`], which is the only place scene-specific
//! knowledge enters the decoder.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use thiserror::Error;

use super::value::{TypedArray, Value};

/// Extension code for a little-endian `Uint8Array`.
pub const EXT_UINT8_ARRAY: i8 = 0x12;
/// Extension code for a little-endian `Int32Array`.
pub const EXT_INT32_ARRAY: i8 = 0x15;
/// Extension code for a little-endian `Uint32Array`.
pub const EXT_UINT32_ARRAY: i8 = 0x16;
/// Extension code for a little-endian `Float32Array`.
pub const EXT_FLOAT32_ARRAY: i8 = 0x17;

/// Nesting deeper than this is rejected rather than risking the stack.
const MAX_DEPTH: usize = 512;

/// Errors that can occur while decoding a single payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated input: needed {needed} byte(s) at offset {offset}")]
    TruncatedInput { offset: usize, needed: usize },

    #[error("unknown format byte 0x{byte:02x} at offset {offset}")]
    UnknownFormatByte { byte: u8, offset: usize },

    #[error("nesting deeper than {0} levels")]
    DepthLimitExceeded(usize),
}

/// Result type for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Receives extension records `(type code, payload bytes)`.
pub trait ExtHook {
    fn decode_ext(&self, code: i8, data: Vec<u8>) -> Value;
}

impl<F> ExtHook for F
where
    F: Fn(i8, Vec<u8>) -> Value,
{
    fn decode_ext(&self, code: i8, data: Vec<u8>) -> Value {
        self(code, data)
    }
}

/// Hook that returns every extension payload as raw bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawExt;

impl ExtHook for RawExt {
    fn decode_ext(&self, _code: i8, data: Vec<u8>) -> Value {
        Value::Binary(data)
    }
}

/// Hook for the four typed-array codes used by meshcat.
///
/// Element packing is little-endian, unlike the big-endian scalar
/// encodings. Unknown codes, and payloads whose length is not a multiple
/// of the element width, come back as raw bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct TypedArrayExt;

impl ExtHook for TypedArrayExt {
    fn decode_ext(&self, code: i8, data: Vec<u8>) -> Value {
        match code {
            EXT_UINT8_ARRAY => Value::TypedArray(TypedArray::U8(data)),
            EXT_INT32_ARRAY | EXT_UINT32_ARRAY | EXT_FLOAT32_ARRAY if data.len() % 4 != 0 => {
                log::debug!(
                    "typed array ext 0x{:02x} has {} bytes, not a multiple of 4",
                    code,
                    data.len()
                );
                Value::Binary(data)
            }
            EXT_INT32_ARRAY => {
                let mut out = vec![0i32; data.len() / 4];
                LittleEndian::read_i32_into(&data, &mut out);
                Value::TypedArray(TypedArray::I32(out))
            }
            EXT_UINT32_ARRAY => {
                let mut out = vec![0u32; data.len() / 4];
                LittleEndian::read_u32_into(&data, &mut out);
                Value::TypedArray(TypedArray::U32(out))
            }
            EXT_FLOAT32_ARRAY => {
                let mut out = vec![0f32; data.len() / 4];
                LittleEndian::read_f32_into(&data, &mut out);
                Value::TypedArray(TypedArray::F32(out))
            }
            _ => Value::Binary(data),
        }
    }
}

/// Cursor-based decoder over a borrowed buffer.
pub struct Decoder<'a, H = TypedArrayExt> {
    cursor: Cursor<&'a [u8]>,
    hook: H,
    depth: usize,
}

impl<'a> Decoder<'a, TypedArrayExt> {
    /// Create a decoder with the typed-array extension hook.
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_hook(buf, TypedArrayExt)
    }
}

impl<'a, H: ExtHook> Decoder<'a, H> {
    pub fn with_hook(buf: &'a [u8], hook: H) -> Self {
        Self {
            cursor: Cursor::new(buf),
            hook,
            depth: 0,
        }
    }

    /// Current byte offset into the buffer.
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> DecodeResult<Value> {
        let offset = self.position();
        let b = self.read_u8()?;

        match b {
            // positive fixint
            0x00..=0x7f => Ok(Value::UInt(b as u64)),
            // fixmap
            0x80..=0x8f => self.read_map((b & 0x0f) as usize),
            // fixarray
            0x90..=0x9f => self.read_array((b & 0x0f) as usize),
            // fixstr
            0xa0..=0xbf => self.read_bytes((b & 0x1f) as usize).map(Value::String),
            0xc0 => Ok(Value::Nil),
            0xc2 => Ok(Value::Bool(false)),
            0xc3 => Ok(Value::Bool(true)),
            // bin 8/16/32
            0xc4 => {
                let len = self.read_u8()? as usize;
                self.read_bytes(len).map(Value::Binary)
            }
            0xc5 => {
                let len = self.read_u16()? as usize;
                self.read_bytes(len).map(Value::Binary)
            }
            0xc6 => {
                let len = self.read_u32()? as usize;
                self.read_bytes(len).map(Value::Binary)
            }
            // ext 8/16/32
            0xc7 => {
                let len = self.read_u8()? as usize;
                self.read_ext(len)
            }
            0xc8 => {
                let len = self.read_u16()? as usize;
                self.read_ext(len)
            }
            0xc9 => {
                let len = self.read_u32()? as usize;
                self.read_ext(len)
            }
            0xca => self.read_f32().map(Value::F32),
            0xcb => self.read_f64().map(Value::F64),
            0xcc => self.read_u8().map(|v| Value::UInt(v as u64)),
            0xcd => self.read_u16().map(|v| Value::UInt(v as u64)),
            0xce => self.read_u32().map(|v| Value::UInt(v as u64)),
            0xcf => self.read_u64().map(Value::UInt),
            0xd0 => self.read_i8().map(|v| Value::Int(v as i64)),
            0xd1 => self.read_i16().map(|v| Value::Int(v as i64)),
            0xd2 => self.read_i32().map(|v| Value::Int(v as i64)),
            0xd3 => self.read_i64().map(Value::Int),
            // fixext 1/2/4/8/16
            0xd4 => self.read_ext(1),
            0xd5 => self.read_ext(2),
            0xd6 => self.read_ext(4),
            0xd7 => self.read_ext(8),
            0xd8 => self.read_ext(16),
            // str 8/16/32
            0xd9 => {
                let len = self.read_u8()? as usize;
                self.read_bytes(len).map(Value::String)
            }
            0xda => {
                let len = self.read_u16()? as usize;
                self.read_bytes(len).map(Value::String)
            }
            0xdb => {
                let len = self.read_u32()? as usize;
                self.read_bytes(len).map(Value::String)
            }
            // array 16/32
            0xdc => {
                let len = self.read_u16()? as usize;
                self.read_array(len)
            }
            0xdd => {
                let len = self.read_u32()? as usize;
                self.read_array(len)
            }
            // map 16/32
            0xde => {
                let len = self.read_u16()? as usize;
                self.read_map(len)
            }
            0xdf => {
                let len = self.read_u32()? as usize;
                self.read_map(len)
            }
            // negative fixint
            0xe0..=0xff => Ok(Value::Int(b as i8 as i64)),
            // 0xc1 is reserved
            _ => Err(DecodeError::UnknownFormatByte { byte: b, offset }),
        }
    }

    fn read_array(&mut self, len: usize) -> DecodeResult<Value> {
        self.enter()?;
        // every element takes at least one byte
        let mut items = Vec::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        self.depth -= 1;
        Ok(Value::Array(items))
    }

    fn read_map(&mut self, len: usize) -> DecodeResult<Value> {
        self.enter()?;
        let mut entries = Vec::with_capacity(len.min(self.remaining() / 2));
        for _ in 0..len {
            let key = self.decode()?;
            let value = self.decode()?;
            entries.push((key, value));
        }
        self.depth -= 1;
        Ok(Value::Map(entries))
    }

    fn read_ext(&mut self, len: usize) -> DecodeResult<Value> {
        let code = self.read_i8()?;
        let data = self.read_bytes(len)?;
        Ok(self.hook.decode_ext(code, data))
    }

    fn enter(&mut self) -> DecodeResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(DecodeError::DepthLimitExceeded(MAX_DEPTH));
        }
        Ok(())
    }

    fn truncated(&self, needed: usize) -> DecodeError {
        DecodeError::TruncatedInput {
            offset: self.position(),
            needed,
        }
    }

    fn read_bytes(&mut self, len: usize) -> DecodeResult<Vec<u8>> {
        if len > self.remaining() {
            return Err(self.truncated(len));
        }
        let mut out = vec![0u8; len];
        self.cursor
            .read_exact(&mut out)
            .map_err(|_| self.truncated(len))?;
        Ok(out)
    }

    fn read_u8(&mut self) -> DecodeResult<u8> {
        self.cursor.read_u8().map_err(|_| self.truncated(1))
    }

    fn read_i8(&mut self) -> DecodeResult<i8> {
        self.cursor.read_i8().map_err(|_| self.truncated(1))
    }

    fn read_u16(&mut self) -> DecodeResult<u16> {
        self.checked(2)?;
        self.cursor.read_u16::<BigEndian>().map_err(|_| self.truncated(2))
    }

    fn read_i16(&mut self) -> DecodeResult<i16> {
        self.checked(2)?;
        self.cursor.read_i16::<BigEndian>().map_err(|_| self.truncated(2))
    }

    fn read_u32(&mut self) -> DecodeResult<u32> {
        self.checked(4)?;
        self.cursor.read_u32::<BigEndian>().map_err(|_| self.truncated(4))
    }

    fn read_i32(&mut self) -> DecodeResult<i32> {
        self.checked(4)?;
        self.cursor.read_i32::<BigEndian>().map_err(|_| self.truncated(4))
    }

    fn read_u64(&mut self) -> DecodeResult<u64> {
        self.checked(8)?;
        self.cursor.read_u64::<BigEndian>().map_err(|_| self.truncated(8))
    }

    fn read_i64(&mut self) -> DecodeResult<i64> {
        self.checked(8)?;
        self.cursor.read_i64::<BigEndian>().map_err(|_| self.truncated(8))
    }

    fn read_f32(&mut self) -> DecodeResult<f32> {
        self.checked(4)?;
        self.cursor.read_f32::<BigEndian>().map_err(|_| self.truncated(4))
    }

    fn read_f64(&mut self) -> DecodeResult<f64> {
        self.checked(8)?;
        self.cursor.read_f64::<BigEndian>().map_err(|_| self.truncated(8))
    }

    // Report the offset before a partial read moves the cursor.
    fn checked(&self, needed: usize) -> DecodeResult<()> {
        if needed > self.remaining() {
            Err(self.truncated(needed))
        } else {
            Ok(())
        }
    }
}

/// Decode one value with the typed-array extension hook.
///
/// Bytes after the first complete value are ignored.
pub fn decode(buf: &[u8]) -> DecodeResult<Value> {
    decode_with(buf, TypedArrayExt)
}

/// Decode one value with a caller-supplied extension hook.
pub fn decode_with<H: ExtHook>(buf: &[u8], hook: H) -> DecodeResult<Value> {
    let mut decoder = Decoder::with_hook(buf, hook);
    let value = decoder.decode()?;
    if decoder.remaining() > 0 {
        log::debug!("{} trailing byte(s) after decoded value", decoder.remaining());
    }
    Ok(value)
}
