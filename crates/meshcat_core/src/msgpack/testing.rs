//! Test-only MessagePack writer.
//!
//! The crate never encodes; this exists so tests can build payloads
//! without hand-assembling bytes.

use super::decoder::{EXT_FLOAT32_ARRAY, EXT_INT32_ARRAY, EXT_UINT32_ARRAY, EXT_UINT8_ARRAY};
use super::value::{TypedArray, Value};

/// Chainable byte builder.
#[derive(Default)]
pub struct Builder {
    buf: Vec<u8>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn nil(mut self) -> Self {
        self.buf.push(0xc0);
        self
    }

    pub fn bool(mut self, b: bool) -> Self {
        self.buf.push(if b { 0xc3 } else { 0xc2 });
        self
    }

    pub fn uint(mut self, v: u64) -> Self {
        if v <= 0x7f {
            self.buf.push(v as u8);
        } else if v <= u8::MAX as u64 {
            self.buf.extend_from_slice(&[0xcc, v as u8]);
        } else if v <= u16::MAX as u64 {
            self.buf.push(0xcd);
            self.buf.extend_from_slice(&(v as u16).to_be_bytes());
        } else if v <= u32::MAX as u64 {
            self.buf.push(0xce);
            self.buf.extend_from_slice(&(v as u32).to_be_bytes());
        } else {
            self.buf.push(0xcf);
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
        self
    }

    pub fn int(mut self, v: i64) -> Self {
        if v >= 0 {
            return self.uint(v as u64);
        }
        if v >= -32 {
            self.buf.push(v as i8 as u8);
        } else {
            self.buf.push(0xd3);
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
        self
    }

    pub fn float32(mut self, v: f32) -> Self {
        self.buf.push(0xca);
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn float64(mut self, v: f64) -> Self {
        self.buf.push(0xcb);
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn str(self, s: &str) -> Self {
        self.str_bytes(s.as_bytes())
    }

    fn str_bytes(mut self, bytes: &[u8]) -> Self {
        let len = bytes.len();
        if len < 32 {
            self.buf.push(0xa0 | len as u8);
        } else if len <= u8::MAX as usize {
            self.buf.extend_from_slice(&[0xd9, len as u8]);
        } else if len <= u16::MAX as usize {
            self.buf.push(0xda);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(0xdb);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn bin(mut self, bytes: &[u8]) -> Self {
        let len = bytes.len();
        if len <= u8::MAX as usize {
            self.buf.extend_from_slice(&[0xc4, len as u8]);
        } else if len <= u16::MAX as usize {
            self.buf.push(0xc5);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(0xc6);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn ext(mut self, code: i8, data: &[u8]) -> Self {
        let len = data.len();
        if len <= u8::MAX as usize {
            self.buf.extend_from_slice(&[0xc7, len as u8]);
        } else if len <= u16::MAX as usize {
            self.buf.push(0xc8);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(0xc9);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self.buf.push(code as u8);
        self.buf.extend_from_slice(data);
        self
    }

    pub fn array_header(mut self, len: usize) -> Self {
        if len < 16 {
            self.buf.push(0x90 | len as u8);
        } else if len <= u16::MAX as usize {
            self.buf.push(0xdc);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(0xdd);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self
    }

    pub fn map_header(mut self, len: usize) -> Self {
        if len < 16 {
            self.buf.push(0x80 | len as u8);
        } else if len <= u16::MAX as usize {
            self.buf.push(0xde);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(0xdf);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self
    }

    pub fn value(self, value: &Value) -> Self {
        match value {
            Value::Nil => self.nil(),
            Value::Bool(b) => self.bool(*b),
            Value::Int(i) => self.int(*i),
            Value::UInt(u) => self.uint(*u),
            Value::F32(f) => self.float32(*f),
            Value::F64(f) => self.float64(*f),
            Value::String(bytes) => self.str_bytes(bytes),
            Value::Binary(bytes) => self.bin(bytes),
            Value::TypedArray(array) => {
                let (code, data) = pack_typed_array(array);
                self.ext(code, &data)
            }
            Value::Array(items) => items
                .iter()
                .fold(self.array_header(items.len()), |b, item| b.value(item)),
            Value::Map(entries) => entries
                .iter()
                .fold(self.map_header(entries.len()), |b, (k, v)| b.value(k).value(v)),
        }
    }
}

fn pack_typed_array(array: &TypedArray) -> (i8, Vec<u8>) {
    match array {
        TypedArray::U8(v) => (EXT_UINT8_ARRAY, v.clone()),
        TypedArray::I32(v) => (EXT_INT32_ARRAY, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        TypedArray::U32(v) => (EXT_UINT32_ARRAY, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        TypedArray::F32(v) => (EXT_FLOAT32_ARRAY, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
    }
}

/// Encode a whole value tree.
pub fn encode(value: &Value) -> Vec<u8> {
    Builder::new().value(value).finish()
}

/// Build a string-keyed map value.
pub fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (Value::from(k), v)).collect())
}

pub fn array(items: Vec<Value>) -> Value {
    Value::Array(items)
}

/// A sequence of float64 values.
pub fn floats(values: &[f64]) -> Value {
    Value::Array(values.iter().map(|&f| Value::F64(f)).collect())
}

pub fn f32_array(values: &[f32]) -> Value {
    Value::TypedArray(TypedArray::F32(values.to_vec()))
}

pub fn u32_array(values: &[u32]) -> Value {
    Value::TypedArray(TypedArray::U32(values.to_vec()))
}

/// Column-major 4x4 matrix with translation and uniform scale.
pub fn matrix(translation: [f64; 3], scale: f64) -> Value {
    floats(&[
        scale, 0.0, 0.0, 0.0, //
        0.0, scale, 0.0, 0.0, //
        0.0, 0.0, scale, 0.0, //
        translation[0], translation[1], translation[2], 1.0,
    ])
}
