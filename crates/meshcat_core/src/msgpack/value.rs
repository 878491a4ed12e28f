//! Generic value tree produced by the decoder.
//!
//! A [`Value`] knows nothing about the scene protocol. Parsers further up
//! read it through the typed accessors below, which accept any numeric
//! representation: a position can arrive as a float32 typed array or as
//! a sequence of float64s and integers.

/// Homogeneous numeric array carried by an extension record.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedArray {
    U8(Vec<u8>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl TypedArray {
    pub fn len(&self) -> usize {
        match self {
            TypedArray::U8(v) => v.len(),
            TypedArray::I32(v) => v.len(),
            TypedArray::U32(v) => v.len(),
            TypedArray::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widen every element to f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            TypedArray::U8(v) => v.iter().map(|&x| x as f64).collect(),
            TypedArray::I32(v) => v.iter().map(|&x| x as f64).collect(),
            TypedArray::U32(v) => v.iter().map(|&x| x as f64).collect(),
            TypedArray::F32(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }
}

/// A decoded value.
///
/// Strings are kept as raw bytes; use [`Value::as_str`] to read them as UTF-8.
/// Maps keep stream order and may contain duplicate keys.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    /// Signed integer encodings (negative fixint, int8..int64)
    Int(i64),
    /// Unsigned integer encodings (positive fixint, uint8..uint64)
    UInt(u64),
    F32(f32),
    F64(f64),
    String(Vec<u8>),
    Binary(Vec<u8>),
    TypedArray(TypedArray),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Look up a string key in a map. The last matching entry wins.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries
                .iter()
                .rev()
                .find(|(k, _)| matches!(k, Value::String(bytes) if bytes == key.as_bytes()))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Like [`Value::get`], but treats an explicit nil as absent.
    pub fn get_non_nil(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|v| !v.is_nil())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            Value::F32(f) => Some(*f as f64),
            Value::F64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_i64().and_then(|i| u32::try_from(i).ok())
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Raw bytes of a binary blob, a string, or a u8 typed array.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(bytes) | Value::String(bytes) => Some(bytes),
            Value::TypedArray(TypedArray::U8(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// Numbers from a typed array or from a sequence of numeric values.
    ///
    /// Returns `None` if any element of a sequence is not numeric.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Value::TypedArray(array) => Some(array.to_f64_vec()),
            Value::Array(items) => items.iter().map(Value::as_f64).collect(),
            _ => None,
        }
    }

    /// Non-negative integers from a typed array or a sequence.
    pub fn to_u32_vec(&self) -> Option<Vec<u32>> {
        match self {
            Value::TypedArray(TypedArray::U32(v)) => Some(v.clone()),
            Value::TypedArray(TypedArray::U8(v)) => Some(v.iter().map(|&x| x as u32).collect()),
            Value::TypedArray(TypedArray::I32(v)) => {
                v.iter().map(|&x| u32::try_from(x).ok()).collect()
            }
            Value::TypedArray(TypedArray::F32(v)) => v
                .iter()
                .map(|&x| (x >= 0.0 && x.fract() == 0.0).then_some(x as u32))
                .collect(),
            Value::Array(items) => items.iter().map(Value::as_u32).collect(),
            _ => None,
        }
    }

    /// Truthiness in the loose sense the recording producers use:
    /// nil, false, zero and empty containers are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::UInt(u) => *u != 0,
            Value::F32(f) => *f != 0.0,
            Value::F64(f) => *f != 0.0,
            Value::String(b) | Value::Binary(b) => !b.is_empty(),
            Value::TypedArray(a) => !a.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.as_bytes().to_vec())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::F64(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
