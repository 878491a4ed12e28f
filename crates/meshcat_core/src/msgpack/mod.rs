//! MessagePack decoding for meshcat command payloads.
//!
//! Only the decode direction is implemented. The extension seam
//! ([`ExtHook`]) maps meshcat's typed-array codes onto [`TypedArray`]
//! values; everything else is plain MessagePack.
//!
//! # Example
//!
//! ```
//! use meshcat_core::msgpack::{decode, Value};
//!
//! assert_eq!(decode(&[0xc0]).unwrap(), Value::Nil);
//! ```

mod decoder;
mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use decoder::*;
pub use value::*;
