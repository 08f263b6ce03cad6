//! Positional wire codec for values exchanged between controller and workers.
//!
//! A message is an ordered sequence of typed values. Each value is written as
//!
//! ```text
//! [u8 type code][u8 rank][u32 extent; rank][element data, row-major]
//! ```
//!
//! with every fixed-width field little-endian. Strings are `[u32 len][utf-8]`
//! per element. The protocol is positional: the reader must ask for the same
//! types in the same order the writer produced them. The embedded type code and
//! rank exist only so a mismatched request is rejected instead of silently
//! reinterpreting bytes.
//!
//! * [`MessageWriter`] / [`MessageReader`] – append and consume values.
//! * [`Encode`] / [`Decode`] – the closed set of supported Rust types.
//! * [`Value`] – dynamically typed view of a single encoded value.

mod element;
mod error;
mod message;
mod value;
mod wire;

pub use element::Element;
pub use error::{CodecError, CodecResult};
pub use message::{MessageReader, MessageWriter};
pub use value::{Shape, TypeCode, Value, ValueKind};
pub use wire::{Decode, Encode};

pub use ndarray::{ArrayD, IxDyn};
pub use num_complex::{Complex32, Complex64};

mod sealed {
    pub trait Sealed {}
}
