use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::element::Element;
use crate::error::{CodecError, CodecResult};
use crate::value::{Shape, TypeCode, Value, ValueKind};
use crate::wire::{Decode, Encode};

/// Accumulates encoded values in call order.
#[derive(Clone, Debug, Default)]
pub struct MessageWriter {
    buf: BytesMut,
    count: usize,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one value. A value that fails to encode leaves the message untouched.
    pub fn put<V: Encode + ?Sized>(&mut self, value: &V) -> CodecResult<()> {
        let mark = self.buf.len();
        match value.encode(self) {
            Ok(()) => {
                self.count += 1;
                Ok(())
            }
            Err(err) => {
                self.buf.truncate(mark);
                Err(err)
            }
        }
    }

    /// Number of values written so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.count = 0;
    }

    /// Hands out the encoded bytes and resets the writer for reuse.
    pub fn take(&mut self) -> Bytes {
        self.count = 0;
        self.buf.split().freeze()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub(crate) fn write_header(&mut self, code: TypeCode, dims: &[usize]) -> CodecResult<()> {
        let rank = u8::try_from(dims.len()).map_err(|_| {
            CodecError::Unrepresentable(format!("array rank {} exceeds 255", dims.len()))
        })?;
        self.buf.put_u8(code as u8);
        self.buf.put_u8(rank);
        for &dim in dims {
            let extent = u32::try_from(dim).map_err(|_| {
                CodecError::Unrepresentable(format!("array extent {dim} exceeds u32"))
            })?;
            self.buf.put_u32_le(extent);
        }
        Ok(())
    }

    pub(crate) fn buf_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

/// Consumes values from an encoded message in the order they were written.
///
/// The first failed `get` poisons the reader: every later call returns
/// [`CodecError::Poisoned`] so a mismatched sequence is never half-decoded.
#[derive(Clone, Debug, Default)]
pub struct MessageReader {
    buf: Bytes,
    position: usize,
    poisoned: Option<usize>,
}

impl MessageReader {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            buf: bytes.into(),
            position: 0,
            poisoned: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Decodes the next value as `V`.
    pub fn get<V: Decode>(&mut self) -> CodecResult<V> {
        if let Some(position) = self.poisoned {
            return Err(CodecError::Poisoned { position });
        }
        match V::decode(self) {
            Ok(value) => {
                self.position += 1;
                Ok(value)
            }
            Err(err) => {
                self.poisoned = Some(self.position);
                Err(err)
            }
        }
    }

    /// Decodes the next value whatever its type.
    pub fn next_value(&mut self) -> CodecResult<Value> {
        self.get::<Value>()
    }

    /// Index of the next value to be decoded.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining_bytes(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_exhausted(&self) -> bool {
        !self.buf.has_remaining()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Counts the values not yet decoded without consuming them.
    pub fn remaining_values(&self) -> CodecResult<usize> {
        let mut probe = self.clone();
        let mut count = 0;
        while !probe.is_exhausted() {
            probe.next_value()?;
            count += 1;
        }
        Ok(count)
    }

    pub(crate) fn read_header(&mut self, expected: ValueKind) -> CodecResult<Shape> {
        let (code, shape) = self.read_any_header()?;
        let found = ValueKind::array(code, shape.rank());
        if !expected.accepts(&found) {
            return Err(CodecError::ProtocolMismatch {
                position: self.position,
                expected,
                found,
            });
        }
        Ok(shape)
    }

    pub(crate) fn read_any_header(&mut self) -> CodecResult<(TypeCode, Shape)> {
        if self.is_exhausted() {
            return Err(CodecError::Exhausted {
                position: self.position,
            });
        }
        let mut head = self.take(2)?;
        let raw_code = head.get_u8();
        let rank = head.get_u8() as usize;
        let code = TypeCode::from_u8(raw_code)
            .ok_or_else(|| self.malformed(format!("unknown type code {raw_code:#04x}")))?;
        let mut extents = self.take(rank * 4)?;
        let mut shape = Shape::scalar();
        for _ in 0..rank {
            shape.push(extents.get_u32_le() as usize);
        }
        Ok((code, shape))
    }

    /// Reads every element of `shape`, checking the byte budget before allocating.
    pub(crate) fn read_elements<T: Element>(&mut self, shape: &Shape) -> CodecResult<Vec<T>> {
        let count = shape
            .element_count()
            .ok_or_else(|| self.malformed(format!("shape {shape} overflows the element count")))?;
        let available = self.remaining_bytes();
        let capacity = match T::CODE.fixed_width() {
            Some(width) => {
                let needed = count.checked_mul(width).ok_or_else(|| {
                    self.malformed(format!("shape {shape} overflows the byte count"))
                })?;
                if needed > available {
                    return Err(CodecError::Truncated {
                        position: self.position,
                        needed,
                        available,
                    });
                }
                count
            }
            // Every string carries at least its 4-byte length prefix.
            None => count.min(available / 4),
        };
        let mut out = Vec::with_capacity(capacity);
        for _ in 0..count {
            out.push(T::take_element(self)?);
        }
        Ok(out)
    }

    pub(crate) fn take(&mut self, len: usize) -> CodecResult<Bytes> {
        let available = self.buf.remaining();
        if len > available {
            return Err(CodecError::Truncated {
                position: self.position,
                needed: len,
                available,
            });
        }
        Ok(self.buf.split_to(len))
    }

    pub(crate) fn malformed(&self, reason: impl Into<String>) -> CodecError {
        CodecError::Malformed {
            position: self.position,
            reason: reason.into(),
        }
    }
}

impl Iterator for MessageReader {
    type Item = CodecResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_poisoned() || self.is_exhausted() {
            return None;
        }
        Some(self.next_value())
    }
}
