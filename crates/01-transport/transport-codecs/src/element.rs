use bytes::{Buf, BufMut, BytesMut};
use num_complex::{Complex32, Complex64};

use crate::error::{CodecError, CodecResult};
use crate::message::MessageReader;
use crate::sealed::Sealed;
use crate::value::TypeCode;

/// Primitive element type that may appear as a scalar or inside an array.
///
/// Implemented for `bool`, `i32`, `f32`, `f64`, [`Complex32`], [`Complex64`]
/// and `String`. The set is closed.
pub trait Element: Clone + Sealed + 'static {
    const CODE: TypeCode;

    #[doc(hidden)]
    fn put_element(&self, buf: &mut BytesMut) -> CodecResult<()>;

    #[doc(hidden)]
    fn take_element(reader: &mut MessageReader) -> CodecResult<Self>;
}

impl Sealed for bool {}
impl Sealed for i32 {}
impl Sealed for f32 {}
impl Sealed for f64 {}
impl Sealed for Complex32 {}
impl Sealed for Complex64 {}
impl Sealed for String {}

impl Element for bool {
    const CODE: TypeCode = TypeCode::Bool;

    fn put_element(&self, buf: &mut BytesMut) -> CodecResult<()> {
        buf.put_u8(u8::from(*self));
        Ok(())
    }

    fn take_element(reader: &mut MessageReader) -> CodecResult<Self> {
        match reader.take(1)?.get_u8() {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(reader.malformed(format!("bool byte {other:#04x}"))),
        }
    }
}

impl Element for i32 {
    const CODE: TypeCode = TypeCode::Int32;

    fn put_element(&self, buf: &mut BytesMut) -> CodecResult<()> {
        buf.put_i32_le(*self);
        Ok(())
    }

    fn take_element(reader: &mut MessageReader) -> CodecResult<Self> {
        Ok(reader.take(4)?.get_i32_le())
    }
}

impl Element for f32 {
    const CODE: TypeCode = TypeCode::Float32;

    fn put_element(&self, buf: &mut BytesMut) -> CodecResult<()> {
        buf.put_f32_le(*self);
        Ok(())
    }

    fn take_element(reader: &mut MessageReader) -> CodecResult<Self> {
        Ok(reader.take(4)?.get_f32_le())
    }
}

impl Element for f64 {
    const CODE: TypeCode = TypeCode::Float64;

    fn put_element(&self, buf: &mut BytesMut) -> CodecResult<()> {
        buf.put_f64_le(*self);
        Ok(())
    }

    fn take_element(reader: &mut MessageReader) -> CodecResult<Self> {
        Ok(reader.take(8)?.get_f64_le())
    }
}

impl Element for Complex32 {
    const CODE: TypeCode = TypeCode::Complex64;

    fn put_element(&self, buf: &mut BytesMut) -> CodecResult<()> {
        buf.put_f32_le(self.re);
        buf.put_f32_le(self.im);
        Ok(())
    }

    fn take_element(reader: &mut MessageReader) -> CodecResult<Self> {
        let mut chunk = reader.take(8)?;
        let re = chunk.get_f32_le();
        let im = chunk.get_f32_le();
        Ok(Complex32::new(re, im))
    }
}

impl Element for Complex64 {
    const CODE: TypeCode = TypeCode::Complex128;

    fn put_element(&self, buf: &mut BytesMut) -> CodecResult<()> {
        buf.put_f64_le(self.re);
        buf.put_f64_le(self.im);
        Ok(())
    }

    fn take_element(reader: &mut MessageReader) -> CodecResult<Self> {
        let mut chunk = reader.take(16)?;
        let re = chunk.get_f64_le();
        let im = chunk.get_f64_le();
        Ok(Complex64::new(re, im))
    }
}

impl Element for String {
    const CODE: TypeCode = TypeCode::String;

    fn put_element(&self, buf: &mut BytesMut) -> CodecResult<()> {
        put_str(buf, self)
    }

    fn take_element(reader: &mut MessageReader) -> CodecResult<Self> {
        let len = reader.take(4)?.get_u32_le() as usize;
        let bytes = reader.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|err| reader.malformed(format!("string: {err}")))
    }
}

pub(crate) fn put_str(buf: &mut BytesMut, value: &str) -> CodecResult<()> {
    let len = u32::try_from(value.len()).map_err(|_| {
        CodecError::Unrepresentable(format!(
            "string of {} bytes exceeds the u32 length prefix",
            value.len()
        ))
    })?;
    buf.put_u32_le(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}
