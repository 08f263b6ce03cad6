use ndarray::{ArrayD, IxDyn};
use num_complex::{Complex32, Complex64};

use crate::element::{put_str, Element};
use crate::error::{CodecError, CodecResult};
use crate::message::{MessageReader, MessageWriter};
use crate::sealed::Sealed;
use crate::value::{Shape, TypeCode, Value, ValueKind};

/// Types that can be appended to a [`MessageWriter`].
///
/// Scalars of every [`Element`] type, `str`, slices, `Vec`s (rank 1),
/// `ArrayD` of any rank and the dynamic [`Value`].
pub trait Encode: Sealed {
    #[doc(hidden)]
    fn encode(&self, writer: &mut MessageWriter) -> CodecResult<()>;
}

/// Types that can be taken from a [`MessageReader`].
pub trait Decode: Sealed + Sized {
    #[doc(hidden)]
    fn decode(reader: &mut MessageReader) -> CodecResult<Self>;
}

impl Sealed for str {}
impl<T: Element> Sealed for [T] {}
impl<T: Element> Sealed for Vec<T> {}
impl<T: Element> Sealed for ArrayD<T> {}
impl Sealed for Value {}

macro_rules! scalar_wire {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, writer: &mut MessageWriter) -> CodecResult<()> {
                    writer.write_header(<$ty as Element>::CODE, &[])?;
                    self.put_element(writer.buf_mut())
                }
            }

            impl Decode for $ty {
                fn decode(reader: &mut MessageReader) -> CodecResult<Self> {
                    reader.read_header(ValueKind::scalar(<$ty as Element>::CODE))?;
                    <$ty as Element>::take_element(reader)
                }
            }
        )*
    };
}

scalar_wire!(bool, i32, f32, f64, Complex32, Complex64, String);

impl Encode for str {
    fn encode(&self, writer: &mut MessageWriter) -> CodecResult<()> {
        writer.write_header(TypeCode::String, &[])?;
        put_str(writer.buf_mut(), self)
    }
}

impl<T: Element> Encode for [T] {
    fn encode(&self, writer: &mut MessageWriter) -> CodecResult<()> {
        writer.write_header(T::CODE, &[self.len()])?;
        put_elements(writer, self.iter())
    }
}

impl<T: Element> Encode for Vec<T> {
    fn encode(&self, writer: &mut MessageWriter) -> CodecResult<()> {
        self.as_slice().encode(writer)
    }
}

impl<T: Element> Decode for Vec<T> {
    fn decode(reader: &mut MessageReader) -> CodecResult<Self> {
        let shape = reader.read_header(ValueKind::array(T::CODE, 1))?;
        reader.read_elements(&shape)
    }
}

impl<T: Element> Encode for ArrayD<T> {
    fn encode(&self, writer: &mut MessageWriter) -> CodecResult<()> {
        writer.write_header(T::CODE, self.shape())?;
        // `iter` walks in logical (row-major) order whatever the memory layout.
        put_elements(writer, self.iter())
    }
}

impl<T: Element> Decode for ArrayD<T> {
    fn decode(reader: &mut MessageReader) -> CodecResult<Self> {
        let shape = reader.read_header(ValueKind::any_rank(T::CODE))?;
        build_array(reader, &shape)
    }
}

impl Encode for Value {
    /// Array variants of rank 0 are rejected: the wire cannot tell them from a
    /// scalar, so they would come back as a different variant.
    fn encode(&self, writer: &mut MessageWriter) -> CodecResult<()> {
        if self.is_array() && self.shape().is_scalar() {
            return Err(CodecError::Unrepresentable(format!(
                "rank-0 {} array decodes as a scalar",
                self.type_code()
            )));
        }
        match self {
            Value::Bool(v) => v.encode(writer),
            Value::Int32(v) => v.encode(writer),
            Value::Float32(v) => v.encode(writer),
            Value::Float64(v) => v.encode(writer),
            Value::Complex64(v) => v.encode(writer),
            Value::Complex128(v) => v.encode(writer),
            Value::String(v) => v.encode(writer),
            Value::BoolArray(a) => a.encode(writer),
            Value::Int32Array(a) => a.encode(writer),
            Value::Float32Array(a) => a.encode(writer),
            Value::Float64Array(a) => a.encode(writer),
            Value::Complex64Array(a) => a.encode(writer),
            Value::Complex128Array(a) => a.encode(writer),
            Value::StringArray(a) => a.encode(writer),
        }
    }
}

impl Decode for Value {
    /// Rank-0 values decode as scalars, everything else as arrays.
    fn decode(reader: &mut MessageReader) -> CodecResult<Self> {
        let (code, shape) = reader.read_any_header()?;
        if shape.is_scalar() {
            return Ok(match code {
                TypeCode::Bool => Value::Bool(bool::take_element(reader)?),
                TypeCode::Int32 => Value::Int32(i32::take_element(reader)?),
                TypeCode::Float32 => Value::Float32(f32::take_element(reader)?),
                TypeCode::Float64 => Value::Float64(f64::take_element(reader)?),
                TypeCode::Complex64 => Value::Complex64(Complex32::take_element(reader)?),
                TypeCode::Complex128 => Value::Complex128(Complex64::take_element(reader)?),
                TypeCode::String => Value::String(String::take_element(reader)?),
            });
        }
        Ok(match code {
            TypeCode::Bool => Value::BoolArray(build_array(reader, &shape)?),
            TypeCode::Int32 => Value::Int32Array(build_array(reader, &shape)?),
            TypeCode::Float32 => Value::Float32Array(build_array(reader, &shape)?),
            TypeCode::Float64 => Value::Float64Array(build_array(reader, &shape)?),
            TypeCode::Complex64 => Value::Complex64Array(build_array(reader, &shape)?),
            TypeCode::Complex128 => Value::Complex128Array(build_array(reader, &shape)?),
            TypeCode::String => Value::StringArray(build_array(reader, &shape)?),
        })
    }
}

fn put_elements<'a, T: Element>(
    writer: &mut MessageWriter,
    elements: impl Iterator<Item = &'a T>,
) -> CodecResult<()> {
    let buf = writer.buf_mut();
    for element in elements {
        element.put_element(buf)?;
    }
    Ok(())
}

fn build_array<T: Element>(reader: &mut MessageReader, shape: &Shape) -> CodecResult<ArrayD<T>> {
    let elements = reader.read_elements::<T>(shape)?;
    ArrayD::from_shape_vec(IxDyn(shape.dims()), elements)
        .map_err(|err| reader.malformed(format!("shape {shape}: {err}")))
}
