use std::fmt;

use ndarray::ArrayD;
use num_complex::{Complex32, Complex64};
use smallvec::SmallVec;

/// Discriminant written in front of every value.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Bool = 1,
    Int32 = 2,
    Float32 = 3,
    Float64 = 4,
    /// Pair of `f32` (re, im).
    Complex64 = 5,
    /// Pair of `f64` (re, im).
    Complex128 = 6,
    String = 7,
}

impl TypeCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(TypeCode::Bool),
            2 => Some(TypeCode::Int32),
            3 => Some(TypeCode::Float32),
            4 => Some(TypeCode::Float64),
            5 => Some(TypeCode::Complex64),
            6 => Some(TypeCode::Complex128),
            7 => Some(TypeCode::String),
            _ => None,
        }
    }

    /// Encoded size of one element, or `None` for length-prefixed strings.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            TypeCode::Bool => Some(1),
            TypeCode::Int32 | TypeCode::Float32 => Some(4),
            TypeCode::Float64 | TypeCode::Complex64 => Some(8),
            TypeCode::Complex128 => Some(16),
            TypeCode::String => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeCode::Bool => "Bool",
            TypeCode::Int32 => "Int32",
            TypeCode::Float32 => "Float32",
            TypeCode::Float64 => "Float64",
            TypeCode::Complex64 => "Complex64",
            TypeCode::Complex128 => "Complex128",
            TypeCode::String => "String",
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Array extents in row-major order. Empty for scalars.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Shape(SmallVec<[usize; 4]>);

impl Shape {
    pub fn scalar() -> Self {
        Self(SmallVec::new())
    }

    pub fn new(dims: &[usize]) -> Self {
        Self(SmallVec::from_slice(dims))
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of elements described by the shape, `None` on overflow.
    pub fn element_count(&self) -> Option<usize> {
        self.0
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    pub(crate) fn push(&mut self, dim: usize) {
        self.0.push(dim);
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_scalar() {
            return f.write_str("scalar");
        }
        write!(f, "{:?}", self.dims())
    }
}

/// Type and rank of a value; `rank: None` stands for "array of any rank".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueKind {
    pub code: TypeCode,
    pub rank: Option<usize>,
}

impl ValueKind {
    pub const fn scalar(code: TypeCode) -> Self {
        Self {
            code,
            rank: Some(0),
        }
    }

    pub const fn array(code: TypeCode, rank: usize) -> Self {
        Self {
            code,
            rank: Some(rank),
        }
    }

    pub const fn any_rank(code: TypeCode) -> Self {
        Self { code, rank: None }
    }

    /// Whether a value of kind `found` satisfies this expectation.
    pub fn accepts(&self, found: &ValueKind) -> bool {
        self.code == found.code && self.rank.map_or(true, |rank| Some(rank) == found.rank)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rank {
            Some(0) => write!(f, "{}", self.code),
            Some(rank) => write!(f, "{} array of rank {rank}", self.code),
            None => write!(f, "{} array", self.code),
        }
    }
}

/// A single decoded value of any supported type.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Float32(f32),
    Float64(f64),
    Complex64(Complex32),
    Complex128(Complex64),
    String(String),
    BoolArray(ArrayD<bool>),
    Int32Array(ArrayD<i32>),
    Float32Array(ArrayD<f32>),
    Float64Array(ArrayD<f64>),
    Complex64Array(ArrayD<Complex32>),
    Complex128Array(ArrayD<Complex64>),
    StringArray(ArrayD<String>),
}

impl Value {
    pub fn type_code(&self) -> TypeCode {
        match self {
            Value::Bool(_) | Value::BoolArray(_) => TypeCode::Bool,
            Value::Int32(_) | Value::Int32Array(_) => TypeCode::Int32,
            Value::Float32(_) | Value::Float32Array(_) => TypeCode::Float32,
            Value::Float64(_) | Value::Float64Array(_) => TypeCode::Float64,
            Value::Complex64(_) | Value::Complex64Array(_) => TypeCode::Complex64,
            Value::Complex128(_) | Value::Complex128Array(_) => TypeCode::Complex128,
            Value::String(_) | Value::StringArray(_) => TypeCode::String,
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Value::Bool(_)
            | Value::Int32(_)
            | Value::Float32(_)
            | Value::Float64(_)
            | Value::Complex64(_)
            | Value::Complex128(_)
            | Value::String(_) => Shape::scalar(),
            Value::BoolArray(a) => Shape::new(a.shape()),
            Value::Int32Array(a) => Shape::new(a.shape()),
            Value::Float32Array(a) => Shape::new(a.shape()),
            Value::Float64Array(a) => Shape::new(a.shape()),
            Value::Complex64Array(a) => Shape::new(a.shape()),
            Value::Complex128Array(a) => Shape::new(a.shape()),
            Value::StringArray(a) => Shape::new(a.shape()),
        }
    }

    /// True for the array variants, whatever their rank.
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Value::BoolArray(_)
                | Value::Int32Array(_)
                | Value::Float32Array(_)
                | Value::Float64Array(_)
                | Value::Complex64Array(_)
                | Value::Complex128Array(_)
                | Value::StringArray(_)
        )
    }

    pub fn kind(&self) -> ValueKind {
        ValueKind::array(self.type_code(), self.shape().rank())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn type_codes_round_trip_through_u8() {
        for code in [
            TypeCode::Bool,
            TypeCode::Int32,
            TypeCode::Float32,
            TypeCode::Float64,
            TypeCode::Complex64,
            TypeCode::Complex128,
            TypeCode::String,
        ] {
            assert_eq!(TypeCode::from_u8(code as u8), Some(code));
        }
        assert_eq!(TypeCode::from_u8(0), None);
        assert_eq!(TypeCode::from_u8(8), None);
    }

    #[test]
    fn shape_counts_elements() {
        assert_eq!(Shape::scalar().element_count(), Some(1));
        assert_eq!(Shape::new(&[2, 3, 4]).element_count(), Some(24));
        assert_eq!(Shape::new(&[5, 0]).element_count(), Some(0));
        assert_eq!(Shape::new(&[usize::MAX, 2]).element_count(), None);
        assert_eq!(Shape::new(&[2, 3]).to_string(), "[2, 3]");
    }

    #[test]
    fn any_rank_kind_accepts_every_rank_of_its_code() {
        let expected = ValueKind::any_rank(TypeCode::Float64);
        assert!(expected.accepts(&ValueKind::array(TypeCode::Float64, 3)));
        assert!(expected.accepts(&ValueKind::scalar(TypeCode::Float64)));
        assert!(!expected.accepts(&ValueKind::array(TypeCode::Float32, 1)));
        assert!(!ValueKind::array(TypeCode::Int32, 1).accepts(&ValueKind::array(TypeCode::Int32, 2)));
    }

    #[test]
    fn value_reports_kind() {
        let value = Value::Int32Array(ArrayD::zeros(IxDyn(&[2, 2])));
        assert_eq!(value.kind(), ValueKind::array(TypeCode::Int32, 2));
        assert_eq!(value.kind().to_string(), "Int32 array of rank 2");
        assert_eq!(Value::Bool(true).kind().to_string(), "Bool");
    }
}
