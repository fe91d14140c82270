//! Dense array constants.
//!
//! Every element is held as an `i64` payload: integers by value (wrapped to
//! their bit width), predicates as `0`/`1`, floating-point values as their
//! IEEE bit pattern. Moving elements around is therefore bit-exact for every
//! element type.

use std::fmt;

use crate::error::IrError;
use crate::types::{PrimitiveType, Shape};

/// A constant array value.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Literal {
    shape: Shape,
    data: Vec<i64>,
}

impl Literal {
    /// Builds a literal, checking that `data` fills `shape` exactly.
    pub fn new(shape: Shape, data: Vec<i64>) -> Result<Self, IrError> {
        let Some(element_type) = shape.element_type() else {
            return Err(IrError::InvalidAttribute(format!(
                "literal shape must be an array, got {shape}"
            )));
        };
        if shape.dims().iter().any(|&d| d < 0) {
            return Err(IrError::InvalidAttribute(format!(
                "literal shape {shape} has a negative extent"
            )));
        }
        let expected = shape.element_count();
        if data.len() as i64 != expected {
            return Err(IrError::InvalidAttribute(format!(
                "literal of shape {shape} needs {expected} elements, got {}",
                data.len()
            )));
        }
        let data = data
            .into_iter()
            .map(|v| normalize(element_type, v))
            .collect();
        Ok(Self { shape, data })
    }

    pub fn scalar(element_type: PrimitiveType, value: i64) -> Self {
        Self {
            shape: Shape::scalar(element_type),
            data: vec![normalize(element_type, value)],
        }
    }

    pub fn vector(element_type: PrimitiveType, values: &[i64]) -> Self {
        Self {
            shape: Shape::array(element_type, [values.len() as i64]),
            data: values.iter().map(|&v| normalize(element_type, v)).collect(),
        }
    }

    /// A literal of `shape` with every payload set to zero (`0`, `false`, `+0.0`).
    pub fn zeros(shape: &Shape) -> Result<Self, IrError> {
        let count = usize::try_from(shape.element_count()).unwrap_or(0);
        Self::new(shape.clone(), vec![0; count])
    }

    /// A literal whose elements are `0, 1, 2, ...` in row-major order.
    pub fn iota(shape: &Shape) -> Result<Self, IrError> {
        let count = shape.element_count().max(0);
        Self::new(shape.clone(), (0..count).collect())
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[i64] {
        self.shape.dims()
    }

    pub fn element_type(&self) -> PrimitiveType {
        self.shape
            .element_type()
            .unwrap_or_else(|| unreachable!("literal shapes are always arrays"))
    }

    pub fn data(&self) -> &[i64] {
        &self.data
    }

    pub fn into_data(self) -> Vec<i64> {
        self.data
    }

    /// The element at a multi-dimensional index. Panics when out of range.
    pub fn get(&self, index: &[i64]) -> i64 {
        self.data[linear_index(self.dims(), index)]
    }

    pub fn set(&mut self, index: &[i64], value: i64) {
        let element_type = self.element_type();
        let at = linear_index(self.shape.dims(), index);
        self.data[at] = normalize(element_type, value);
    }

    /// Same payload reinterpreted with new extents of equal element count.
    pub fn reshape(&self, dims: &[i64]) -> Result<Self, IrError> {
        Self::new(self.shape.with_dims(dims.to_vec()), self.data.clone())
    }
}

/// Row-major strides for `dims`.
pub fn strides(dims: &[i64]) -> Vec<i64> {
    let mut strides = vec![1; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}

/// Row-major position of `index` within `dims`.
pub fn linear_index(dims: &[i64], index: &[i64]) -> usize {
    debug_assert_eq!(dims.len(), index.len());
    strides(dims)
        .iter()
        .zip(index)
        .map(|(s, i)| s * i)
        .sum::<i64>() as usize
}

/// Calls `f` with every index of `dims` in row-major order.
pub fn for_each_index(dims: &[i64], mut f: impl FnMut(&[i64])) {
    if dims.contains(&0) {
        return;
    }
    let mut index = vec![0i64; dims.len()];
    loop {
        f(&index);
        let mut axis = dims.len();
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < dims[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}

/// Wraps an integer payload to the width of `element_type`.
pub fn normalize(element_type: PrimitiveType, value: i64) -> i64 {
    let width = element_type.bit_width();
    match element_type {
        PrimitiveType::Pred => i64::from(value != 0),
        ty if ty.is_signed_integral() && width < 64 => {
            let shift = 64 - width;
            (value << shift) >> shift
        }
        _ if width < 64 => value & ((1i64 << width) - 1),
        _ => value,
    }
}

/// Text spelling of one element payload.
///
/// `f16`/`bf16` are written as hexadecimal bit patterns.
pub fn format_element(element_type: PrimitiveType, value: i64) -> String {
    match element_type {
        PrimitiveType::Pred => (value != 0).to_string(),
        PrimitiveType::U64 => (value as u64).to_string(),
        PrimitiveType::F32 => format!("{:?}", f32::from_bits(value as u32)),
        PrimitiveType::F64 => format!("{:?}", f64::from_bits(value as u64)),
        PrimitiveType::F16 | PrimitiveType::Bf16 => format!("0x{:04x}", value as u16),
        _ => value.to_string(),
    }
}

/// Parses one element written by [`format_element`].
pub fn parse_element(element_type: PrimitiveType, text: &str) -> Option<i64> {
    let text = text.trim();
    let value = match element_type {
        PrimitiveType::Pred => match text {
            "true" | "1" => 1,
            "false" | "0" => 0,
            _ => return None,
        },
        PrimitiveType::U64 => text.parse::<u64>().ok()? as i64,
        PrimitiveType::F32 => i64::from(parse_float(text)?.to_bits()),
        PrimitiveType::F64 => parse_double(text)?.to_bits() as i64,
        PrimitiveType::F16 | PrimitiveType::Bf16 => {
            let hex = text.strip_prefix("0x")?;
            i64::from(u16::from_str_radix(hex, 16).ok()?)
        }
        _ => text.parse::<i64>().ok()?,
    };
    Some(normalize(element_type, value))
}

fn parse_float(text: &str) -> Option<f32> {
    match text {
        "inf" => Some(f32::INFINITY),
        "-inf" => Some(f32::NEG_INFINITY),
        "nan" | "NaN" => Some(f32::NAN),
        _ => text.parse().ok(),
    }
}

fn parse_double(text: &str) -> Option<f64> {
    match text {
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        "nan" | "NaN" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let element_type = self.element_type();
        let dims = self.dims();
        if dims.is_empty() {
            return f.write_str(&format_element(element_type, self.data[0]));
        }
        fn write_level(
            f: &mut fmt::Formatter<'_>,
            element_type: PrimitiveType,
            dims: &[i64],
            data: &[i64],
        ) -> fmt::Result {
            f.write_str("{")?;
            if dims.len() == 1 {
                for (i, v) in data.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&format_element(element_type, *v))?;
                }
            } else {
                let chunk = dims[1..].iter().product::<i64>().max(1) as usize;
                for i in 0..dims[0] as usize {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    let start = (i * chunk).min(data.len());
                    let end = (start + chunk).min(data.len());
                    write_level(f, element_type, &dims[1..], &data[start..end])?;
                }
            }
            f.write_str("}")
        }
        write_level(f, element_type, dims, &self.data)
    }
}
