//! Element types and shapes.

use std::fmt;

/// Scalar element type of an array shape.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum PrimitiveType {
    Pred,
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    F16,
    Bf16,
    F32,
    F64,
}

impl PrimitiveType {
    /// All element types, in text-format order.
    pub const ALL: [PrimitiveType; 13] = [
        Self::Pred,
        Self::S8,
        Self::S16,
        Self::S32,
        Self::S64,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::F16,
        Self::Bf16,
        Self::F32,
        Self::F64,
    ];

    /// Text-format spelling (`s32`, `f32`, `pred`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Self::Pred => "pred",
            Self::S8 => "s8",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::S64 => "s64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F16 => "f16",
            Self::Bf16 => "bf16",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.name() == name)
    }

    /// Signed or unsigned integer; the only types usable as indices.
    pub fn is_integral(self) -> bool {
        self.is_signed_integral() || self.is_unsigned_integral()
    }

    pub fn is_signed_integral(self) -> bool {
        matches!(self, Self::S8 | Self::S16 | Self::S32 | Self::S64)
    }

    pub fn is_unsigned_integral(self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    pub fn is_floating_point(self) -> bool {
        matches!(self, Self::F16 | Self::Bf16 | Self::F32 | Self::F64)
    }

    pub fn bit_width(self) -> u32 {
        match self {
            Self::Pred | Self::S8 | Self::U8 => 8,
            Self::S16 | Self::U16 | Self::F16 | Self::Bf16 => 16,
            Self::S32 | Self::U32 | Self::F32 => 32,
            Self::S64 | Self::U64 | Self::F64 => 64,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of an instruction result: a dense array or a tuple of shapes.
///
/// Layouts are not modeled; every array is row-major.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Shape {
    Array {
        element_type: PrimitiveType,
        dims: Vec<i64>,
    },
    Tuple(Vec<Shape>),
}

impl Shape {
    pub fn array(element_type: PrimitiveType, dims: impl Into<Vec<i64>>) -> Self {
        Self::Array {
            element_type,
            dims: dims.into(),
        }
    }

    pub fn scalar(element_type: PrimitiveType) -> Self {
        Self::array(element_type, Vec::new())
    }

    pub fn tuple(elements: impl Into<Vec<Shape>>) -> Self {
        Self::Tuple(elements.into())
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Self::Tuple(_))
    }

    /// Extents of an array shape; empty for tuples.
    pub fn dims(&self) -> &[i64] {
        match self {
            Self::Array { dims, .. } => dims,
            Self::Tuple(_) => &[],
        }
    }

    pub fn rank(&self) -> usize {
        self.dims().len()
    }

    /// Element type of an array shape.
    pub fn element_type(&self) -> Option<PrimitiveType> {
        match self {
            Self::Array { element_type, .. } => Some(*element_type),
            Self::Tuple(_) => None,
        }
    }

    pub fn tuple_elements(&self) -> &[Shape] {
        match self {
            Self::Array { .. } => &[],
            Self::Tuple(elements) => elements,
        }
    }

    pub fn tuple_element(&self, index: usize) -> Option<&Shape> {
        self.tuple_elements().get(index)
    }

    /// Product of the extents, saturating; `1` for scalars, `0` for tuples.
    pub fn element_count(&self) -> i64 {
        match self {
            Self::Array { dims, .. } => dims.iter().fold(1i64, |acc, &d| acc.saturating_mul(d)),
            Self::Tuple(_) => 0,
        }
    }

    pub fn is_zero_element_array(&self) -> bool {
        self.is_array() && self.dims().contains(&0)
    }

    /// Two array shapes with identical extents, ignoring element type.
    pub fn same_dimensions(&self, other: &Shape) -> bool {
        self.is_array() && other.is_array() && self.dims() == other.dims()
    }

    /// Same shape with a different element type. Tuples are returned unchanged.
    pub fn with_element_type(&self, element_type: PrimitiveType) -> Shape {
        match self {
            Self::Array { dims, .. } => Shape::array(element_type, dims.clone()),
            Self::Tuple(_) => self.clone(),
        }
    }

    /// Same element type with new extents.
    pub fn with_dims(&self, dims: impl Into<Vec<i64>>) -> Shape {
        match self {
            Self::Array { element_type, .. } => Shape::array(*element_type, dims),
            Self::Tuple(_) => self.clone(),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array { element_type, dims } => {
                write!(f, "{element_type}[")?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{d}")?;
                }
                f.write_str("]")
            }
            Self::Tuple(elements) => {
                f.write_str("(")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Removes the listed axes from `dims`. Axes out of range are ignored.
pub fn delete_dims(dims: &[i64], axes: &[usize]) -> Vec<i64> {
    dims.iter()
        .enumerate()
        .filter(|(i, _)| !axes.contains(i))
        .map(|(_, &d)| d)
        .collect()
}
