//! Instructions and their operations.

use std::fmt;

use crate::arena::Handle;
use crate::computation::Computation;
use crate::gather::GatherDimensionNumbers;
use crate::literal::Literal;
use crate::types::Shape;

/// Identifier of an instruction inside its computation.
pub type InstrId = Handle<Instruction>;

/// Identifier of a computation inside its module.
pub type ComputationId = Handle<Computation>;

/// Comparison performed by [`Op::Compare`].
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ComparisonDirection {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonDirection {
    pub fn name(self) -> &'static str {
        match self {
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Gt => "GT",
            Self::Ge => "GE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Eq, Self::Ne, Self::Lt, Self::Le, Self::Gt, Self::Ge]
            .into_iter()
            .find(|d| d.name() == name)
    }
}

/// The operation an instruction performs, together with its attributes.
///
/// Operand conventions:
/// - `Add`, `Compare`: `(lhs, rhs)`, same array shape.
/// - `Clamp`: `(min, x, max)`, same array shape.
/// - `DynamicSlice`: `(operand, start)` where `start` is a rank-1 integral
///   vector with one entry per operand axis.
/// - `DynamicUpdateSlice`: `(operand, update, start)`.
/// - `Gather`: `(operand, start_indices)`.
/// - `While`: `(init)`, a tuple threaded through `condition` and `body`.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Parameter {
        number: usize,
    },
    Constant(Literal),
    Add,
    Compare {
        direction: ComparisonDirection,
    },
    Clamp,
    /// Operand axis `i` maps to output axis `dimensions[i]`.
    Broadcast {
        dimensions: Vec<usize>,
    },
    Reshape,
    /// Integer conversion to the result's element type, keeping the value
    /// and wrapping to the target width.
    Convert,
    /// Output axis `i` is operand axis `permutation[i]`.
    Transpose {
        permutation: Vec<usize>,
    },
    /// Static slice with unit strides, `[starts, limits)` per axis.
    Slice {
        starts: Vec<i64>,
        limits: Vec<i64>,
    },
    /// Slice of static extent `sizes` at a runtime start, clamped so the
    /// slice stays in bounds.
    DynamicSlice {
        sizes: Vec<i64>,
    },
    /// Overwrites a region of the operand, start clamped like `DynamicSlice`.
    DynamicUpdateSlice,
    Concatenate {
        dimension: usize,
    },
    Tuple,
    GetTupleElement {
        index: usize,
    },
    While {
        condition: ComputationId,
        body: ComputationId,
    },
    Gather {
        dimension_numbers: GatherDimensionNumbers,
        slice_sizes: Vec<i64>,
    },
}

/// Field-less tag of an [`Op`], for queries.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Opcode {
    Parameter,
    Constant,
    Add,
    Compare,
    Clamp,
    Broadcast,
    Reshape,
    Convert,
    Transpose,
    Slice,
    DynamicSlice,
    DynamicUpdateSlice,
    Concatenate,
    Tuple,
    GetTupleElement,
    While,
    Gather,
}

impl Opcode {
    pub const ALL: [Opcode; 17] = [
        Self::Parameter,
        Self::Constant,
        Self::Add,
        Self::Compare,
        Self::Clamp,
        Self::Broadcast,
        Self::Reshape,
        Self::Convert,
        Self::Transpose,
        Self::Slice,
        Self::DynamicSlice,
        Self::DynamicUpdateSlice,
        Self::Concatenate,
        Self::Tuple,
        Self::GetTupleElement,
        Self::While,
        Self::Gather,
    ];

    /// Text-format spelling.
    pub fn name(self) -> &'static str {
        match self {
            Self::Parameter => "parameter",
            Self::Constant => "constant",
            Self::Add => "add",
            Self::Compare => "compare",
            Self::Clamp => "clamp",
            Self::Broadcast => "broadcast",
            Self::Reshape => "reshape",
            Self::Convert => "convert",
            Self::Transpose => "transpose",
            Self::Slice => "slice",
            Self::DynamicSlice => "dynamic-slice",
            Self::DynamicUpdateSlice => "dynamic-update-slice",
            Self::Concatenate => "concatenate",
            Self::Tuple => "tuple",
            Self::GetTupleElement => "get-tuple-element",
            Self::While => "while",
            Self::Gather => "gather",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Op {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Parameter { .. } => Opcode::Parameter,
            Self::Constant(_) => Opcode::Constant,
            Self::Add => Opcode::Add,
            Self::Compare { .. } => Opcode::Compare,
            Self::Clamp => Opcode::Clamp,
            Self::Broadcast { .. } => Opcode::Broadcast,
            Self::Reshape => Opcode::Reshape,
            Self::Convert => Opcode::Convert,
            Self::Transpose { .. } => Opcode::Transpose,
            Self::Slice { .. } => Opcode::Slice,
            Self::DynamicSlice { .. } => Opcode::DynamicSlice,
            Self::DynamicUpdateSlice => Opcode::DynamicUpdateSlice,
            Self::Concatenate { .. } => Opcode::Concatenate,
            Self::Tuple => Opcode::Tuple,
            Self::GetTupleElement { .. } => Opcode::GetTupleElement,
            Self::While { .. } => Opcode::While,
            Self::Gather { .. } => Opcode::Gather,
        }
    }

    /// Computations this op calls, in `(condition, body)` order for loops.
    pub fn called_computations(&self) -> Vec<ComputationId> {
        match self {
            Self::While { condition, body } => vec![*condition, *body],
            _ => Vec::new(),
        }
    }
}

/// Provenance carried from the framework that produced an instruction.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct OpMetadata {
    pub op_type: String,
    pub op_name: String,
    pub source_file: String,
    pub source_line: u32,
}

impl OpMetadata {
    /// Metadata naming only the originating operation.
    pub fn named(op_name: impl Into<String>) -> Self {
        Self {
            op_name: op_name.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One node of a computation.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    /// Name, unique within the computation.
    pub name: String,
    pub op: Op,
    pub operands: Vec<InstrId>,
    pub shape: Shape,
    pub metadata: OpMetadata,
}

impl Instruction {
    pub fn new(name: impl Into<String>, op: Op, operands: Vec<InstrId>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            op,
            operands,
            shape,
            metadata: OpMetadata::default(),
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.op.opcode()
    }

    pub fn operand(&self, i: usize) -> Option<InstrId> {
        self.operands.get(i).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_names_round_trip() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_name(op.name()), Some(op));
        }
        assert_eq!(Opcode::from_name("scatter"), None);
    }

    #[test]
    fn comparison_direction_names() {
        assert_eq!(ComparisonDirection::from_name("LT"), Some(ComparisonDirection::Lt));
        assert_eq!(ComparisonDirection::Ge.name(), "GE");
        assert_eq!(ComparisonDirection::from_name("lt"), None);
    }

    #[test]
    fn metadata_emptiness() {
        assert!(OpMetadata::default().is_empty());
        let md = OpMetadata::named("Gather");
        assert!(!md.is_empty());
        assert_eq!(md.op_name, "Gather");
    }
}
