//! Instruction constructors.
//!
//! Every `make_*` function appends one instruction to a computation, derives
//! its result shape from the operands and fails with [`IrError`] when the
//! operands do not fit the operation. New instructions are named after their
//! opcode and arena index, e.g. `reshape.12`.

use crate::computation::Computation;
use crate::error::IrError;
use crate::gather::GatherDimensionNumbers;
use crate::instr::{ComparisonDirection, ComputationId, InstrId, Instruction, Op};
use crate::literal::Literal;
use crate::shape_inference::{check_shape, infer_shape};
use crate::types::{PrimitiveType, Shape};

fn operand_shapes(comp: &Computation, operands: &[InstrId]) -> Result<Vec<Shape>, IrError> {
    operands
        .iter()
        .map(|&id| {
            comp.try_instruction(id)
                .map(|instr| instr.shape.clone())
                .ok_or(IrError::BadHandle {
                    kind: "instruction",
                    index: id.index(),
                })
        })
        .collect()
}

fn push(comp: &mut Computation, op: Op, operands: Vec<InstrId>, shape: Shape) -> InstrId {
    let name = comp.fresh_name(op.opcode().name());
    comp.add_instruction(Instruction::new(name, op, operands, shape))
}

/// Appends an instruction whose shape is inferred.
fn make_inferred(comp: &mut Computation, op: Op, operands: Vec<InstrId>) -> Result<InstrId, IrError> {
    let shapes = operand_shapes(comp, &operands)?;
    let refs: Vec<&Shape> = shapes.iter().collect();
    let shape = infer_shape(&op, &refs)?;
    Ok(push(comp, op, operands, shape))
}

/// Appends an instruction with a caller-chosen shape, after checking it.
fn make_checked(
    comp: &mut Computation,
    op: Op,
    operands: Vec<InstrId>,
    shape: Shape,
) -> Result<InstrId, IrError> {
    let shapes = operand_shapes(comp, &operands)?;
    let refs: Vec<&Shape> = shapes.iter().collect();
    check_shape(&op, &refs, &shape)?;
    Ok(push(comp, op, operands, shape))
}

pub fn make_constant(comp: &mut Computation, literal: Literal) -> InstrId {
    let shape = literal.shape().clone();
    push(comp, Op::Constant(literal), Vec::new(), shape)
}

/// A scalar zero of `element_type`.
pub fn make_zero(comp: &mut Computation, element_type: PrimitiveType) -> InstrId {
    make_constant(comp, Literal::scalar(element_type, 0))
}

/// A zero-filled array of `shape`, built as a broadcast scalar.
pub fn make_zeros(comp: &mut Computation, shape: &Shape) -> Result<InstrId, IrError> {
    let Some(element_type) = shape.element_type() else {
        return Err(IrError::InvalidAttribute(format!(
            "cannot build zeros of tuple shape {shape}"
        )));
    };
    let zero = make_zero(comp, element_type);
    make_broadcast(comp, zero, &[], shape.dims())
}

pub fn make_add(comp: &mut Computation, lhs: InstrId, rhs: InstrId) -> Result<InstrId, IrError> {
    make_inferred(comp, Op::Add, vec![lhs, rhs])
}

pub fn make_compare(
    comp: &mut Computation,
    lhs: InstrId,
    rhs: InstrId,
    direction: ComparisonDirection,
) -> Result<InstrId, IrError> {
    make_inferred(comp, Op::Compare { direction }, vec![lhs, rhs])
}

/// `clamp(min, x, max)`.
pub fn make_clamp(
    comp: &mut Computation,
    min: InstrId,
    x: InstrId,
    max: InstrId,
) -> Result<InstrId, IrError> {
    make_inferred(comp, Op::Clamp, vec![min, x, max])
}

/// Broadcasts `operand` to extents `dims`; operand axis `i` becomes output
/// axis `dimensions[i]`.
pub fn make_broadcast(
    comp: &mut Computation,
    operand: InstrId,
    dimensions: &[usize],
    dims: &[i64],
) -> Result<InstrId, IrError> {
    let shape = operand_shapes(comp, &[operand])?[0].with_dims(dims.to_vec());
    make_checked(
        comp,
        Op::Broadcast {
            dimensions: dimensions.to_vec(),
        },
        vec![operand],
        shape,
    )
}

pub fn make_reshape(comp: &mut Computation, operand: InstrId, dims: &[i64]) -> Result<InstrId, IrError> {
    let shape = operand_shapes(comp, &[operand])?[0].with_dims(dims.to_vec());
    make_checked(comp, Op::Reshape, vec![operand], shape)
}

/// Like [`make_reshape`], but returns `operand` when it already has `dims`.
pub fn make_reshape_if_needed(
    comp: &mut Computation,
    operand: InstrId,
    dims: &[i64],
) -> Result<InstrId, IrError> {
    if comp.shape(operand).is_array() && comp.shape(operand).dims() == dims {
        return Ok(operand);
    }
    make_reshape(comp, operand, dims)
}

pub fn make_convert(
    comp: &mut Computation,
    operand: InstrId,
    element_type: PrimitiveType,
) -> Result<InstrId, IrError> {
    let shape = operand_shapes(comp, &[operand])?[0].with_element_type(element_type);
    make_checked(comp, Op::Convert, vec![operand], shape)
}

/// Like [`make_convert`], but returns `operand` when it already has
/// `element_type`.
pub fn make_convert_if_needed(
    comp: &mut Computation,
    operand: InstrId,
    element_type: PrimitiveType,
) -> Result<InstrId, IrError> {
    if comp.shape(operand).element_type() == Some(element_type) {
        return Ok(operand);
    }
    make_convert(comp, operand, element_type)
}

pub fn make_transpose(
    comp: &mut Computation,
    operand: InstrId,
    permutation: &[usize],
) -> Result<InstrId, IrError> {
    make_inferred(
        comp,
        Op::Transpose {
            permutation: permutation.to_vec(),
        },
        vec![operand],
    )
}

/// Like [`make_transpose`], but returns `operand` for the identity permutation.
pub fn make_transpose_if_needed(
    comp: &mut Computation,
    operand: InstrId,
    permutation: &[usize],
) -> Result<InstrId, IrError> {
    let identity = permutation.iter().enumerate().all(|(i, &p)| i == p);
    if identity && comp.shape(operand).rank() == permutation.len() {
        return Ok(operand);
    }
    make_transpose(comp, operand, permutation)
}

pub fn make_slice(
    comp: &mut Computation,
    operand: InstrId,
    starts: &[i64],
    limits: &[i64],
) -> Result<InstrId, IrError> {
    make_inferred(
        comp,
        Op::Slice {
            starts: starts.to_vec(),
            limits: limits.to_vec(),
        },
        vec![operand],
    )
}

pub fn make_dynamic_slice(
    comp: &mut Computation,
    operand: InstrId,
    start: InstrId,
    sizes: &[i64],
) -> Result<InstrId, IrError> {
    make_inferred(
        comp,
        Op::DynamicSlice {
            sizes: sizes.to_vec(),
        },
        vec![operand, start],
    )
}

pub fn make_dynamic_update_slice(
    comp: &mut Computation,
    operand: InstrId,
    update: InstrId,
    start: InstrId,
) -> Result<InstrId, IrError> {
    make_inferred(comp, Op::DynamicUpdateSlice, vec![operand, update, start])
}

pub fn make_concatenate(
    comp: &mut Computation,
    operands: &[InstrId],
    dimension: usize,
) -> Result<InstrId, IrError> {
    make_inferred(comp, Op::Concatenate { dimension }, operands.to_vec())
}

pub fn make_tuple(comp: &mut Computation, elements: &[InstrId]) -> Result<InstrId, IrError> {
    make_inferred(comp, Op::Tuple, elements.to_vec())
}

pub fn make_get_tuple_element(
    comp: &mut Computation,
    tuple: InstrId,
    index: usize,
) -> Result<InstrId, IrError> {
    make_inferred(comp, Op::GetTupleElement { index }, vec![tuple])
}

/// A loop over `init`. The computations are not inspected here; the
/// verifier checks them against the state shape.
pub fn make_while(
    comp: &mut Computation,
    condition: ComputationId,
    body: ComputationId,
    init: InstrId,
) -> Result<InstrId, IrError> {
    make_inferred(comp, Op::While { condition, body }, vec![init])
}

pub fn make_gather(
    comp: &mut Computation,
    operand: InstrId,
    start_indices: InstrId,
    dimension_numbers: GatherDimensionNumbers,
    slice_sizes: &[i64],
) -> Result<InstrId, IrError> {
    make_inferred(
        comp,
        Op::Gather {
            dimension_numbers,
            slice_sizes: slice_sizes.to_vec(),
        },
        vec![operand, start_indices],
    )
}

/// Removes the listed unit axes from `operand`.
pub fn elide_degenerate_dims(
    comp: &mut Computation,
    operand: InstrId,
    axes: &[usize],
) -> Result<InstrId, IrError> {
    let dims = comp.shape(operand).dims().to_vec();
    for &axis in axes {
        if dims.get(axis) != Some(&1) {
            return Err(IrError::shape(
                "reshape",
                format!("axis {axis} of {} is not degenerate", comp.shape(operand)),
            ));
        }
    }
    let kept = crate::types::delete_dims(&dims, axes);
    make_reshape_if_needed(comp, operand, &kept)
}

/// Prepends `n` unit axes to `operand`.
pub fn prepend_degenerate_dims(
    comp: &mut Computation,
    operand: InstrId,
    n: usize,
) -> Result<InstrId, IrError> {
    let mut dims = vec![1; n];
    dims.extend_from_slice(comp.shape(operand).dims());
    make_reshape_if_needed(comp, operand, &dims)
}

/// Merges the first `n` axes of `operand` into one.
pub fn collapse_first_n_dims(
    comp: &mut Computation,
    operand: InstrId,
    n: usize,
) -> Result<InstrId, IrError> {
    let dims = comp.shape(operand).dims().to_vec();
    if n == 0 || n > dims.len() {
        return Err(IrError::shape(
            "reshape",
            format!("cannot collapse {n} leading axes of {}", comp.shape(operand)),
        ));
    }
    let mut collapsed = vec![dims[..n].iter().product()];
    collapsed.extend_from_slice(&dims[n..]);
    make_reshape_if_needed(comp, operand, &collapsed)
}

/// Splits the first axis of `operand` into `expanded`, whose extents must
/// multiply to the first axis' extent. An empty `expanded` removes the axis,
/// which must then be 1.
pub fn expand_first_dim_into_n_dims(
    comp: &mut Computation,
    operand: InstrId,
    expanded: &[i64],
) -> Result<InstrId, IrError> {
    let dims = comp.shape(operand).dims().to_vec();
    let Some((&first, rest)) = dims.split_first() else {
        return Err(IrError::shape("reshape", "cannot expand the first axis of a scalar"));
    };
    if expanded.iter().product::<i64>() != first {
        return Err(IrError::shape(
            "reshape",
            format!("{expanded:?} does not multiply to leading extent {first}"),
        ));
    }
    let mut new_dims = expanded.to_vec();
    new_dims.extend_from_slice(rest);
    make_reshape_if_needed(comp, operand, &new_dims)
}

/// Pads a rank-1 `operand` with zeros on both sides.
pub fn pad_vector_with_zeros(
    comp: &mut Computation,
    operand: InstrId,
    zeros_before: usize,
    zeros_after: usize,
) -> Result<InstrId, IrError> {
    let shape = comp.shape(operand).clone();
    let (Some(element_type), 1) = (shape.element_type(), shape.rank()) else {
        return Err(IrError::shape("concatenate", format!("{shape} is not a vector")));
    };
    let mut pieces = Vec::with_capacity(3);
    if zeros_before > 0 {
        let zeros = vec![0; zeros_before];
        pieces.push(make_constant(comp, Literal::vector(element_type, &zeros)));
    }
    pieces.push(operand);
    if zeros_after > 0 {
        let zeros = vec![0; zeros_after];
        pieces.push(make_constant(comp, Literal::vector(element_type, &zeros)));
    }
    if pieces.len() == 1 {
        return Ok(operand);
    }
    make_concatenate(comp, &pieces, 0)
}
