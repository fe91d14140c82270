//! Canonical gather layout.
//!
//! The loop rewrite works on indices of shape `[N]` (scalar indices) or
//! `[N, k]` (index vectors), where `N` is the number of indices and `k` the
//! length of an index vector, and produces an accumulator of shape
//! `[N] ++ offset extents`. These helpers map the gather's shapes into that
//! layout and the accumulator back into the gather's output layout.

use hlox_ir::builder::{
    expand_first_dim_into_n_dims, make_clamp, make_concatenate, make_constant,
    make_convert_if_needed, make_reshape_if_needed, make_slice, make_transpose_if_needed,
};
use hlox_ir::{Computation, InstrId, IrError, Literal, PrimitiveType};

use super::GatherSpec;

/// Moves axis `axis` of a rank-`rank` array to the end.
pub fn move_axis_to_end(rank: usize, axis: usize) -> Vec<usize> {
    (0..rank).filter(|&a| a != axis).chain([axis]).collect()
}

/// Shape of the canonical indices: `[N]` or `[N, k]`.
pub fn canonical_index_dims(spec: &GatherSpec) -> Vec<i64> {
    let n = spec.index_count();
    if spec.index_vector_is_implicit() {
        vec![n]
    } else {
        vec![n, spec.index_vector_size()]
    }
}

/// Slice extents with the collapsed axes removed.
pub fn offset_extents(spec: &GatherSpec) -> Vec<i64> {
    spec.slice_sizes
        .iter()
        .enumerate()
        .filter(|(axis, _)| !spec.dimension_numbers.collapsed_slice_dims.contains(axis))
        .map(|(_, &size)| size)
        .collect()
}

/// Shape of the loop accumulator: `[N] ++ offset extents`.
pub fn accumulator_dims(spec: &GatherSpec) -> Vec<i64> {
    let mut dims = vec![spec.index_count()];
    dims.extend(offset_extents(spec));
    dims
}

/// Transpose taking `[batch dims.., offset dims..]` to the output order:
/// the positions in `offset_dims` take the offset axes, the rest take the
/// batch axes, both in order.
pub fn output_permutation(output_rank: usize, offset_dims: &[usize]) -> Vec<usize> {
    let mut offset_axis = output_rank - offset_dims.len();
    let mut batch_axis = 0;
    (0..output_rank)
        .map(|i| {
            let counter = if offset_dims.contains(&i) {
                &mut offset_axis
            } else {
                &mut batch_axis
            };
            let axis = *counter;
            *counter += 1;
            axis
        })
        .collect()
}

/// Reshapes `indices` into the canonical layout, moving an explicit index
/// vector axis last.
pub fn canonicalize_indices(
    comp: &mut Computation,
    indices: InstrId,
    spec: &GatherSpec,
) -> Result<InstrId, IrError> {
    let rank = spec.indices_shape.rank();
    let transposed = if spec.index_vector_is_implicit() {
        indices
    } else {
        let perm = move_axis_to_end(rank, spec.dimension_numbers.index_vector_dim);
        make_transpose_if_needed(comp, indices, &perm)?
    };
    make_reshape_if_needed(comp, transposed, &canonical_index_dims(spec))
}

/// Splits the leading `N` axis of the accumulator into the batch extents
/// and permutes the result into the gather's output layout.
pub fn accumulator_to_output(
    comp: &mut Computation,
    accumulator: InstrId,
    spec: &GatherSpec,
) -> Result<InstrId, IrError> {
    let batch_dims = spec.batch_dims();
    let expanded = expand_first_dim_into_n_dims(comp, accumulator, &batch_dims)?;
    let perm = output_permutation(
        spec.output_shape.rank(),
        &spec.dimension_numbers.offset_dims,
    );
    make_transpose_if_needed(comp, expanded, &perm)
}

/// 64-bit integer type of the same signedness as `index_type`. Clamp
/// bounds are built in this type so they hold every operand extent.
pub fn widened_index_type(index_type: PrimitiveType) -> PrimitiveType {
    if index_type.is_unsigned_integral() {
        PrimitiveType::U64
    } else {
        PrimitiveType::S64
    }
}

/// Turns an index vector of shape `[k]` into a start vector over all operand
/// axes: axis `start_index_map[j]` takes component `j`, every other axis
/// starts at zero. The result is widened to 64 bits and clamped so the slice
/// stays in bounds.
pub fn expand_index_vector_into_operand_space(
    comp: &mut Computation,
    index_vector: InstrId,
    spec: &GatherSpec,
) -> Result<InstrId, IrError> {
    let index_type = comp
        .shape(index_vector)
        .element_type()
        .map_or(PrimitiveType::S64, widened_index_type);
    let operand_dims = spec.operand_shape.dims().to_vec();
    let rank = operand_dims.len();
    if rank == 0 {
        return Ok(make_constant(comp, Literal::vector(index_type, &[])));
    }
    let index_vector = make_convert_if_needed(comp, index_vector, index_type)?;

    let mut components = Vec::with_capacity(rank);
    for axis in 0..rank {
        let position = spec
            .dimension_numbers
            .start_index_map
            .iter()
            .position(|&a| a == axis);
        let component = match position {
            Some(j) => make_slice(comp, index_vector, &[j as i64], &[j as i64 + 1])?,
            None => make_constant(comp, Literal::vector(index_type, &[0])),
        };
        components.push(component);
    }
    let start = make_concatenate(comp, &components, 0)?;

    let zeros = make_constant(comp, Literal::vector(index_type, &vec![0; rank]));
    let limits: Vec<i64> = operand_dims
        .iter()
        .zip(&spec.slice_sizes)
        .map(|(dim, size)| dim - size)
        .collect();
    let limits = make_constant(comp, Literal::vector(index_type, &limits));
    make_clamp(comp, zeros, start, limits)
}
