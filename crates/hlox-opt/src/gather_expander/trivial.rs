//! Loop-free rewrites for broadcast and single-slice gathers.

use hlox_ir::builder::{
    elide_degenerate_dims, make_broadcast, make_dynamic_slice, make_reshape_if_needed, make_slice,
};
use hlox_ir::{Computation, InstrId, IrError};

use super::GatherSpec;
use super::canonical::expand_index_vector_into_operand_space;

/// Every batch position reads the slice at the origin: take it once and
/// broadcast it along the batch axes.
pub fn expand_broadcast(
    comp: &mut Computation,
    operand: InstrId,
    spec: &GatherSpec,
) -> Result<InstrId, IrError> {
    let operand_dims = spec.operand_shape.dims();
    let slice = if spec.slice_sizes == operand_dims {
        operand
    } else {
        let starts = vec![0; operand_dims.len()];
        make_slice(comp, operand, &starts, &spec.slice_sizes)?
    };
    let slice = elide_degenerate_dims(comp, slice, &spec.dimension_numbers.collapsed_slice_dims)?;
    make_broadcast(
        comp,
        slice,
        &spec.dimension_numbers.offset_dims,
        spec.output_shape.dims(),
    )
}

/// There is exactly one index vector: one clamped dynamic slice produces
/// the whole output.
pub fn expand_single_slice(
    comp: &mut Computation,
    operand: InstrId,
    indices: InstrId,
    spec: &GatherSpec,
) -> Result<InstrId, IrError> {
    let index_vector = make_reshape_if_needed(comp, indices, &[spec.index_vector_size()])?;
    let start = expand_index_vector_into_operand_space(comp, index_vector, spec)?;
    let slice = make_dynamic_slice(comp, operand, start, &spec.slice_sizes)?;
    // The batch axes all have extent 1, so only a reshape separates the
    // slice from the output.
    make_reshape_if_needed(comp, slice, spec.output_shape.dims())
}
