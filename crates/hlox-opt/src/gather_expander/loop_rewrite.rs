//! General gather rewrite as a counted loop.
//!
//! The loop state is `(counter, operand, canonical indices, accumulator)`.
//! Iteration `i` reads index vector `i`, slices the operand at the clamped
//! start and writes the slice into row `i` of the accumulator:
//!
//! ```text
//! for i in 0..N:
//!     start = clamp(0, expand(indices[i]), operand_dims - slice_sizes)
//!     acc[i, ...] = reshape(dynamic_slice(operand, start, slice_sizes))
//! ```

use hlox_ir::builder::{
    elide_degenerate_dims, make_dynamic_slice, make_dynamic_update_slice, make_reshape,
    make_zeros, pad_vector_with_zeros, prepend_degenerate_dims,
};
use hlox_ir::{
    Computation, ComputationId, InstrId, IrError, Module, OpMetadata, Shape, make_counted_loop,
};

use super::GatherSpec;
use super::canonical::{
    accumulator_dims, accumulator_to_output, canonicalize_indices,
    expand_index_vector_into_operand_space,
};

/// Loop state slots, after the counter.
const OPERAND: usize = 0;
const INDICES: usize = 1;
const ACCUMULATOR: usize = 2;

/// Reads index vector `i` of the canonical indices as a `[k]` vector.
fn load_index_vector(
    body: &mut Computation,
    indices: InstrId,
    i: InstrId,
    spec: &GatherSpec,
) -> Result<InstrId, IrError> {
    let row = make_reshape(body, i, &[1])?;
    if spec.index_vector_is_implicit() {
        return make_dynamic_slice(body, indices, row, &[1]);
    }
    let k = spec.index_vector_size();
    let start = pad_vector_with_zeros(body, row, 0, 1)?;
    let slice = make_dynamic_slice(body, indices, start, &[1, k])?;
    make_reshape(body, slice, &[k])
}

fn loop_body(
    body: &mut Computation,
    i: InstrId,
    state: &[InstrId],
    spec: &GatherSpec,
) -> Result<Vec<InstrId>, IrError> {
    let (operand, indices, accumulator) = (state[OPERAND], state[INDICES], state[ACCUMULATOR]);

    let index_vector = load_index_vector(body, indices, i, spec)?;
    let start = expand_index_vector_into_operand_space(body, index_vector, spec)?;
    let slice = make_dynamic_slice(body, operand, start, &spec.slice_sizes)?;
    let slice = elide_degenerate_dims(body, slice, &spec.dimension_numbers.collapsed_slice_dims)?;
    let update = prepend_degenerate_dims(body, slice, 1)?;

    let row = make_reshape(body, i, &[1])?;
    let trailing = body.shape(accumulator).rank() - 1;
    let at = pad_vector_with_zeros(body, row, 0, trailing)?;
    let accumulator = make_dynamic_update_slice(body, accumulator, update, at)?;
    Ok(vec![operand, indices, accumulator])
}

/// Builds the loop in computation `comp_id` and returns an instruction with
/// the gather's output shape. `metadata` is attached to the loop.
pub fn expand_with_loop(
    module: &mut Module,
    comp_id: ComputationId,
    operand: InstrId,
    indices: InstrId,
    spec: &GatherSpec,
    metadata: &OpMetadata,
) -> Result<InstrId, IrError> {
    let comp = module.computation_mut(comp_id);
    let canonical_indices = canonicalize_indices(comp, indices, spec)?;
    let accumulator_shape = Shape::array(spec.element_type, accumulator_dims(spec));
    let accumulator = make_zeros(comp, &accumulator_shape)?;
    log::trace!(
        "canonical indices {}, accumulator {accumulator_shape}",
        comp.shape(canonical_indices)
    );

    let counted_loop = make_counted_loop(
        module,
        comp_id,
        spec.index_count(),
        &[operand, canonical_indices, accumulator],
        |body, i, state| loop_body(body, i, state, spec),
        metadata,
    )?;

    let comp = module.computation_mut(comp_id);
    let accumulator = counted_loop.result(comp, ACCUMULATOR)?;
    accumulator_to_output(comp, accumulator, spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gather_expander::tests::spec;
    use hlox_ir::{Opcode, PrimitiveType, verify_module};

    fn expand(
        operand_dims: &[i64],
        indices_dims: &[i64],
        s: &GatherSpec,
    ) -> (Module, ComputationId, InstrId) {
        let mut module = Module::new("m");
        let mut comp = Computation::new("main");
        let o = comp.add_parameter(0, Shape::array(PrimitiveType::S32, operand_dims.to_vec()), "operand");
        let i = comp.add_parameter(1, Shape::array(PrimitiveType::S32, indices_dims.to_vec()), "indices");
        comp.set_root(o);
        let id = module.add_entry_computation(comp);
        let out = expand_with_loop(&mut module, id, o, i, s, &OpMetadata::named("g")).unwrap();
        module.computation_mut(id).set_root(out);
        (module, id, out)
    }

    #[test]
    fn loop_state_has_four_slots() {
        let s = spec(&[3, 3], &[2], &[0], &[1], &[1], 1, &[3, 1]);
        let (module, id, out) = expand(&[3, 3], &[2], &s);
        verify_module(&module).unwrap();
        let comp = module.computation(id);
        assert_eq!(comp.shape(out), &s.output_shape);

        let whiles = comp.instructions_with_opcode(Opcode::While);
        assert_eq!(whiles.len(), 1);
        let w = comp.instruction(whiles[0]);
        assert_eq!(w.metadata.op_name, "g");
        let slots = w.shape.tuple_elements();
        assert_eq!(slots.len(), 4);
        assert_eq!(slots[0], Shape::scalar(PrimitiveType::S32));
        assert_eq!(slots[1].dims(), &[3, 3]);
        assert_eq!(slots[2].dims(), &[2]);
        assert_eq!(slots[3].dims(), &[2, 3]);
    }

    #[test]
    fn explicit_index_vectors_and_batch_dims() {
        let s = spec(&[3, 3], &[2, 2, 5], &[1], &[1], &[0, 1], 1, &[2, 1]);
        let (module, id, out) = expand(&[3, 3], &[2, 2, 5], &s);
        verify_module(&module).unwrap();
        assert_eq!(module.computation(id).shape(out).dims(), &[2, 2, 5]);
    }
}
