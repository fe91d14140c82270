//! Counted loops built from `while` plus two generated computations.
//!
//! The loop state is the tuple `(counter, init_values...)` with an `s32[]`
//! counter in slot 0. The condition computation tests `counter < trip_count`;
//! the body computation runs the caller's generator and increments the
//! counter.

use crate::builder::{
    make_add, make_compare, make_constant, make_get_tuple_element, make_tuple, make_while,
};
use crate::computation::Computation;
use crate::error::IrError;
use crate::instr::{ComparisonDirection, ComputationId, InstrId, OpMetadata};
use crate::literal::Literal;
use crate::module::Module;
use crate::types::{PrimitiveType, Shape};

/// Element type of the induction variable.
pub const INDUCTION_TYPE: PrimitiveType = PrimitiveType::S32;

/// A `while` instruction produced by [`make_counted_loop`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CountedLoop {
    pub while_instr: InstrId,
    pub condition: ComputationId,
    pub body: ComputationId,
}

impl CountedLoop {
    /// Extracts the final value of `init_values[i]` after the loop.
    pub fn result(&self, comp: &mut Computation, i: usize) -> Result<InstrId, IrError> {
        make_get_tuple_element(comp, self.while_instr, i + 1)
    }
}

/// Builds a loop in computation `comp_id` that runs `trip_count` times.
///
/// `body_gen` receives the body computation, the induction variable and the
/// current value of every init value. It returns the next value of each,
/// with unchanged shapes. `metadata` is attached to the `while`.
pub fn make_counted_loop<F>(
    module: &mut Module,
    comp_id: ComputationId,
    trip_count: i64,
    init_values: &[InstrId],
    body_gen: F,
    metadata: &OpMetadata,
) -> Result<CountedLoop, IrError>
where
    F: FnOnce(&mut Computation, InstrId, &[InstrId]) -> Result<Vec<InstrId>, IrError>,
{
    let trip = i32::try_from(trip_count)
        .ok()
        .filter(|&t| t >= 0)
        .ok_or_else(|| {
            IrError::InvalidAttribute(format!("trip count {trip_count} does not fit in s32"))
        })?;

    let mut state_shapes = vec![Shape::scalar(INDUCTION_TYPE)];
    {
        let comp = module.computation(comp_id);
        for &id in init_values {
            let instr = comp.try_instruction(id).ok_or(IrError::BadHandle {
                kind: "instruction",
                index: id.index(),
            })?;
            state_shapes.push(instr.shape.clone());
        }
    }
    let state_shape = Shape::tuple(state_shapes);

    let condition = {
        let mut cond = Computation::new(module.fresh_computation_name("while_cond"));
        let param = cond.add_parameter(0, state_shape.clone(), "loop_state");
        let counter = make_get_tuple_element(&mut cond, param, 0)?;
        let limit = make_constant(&mut cond, Literal::scalar(INDUCTION_TYPE, i64::from(trip)));
        let keep_going = make_compare(&mut cond, counter, limit, ComparisonDirection::Lt)?;
        cond.set_root(keep_going);
        module.add_computation(cond)
    };

    let body = {
        let mut body = Computation::new(module.fresh_computation_name("while_body"));
        let param = body.add_parameter(0, state_shape.clone(), "loop_state");
        let counter = make_get_tuple_element(&mut body, param, 0)?;
        let mut current = Vec::with_capacity(init_values.len());
        for i in 0..init_values.len() {
            current.push(make_get_tuple_element(&mut body, param, i + 1)?);
        }
        let next = body_gen(&mut body, counter, &current)?;
        if next.len() != current.len() {
            return Err(IrError::InvalidAttribute(format!(
                "loop body produced {} values for {} state elements",
                next.len(),
                current.len()
            )));
        }
        for (i, (&new, &old)) in next.iter().zip(&current).enumerate() {
            if body.shape(new) != body.shape(old) {
                return Err(IrError::shape(
                    "while",
                    format!(
                        "state element {i} changes shape from {} to {}",
                        body.shape(old),
                        body.shape(new)
                    ),
                ));
            }
        }
        let one = make_constant(&mut body, Literal::scalar(INDUCTION_TYPE, 1));
        let incremented = make_add(&mut body, counter, one)?;
        let mut elements = vec![incremented];
        elements.extend(next);
        let root = make_tuple(&mut body, &elements)?;
        body.set_root(root);
        module.add_computation(body)
    };

    let comp = module.computation_mut(comp_id);
    let zero = make_constant(comp, Literal::scalar(INDUCTION_TYPE, 0));
    let mut elements = vec![zero];
    elements.extend_from_slice(init_values);
    let init = make_tuple(comp, &elements)?;
    let while_instr = make_while(comp, condition, body, init)?;
    comp.instruction_mut(while_instr).metadata = metadata.clone();

    Ok(CountedLoop {
        while_instr,
        condition,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::Opcode;

    fn module_with_vector() -> (Module, ComputationId, InstrId) {
        let mut module = Module::new("loop");
        let mut entry = Computation::new("main");
        let p = entry.add_parameter(0, Shape::array(PrimitiveType::F32, [4]), "x");
        let id = module.add_entry_computation(entry);
        (module, id, p)
    }

    #[test]
    fn builds_while_with_counter_first() {
        let (mut module, entry, x) = module_with_vector();
        let md = OpMetadata::named("loop");
        let lp = make_counted_loop(
            &mut module,
            entry,
            5,
            &[x],
            |_, _, state| Ok(state.to_vec()),
            &md,
        )
        .unwrap();
        let comp = module.computation(entry);
        let w = comp.instruction(lp.while_instr);
        assert_eq!(w.opcode(), Opcode::While);
        assert_eq!(w.metadata, md);
        assert_eq!(
            w.shape,
            Shape::tuple([
                Shape::scalar(PrimitiveType::S32),
                Shape::array(PrimitiveType::F32, [4])
            ])
        );
        let cond = module.computation(lp.condition);
        assert!(cond.contains_opcode(Opcode::Compare));
        let body = module.computation(lp.body);
        assert!(body.contains_opcode(Opcode::Add));
        assert_eq!(body.shape(body.root().unwrap()), &w.shape);
    }

    #[test]
    fn result_extracts_after_counter() {
        let (mut module, entry, x) = module_with_vector();
        let lp = make_counted_loop(
            &mut module,
            entry,
            1,
            &[x],
            |_, _, state| Ok(state.to_vec()),
            &OpMetadata::default(),
        )
        .unwrap();
        let comp = module.computation_mut(entry);
        let out = lp.result(comp, 0).unwrap();
        assert_eq!(comp.shape(out), &Shape::array(PrimitiveType::F32, [4]));
    }

    #[test]
    fn rejects_shape_changing_body() {
        let (mut module, entry, x) = module_with_vector();
        let err = make_counted_loop(
            &mut module,
            entry,
            2,
            &[x],
            |_, counter, _| Ok(vec![counter]),
            &OpMetadata::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn rejects_oversized_trip_count() {
        let (mut module, entry, x) = module_with_vector();
        let err = make_counted_loop(
            &mut module,
            entry,
            i64::from(i32::MAX) + 1,
            &[x],
            |_, _, state| Ok(state.to_vec()),
            &OpMetadata::default(),
        );
        assert!(matches!(err, Err(IrError::InvalidAttribute(_))));
    }
}
