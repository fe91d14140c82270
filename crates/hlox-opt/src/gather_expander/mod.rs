//! Gather expansion pass.
//!
//! Rewrites `gather` instructions into slicing, reshapes and, when the
//! indices are not trivial, a counted loop that copies one slice per index.
//! Out-of-range indices are clamped the same way `gather` clamps them, so the
//! rewrite preserves results exactly.

mod canonical;
mod classify;
mod loop_rewrite;
mod trivial;

pub use classify::{GatherClass, classify};

use hlox_ir::{
    Computation, ComputationId, GatherDimensionNumbers, InstrId, IrError, Module, Op, Opcode,
    PrimitiveType, Shape, format_instruction,
};

use crate::{OptError, Pass};

/// Largest index count the loop rewrite supports; the loop counter is `s32`.
pub const MAX_INDEX_COUNT: i64 = i32::MAX as i64;

/// Which gathers the pass rewrites.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GatherExpansionMode {
    /// Rewrite every gather, using a loop where needed.
    #[default]
    EliminateAll,
    /// Rewrite only gathers that need no loop.
    EliminateSimpleOnly,
}

/// The shapes and attributes of one gather instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct GatherSpec {
    pub operand_shape: Shape,
    pub indices_shape: Shape,
    pub output_shape: Shape,
    pub element_type: PrimitiveType,
    pub dimension_numbers: GatherDimensionNumbers,
    pub slice_sizes: Vec<i64>,
}

impl GatherSpec {
    pub fn from_instruction(comp: &Computation, id: InstrId) -> Result<Self, IrError> {
        let instr = comp.instruction(id);
        let Op::Gather {
            dimension_numbers,
            slice_sizes,
        } = &instr.op
        else {
            return Err(IrError::InvalidAttribute(format!(
                "{} is not a gather",
                instr.name
            )));
        };
        let (Some(operand), Some(indices)) = (instr.operand(0), instr.operand(1)) else {
            return Err(IrError::InvalidAttribute(format!(
                "gather {} needs two operands",
                instr.name
            )));
        };
        let element_type = instr.shape.element_type().ok_or_else(|| {
            IrError::InvalidAttribute(format!("gather {} has a tuple shape", instr.name))
        })?;
        Ok(Self {
            operand_shape: comp.shape(operand).clone(),
            indices_shape: comp.shape(indices).clone(),
            output_shape: instr.shape.clone(),
            element_type,
            dimension_numbers: dimension_numbers.clone(),
            slice_sizes: slice_sizes.clone(),
        })
    }

    /// Number of index vectors, saturating at `i64::MAX`.
    pub fn index_count(&self) -> i64 {
        self.dimension_numbers.index_count(self.indices_shape.dims())
    }

    pub fn index_vector_is_implicit(&self) -> bool {
        self.dimension_numbers
            .index_vector_is_implicit(self.indices_shape.rank())
    }

    /// Length of one index vector (1 for scalar indices).
    pub fn index_vector_size(&self) -> i64 {
        self.dimension_numbers
            .index_vector_size(self.indices_shape.dims())
    }

    /// Extents of the indices without the index vector axis.
    pub fn batch_dims(&self) -> Vec<i64> {
        self.dimension_numbers.batch_dims(self.indices_shape.dims())
    }
}

/// Replaces `gather` instructions with equivalent loop-free code or a
/// counted loop, depending on the [`GatherExpansionMode`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GatherExpander {
    mode: GatherExpansionMode,
}

impl GatherExpander {
    pub fn new(mode: GatherExpansionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> GatherExpansionMode {
        self.mode
    }

    /// Rewrites one gather. Returns `false` if it was left in place.
    fn expand_gather(
        &self,
        module: &mut Module,
        comp_id: ComputationId,
        gather: InstrId,
    ) -> Result<bool, OptError> {
        let comp = module.computation(comp_id);
        let spec = GatherSpec::from_instruction(comp, gather)?;
        let instr = comp.instruction(gather);

        if spec.index_count() > MAX_INDEX_COUNT {
            return Err(OptError::UnsupportedSize {
                limit: MAX_INDEX_COUNT,
                instruction: format_instruction(module, comp, gather),
            });
        }
        if spec.output_shape.is_zero_element_array() {
            log::trace!("{}: skipping zero-element gather {}", comp.name, instr.name);
            return Ok(false);
        }

        let class = classify(&spec);
        if self.mode == GatherExpansionMode::EliminateSimpleOnly && !class.is_simple() {
            log::debug!(
                "{}: leaving {} gather {} in place",
                comp.name,
                class.name(),
                instr.name
            );
            return Ok(false);
        }

        let name = instr.name.clone();
        let metadata = instr.metadata.clone();
        let (operand, indices) = (instr.operands[0], instr.operands[1]);
        let replacement = match class {
            GatherClass::Broadcast => {
                trivial::expand_broadcast(module.computation_mut(comp_id), operand, &spec)?
            }
            GatherClass::SingleSlice => trivial::expand_single_slice(
                module.computation_mut(comp_id),
                operand,
                indices,
                &spec,
            )?,
            GatherClass::General => loop_rewrite::expand_with_loop(
                module, comp_id, operand, indices, &spec, &metadata,
            )?,
        };

        let comp = module.computation_mut(comp_id);
        comp.instruction_mut(replacement).metadata = metadata;
        comp.replace_instruction(gather, replacement)?;
        log::debug!(
            "{}: expanded {} gather {name} into {}",
            comp.name,
            class.name(),
            comp.instruction(replacement).name
        );
        Ok(true)
    }
}

impl Pass for GatherExpander {
    fn name(&self) -> &str {
        "gather-expander"
    }

    fn run(&self, module: &mut Module) -> Result<bool, OptError> {
        let mut changed = false;
        for comp_id in module.computation_ids() {
            let gathers = module
                .computation(comp_id)
                .instructions_with_opcode(Opcode::Gather);
            for gather in gathers {
                changed |= self.expand_gather(module, comp_id, gather)?;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ErrorKind;
    use hlox_ir::builder::make_gather;
    use hlox_ir::infer_gather_shape;

    /// An `s32` gather description with the output shape inferred.
    pub(crate) fn spec(
        operand_dims: &[i64],
        indices_dims: &[i64],
        offset_dims: &[usize],
        collapsed_slice_dims: &[usize],
        start_index_map: &[usize],
        index_vector_dim: usize,
        slice_sizes: &[i64],
    ) -> GatherSpec {
        let dimension_numbers = GatherDimensionNumbers {
            offset_dims: offset_dims.to_vec(),
            collapsed_slice_dims: collapsed_slice_dims.to_vec(),
            start_index_map: start_index_map.to_vec(),
            index_vector_dim,
        };
        let operand_shape = Shape::array(PrimitiveType::S32, operand_dims.to_vec());
        let indices_shape = Shape::array(PrimitiveType::S32, indices_dims.to_vec());
        let output_shape = infer_gather_shape(
            &operand_shape,
            &indices_shape,
            &dimension_numbers,
            slice_sizes,
        )
        .unwrap();
        GatherSpec {
            operand_shape,
            indices_shape,
            output_shape,
            element_type: PrimitiveType::S32,
            dimension_numbers,
            slice_sizes: slice_sizes.to_vec(),
        }
    }

    fn gather_module(spec: &GatherSpec) -> (Module, ComputationId, InstrId) {
        let mut comp = Computation::new("main");
        let operand = comp.add_parameter(0, spec.operand_shape.clone(), "operand");
        let indices = comp.add_parameter(1, spec.indices_shape.clone(), "indices");
        let gather = make_gather(
            &mut comp,
            operand,
            indices,
            spec.dimension_numbers.clone(),
            &spec.slice_sizes,
        )
        .unwrap();
        comp.set_root(gather);
        let mut module = Module::new("m");
        let id = module.add_entry_computation(comp);
        (module, id, gather)
    }

    #[test]
    fn spec_from_instruction() {
        let s = spec(&[3, 3], &[2], &[0], &[1], &[1], 1, &[3, 1]);
        let (module, id, gather) = gather_module(&s);
        let comp = module.computation(id);
        assert_eq!(GatherSpec::from_instruction(comp, gather).unwrap(), s);
        assert_eq!(s.index_count(), 2);
        assert!(s.index_vector_is_implicit());
        assert_eq!(s.index_vector_size(), 1);
        assert_eq!(s.batch_dims(), vec![2]);

        let operand = comp.parameter(0).unwrap();
        assert!(GatherSpec::from_instruction(comp, operand).is_err());
    }

    #[test]
    fn oversized_gather_fails_in_every_mode() {
        let s = spec(&[3, 3], &[2147483647, 5], &[1], &[1], &[1], 2, &[3, 1]);
        for mode in [
            GatherExpansionMode::EliminateAll,
            GatherExpansionMode::EliminateSimpleOnly,
        ] {
            let (mut module, ..) = gather_module(&s);
            let err = GatherExpander::new(mode).run(&mut module).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedSize);
        }
    }

    #[test]
    fn largest_supported_index_count_is_accepted() {
        // Checked but not expanded: simple mode leaves general gathers alone.
        let s = spec(&[3, 3], &[2147483647], &[0], &[1], &[1], 1, &[3, 1]);
        let (mut module, ..) = gather_module(&s);
        let pass = GatherExpander::new(GatherExpansionMode::EliminateSimpleOnly);
        assert!(!pass.run(&mut module).unwrap());
    }

    #[test]
    fn zero_element_gathers_are_skipped() {
        let s = spec(&[3, 3], &[0], &[0], &[1], &[1], 1, &[3, 1]);
        assert!(s.output_shape.is_zero_element_array());
        let (mut module, id, gather) = gather_module(&s);
        assert!(!GatherExpander::default().run(&mut module).unwrap());
        assert_eq!(module.computation(id).root(), Some(gather));
    }

    #[test]
    fn replacement_keeps_metadata() {
        let s = spec(&[100], &[1], &[0], &[], &[0], 0, &[10]);
        let (mut module, id, gather) = gather_module(&s);
        module.computation_mut(id).instruction_mut(gather).metadata =
            hlox_ir::OpMetadata::named("slice_one");
        assert!(GatherExpander::default().run(&mut module).unwrap());
        let comp = module.computation(id);
        let root = comp.instruction(comp.root().unwrap());
        assert_eq!(root.metadata.op_name, "slice_one");
        assert!(!comp.contains_opcode(Opcode::Gather));
    }
}
