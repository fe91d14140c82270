//! Triviality classification of gathers.

use super::GatherSpec;

/// How a gather can be lowered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatherClass {
    /// Every indexed axis is sliced in full, so clamping pins each start to
    /// zero and all batch positions read the same slice.
    Broadcast,
    /// Exactly one slice is read.
    SingleSlice,
    /// Needs a loop over the indices.
    General,
}

impl GatherClass {
    /// Lowerable without a loop.
    pub fn is_simple(self) -> bool {
        matches!(self, Self::Broadcast | Self::SingleSlice)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::SingleSlice => "single-slice",
            Self::General => "general",
        }
    }
}

/// Picks the cheapest lowering for a gather.
///
/// A gather is [`GatherClass::Broadcast`] when every axis in
/// `start_index_map` is sliced at its full extent,
/// `slice_sizes[a] == operand_dims[a]`. Clamping then pins each start to
/// zero whatever the indices hold. Addressed axes of extent 1 are the
/// special case where that full extent is 1. Failing that, a gather with exactly one index vector is
/// [`GatherClass::SingleSlice`], and anything else is
/// [`GatherClass::General`].
pub fn classify(spec: &GatherSpec) -> GatherClass {
    let operand_dims = spec.operand_shape.dims();
    let full_slices = spec
        .dimension_numbers
        .start_index_map
        .iter()
        .all(|&axis| spec.slice_sizes[axis] == operand_dims[axis]);
    if full_slices {
        GatherClass::Broadcast
    } else if spec.index_count() == 1 {
        GatherClass::SingleSlice
    } else {
        GatherClass::General
    }
}
