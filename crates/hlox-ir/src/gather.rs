//! Dimension numbers and shape rules of the gather operation.
//!
//! For every output index `Out`, gather reads `operand[In]` where:
//! - the batch index `G` is `Out` restricted to the axes not in `offset_dims`;
//! - the start vector `S` is `start_indices[G]` along `index_vector_dim`;
//! - `S[k]` addresses operand axis `start_index_map[k]` and is clamped to
//!   `[0, operand_dim - slice_size]`; other axes start at 0;
//! - the window offset comes from `Out` at `offset_dims`, one entry per
//!   operand axis that is not in `collapsed_slice_dims`.

use crate::error::IrError;
use crate::types::Shape;

/// Attributes describing how a gather maps indices to operand slices.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct GatherDimensionNumbers {
    /// Output axes filled by the (non-collapsed) slice axes, ascending.
    pub offset_dims: Vec<usize>,
    /// Operand axes with slice extent 1 that are dropped from the output, ascending.
    pub collapsed_slice_dims: Vec<usize>,
    /// Operand axis addressed by each index-vector component.
    pub start_index_map: Vec<usize>,
    /// Axis of the indices array holding the index vector. Equal to the
    /// indices rank when the index vector is implicit (scalar indices).
    pub index_vector_dim: usize,
}

impl GatherDimensionNumbers {
    /// Whether the index vector is implicit for indices of this rank.
    pub fn index_vector_is_implicit(&self, indices_rank: usize) -> bool {
        self.index_vector_dim >= indices_rank
    }

    /// Extents of the indices array with the index-vector axis removed.
    pub fn batch_dims(&self, indices_dims: &[i64]) -> Vec<i64> {
        indices_dims
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != self.index_vector_dim)
            .map(|(_, &d)| d)
            .collect()
    }

    /// Number of index vectors, i.e. the number of slices the gather takes.
    ///
    /// Saturates at `i64::MAX` instead of overflowing.
    pub fn index_count(&self, indices_dims: &[i64]) -> i64 {
        self.batch_dims(indices_dims)
            .into_iter()
            .fold(1i64, |acc, d| acc.saturating_mul(d))
    }

    /// Length of each index vector.
    pub fn index_vector_size(&self, indices_dims: &[i64]) -> i64 {
        if self.index_vector_is_implicit(indices_dims.len()) {
            1
        } else {
            indices_dims[self.index_vector_dim]
        }
    }

    /// Output rank for indices of the given rank.
    pub fn output_rank(&self, indices_rank: usize) -> usize {
        let batch_rank = if self.index_vector_is_implicit(indices_rank) {
            indices_rank
        } else {
            indices_rank - 1
        };
        batch_rank + self.offset_dims.len()
    }
}

fn is_strictly_ascending(dims: &[usize]) -> bool {
    dims.windows(2).all(|w| w[0] < w[1])
}

fn invalid(message: String) -> IrError {
    IrError::shape("gather", message)
}

/// Checks gather attributes against the operand and indices shapes and
/// returns the output shape.
pub fn infer_gather_shape(
    operand: &Shape,
    start_indices: &Shape,
    dnums: &GatherDimensionNumbers,
    slice_sizes: &[i64],
) -> Result<Shape, IrError> {
    let (Some(element_type), Some(index_type)) =
        (operand.element_type(), start_indices.element_type())
    else {
        return Err(invalid("operand and indices must be arrays".into()));
    };
    if !index_type.is_integral() {
        return Err(invalid(format!(
            "indices must have an integral element type, got {index_type}"
        )));
    }
    let operand_dims = operand.dims();
    let indices_dims = start_indices.dims();
    let operand_rank = operand_dims.len();

    if dnums.index_vector_dim > indices_dims.len() {
        return Err(invalid(format!(
            "index_vector_dim {} is out of bounds for indices of rank {}",
            dnums.index_vector_dim,
            indices_dims.len()
        )));
    }
    if slice_sizes.len() != operand_rank {
        return Err(invalid(format!(
            "slice_sizes has {} entries but the operand has rank {operand_rank}",
            slice_sizes.len()
        )));
    }
    for (axis, (&size, &bound)) in slice_sizes.iter().zip(operand_dims).enumerate() {
        if size < 0 || size > bound {
            return Err(invalid(format!(
                "slice size {size} on axis {axis} is outside [0, {bound}]"
            )));
        }
    }
    if !is_strictly_ascending(&dnums.offset_dims) {
        return Err(invalid("offset_dims must be sorted and unique".into()));
    }
    if !is_strictly_ascending(&dnums.collapsed_slice_dims) {
        return Err(invalid("collapsed_slice_dims must be sorted and unique".into()));
    }
    for &axis in &dnums.collapsed_slice_dims {
        if axis >= operand_rank {
            return Err(invalid(format!(
                "collapsed slice dim {axis} is out of bounds for operand rank {operand_rank}"
            )));
        }
        if slice_sizes[axis] > 1 {
            return Err(invalid(format!(
                "collapsed slice dim {axis} has slice size {}, expected at most 1",
                slice_sizes[axis]
            )));
        }
    }
    if dnums.offset_dims.len() + dnums.collapsed_slice_dims.len() != operand_rank {
        return Err(invalid(format!(
            "{} offset dims plus {} collapsed dims do not cover operand rank {operand_rank}",
            dnums.offset_dims.len(),
            dnums.collapsed_slice_dims.len()
        )));
    }
    let vector_size = dnums.index_vector_size(indices_dims);
    if dnums.start_index_map.len() as i64 != vector_size {
        return Err(invalid(format!(
            "start_index_map has {} entries but the index vector has {vector_size}",
            dnums.start_index_map.len()
        )));
    }
    for (k, &axis) in dnums.start_index_map.iter().enumerate() {
        if axis >= operand_rank {
            return Err(invalid(format!(
                "start_index_map[{k}] = {axis} is out of bounds for operand rank {operand_rank}"
            )));
        }
        if dnums.start_index_map[..k].contains(&axis) {
            return Err(invalid(format!("start_index_map repeats axis {axis}")));
        }
    }

    let output_rank = dnums.output_rank(indices_dims.len());
    if let Some(&last) = dnums.offset_dims.last()
        && last >= output_rank
    {
        return Err(invalid(format!(
            "offset dim {last} is out of bounds for output rank {output_rank}"
        )));
    }

    let mut window = slice_sizes
        .iter()
        .enumerate()
        .filter(|(axis, _)| !dnums.collapsed_slice_dims.contains(axis))
        .map(|(_, &d)| d);
    let mut batch = dnums.batch_dims(indices_dims).into_iter();
    let mut out = Vec::with_capacity(output_rank);
    for axis in 0..output_rank {
        let next = if dnums.offset_dims.contains(&axis) {
            window.next()
        } else {
            batch.next()
        };
        out.push(next.ok_or_else(|| invalid("inconsistent output rank".into()))?);
    }
    Ok(Shape::array(element_type, out))
}
