//! Result-shape rules for every [`Op`].
//!
//! Most operations determine their result shape from their operands and
//! attributes ([`infer_shape`]). `Parameter`, `Reshape`, `Broadcast` and
//! `Convert` take the result shape as given, so they can only be checked
//! ([`check_shape`]).

use crate::error::IrError;
use crate::gather::infer_gather_shape;
use crate::instr::Op;
use crate::types::{PrimitiveType, Shape};

fn expect_operands(op: &'static str, operands: &[&Shape], n: usize) -> Result<(), IrError> {
    if operands.len() != n {
        return Err(IrError::shape(
            op,
            format!("expected {n} operand(s), got {}", operands.len()),
        ));
    }
    Ok(())
}

fn expect_array<'a>(
    op: &'static str,
    shape: &'a Shape,
) -> Result<(PrimitiveType, &'a [i64]), IrError> {
    match shape.element_type() {
        Some(ty) => Ok((ty, shape.dims())),
        None => Err(IrError::shape(op, format!("expected an array, got {shape}"))),
    }
}

/// Checks a start-index vector for an operand of rank `rank`.
fn expect_start_vector(op: &'static str, start: &Shape, rank: usize) -> Result<(), IrError> {
    let (ty, dims) = expect_array(op, start)?;
    if !ty.is_integral() {
        return Err(IrError::shape(
            op,
            format!("start indices must be integral, got {start}"),
        ));
    }
    if dims != [rank as i64] {
        return Err(IrError::shape(
            op,
            format!("start indices {start} must be a vector of {rank} entries"),
        ));
    }
    Ok(())
}

fn same_array(op: &'static str, operands: &[&Shape]) -> Result<Shape, IrError> {
    let first = operands[0];
    expect_array(op, first)?;
    for other in &operands[1..] {
        if *other != first {
            return Err(IrError::shape(
                op,
                format!("operand shapes differ: {first} vs {other}"),
            ));
        }
    }
    Ok(first.clone())
}

/// Infers the result shape of `op` applied to `operands`.
pub fn infer_shape(op: &Op, operands: &[&Shape]) -> Result<Shape, IrError> {
    match op {
        Op::Parameter { .. } | Op::Reshape | Op::Broadcast { .. } | Op::Convert => Err(
            IrError::InvalidAttribute(format!("{} has no inferable shape", op.opcode())),
        ),
        Op::Constant(literal) => {
            expect_operands("constant", operands, 0)?;
            Ok(literal.shape().clone())
        }
        Op::Add => {
            expect_operands("add", operands, 2)?;
            same_array("add", operands)
        }
        Op::Compare { .. } => {
            expect_operands("compare", operands, 2)?;
            let shape = same_array("compare", operands)?;
            Ok(shape.with_element_type(PrimitiveType::Pred))
        }
        Op::Clamp => {
            expect_operands("clamp", operands, 3)?;
            same_array("clamp", operands)
        }
        Op::Transpose { permutation } => {
            expect_operands("transpose", operands, 1)?;
            let (_, dims) = expect_array("transpose", operands[0])?;
            let mut seen = vec![false; dims.len()];
            if permutation.len() != dims.len() {
                return Err(IrError::shape(
                    "transpose",
                    format!("permutation {permutation:?} does not match rank {}", dims.len()),
                ));
            }
            for &p in permutation {
                if p >= dims.len() || std::mem::replace(&mut seen[p], true) {
                    return Err(IrError::shape(
                        "transpose",
                        format!("{permutation:?} is not a permutation"),
                    ));
                }
            }
            let out: Vec<i64> = permutation.iter().map(|&p| dims[p]).collect();
            Ok(operands[0].with_dims(out))
        }
        Op::Slice { starts, limits } => {
            expect_operands("slice", operands, 1)?;
            let (_, dims) = expect_array("slice", operands[0])?;
            if starts.len() != dims.len() || limits.len() != dims.len() {
                return Err(IrError::shape(
                    "slice",
                    format!("slice bounds do not match rank {}", dims.len()),
                ));
            }
            let mut out = Vec::with_capacity(dims.len());
            for (axis, ((&start, &limit), &dim)) in starts.iter().zip(limits).zip(dims).enumerate() {
                if start < 0 || start > limit || limit > dim {
                    return Err(IrError::shape(
                        "slice",
                        format!("[{start}:{limit}] is out of bounds for axis {axis} of extent {dim}"),
                    ));
                }
                out.push(limit - start);
            }
            Ok(operands[0].with_dims(out))
        }
        Op::DynamicSlice { sizes } => {
            expect_operands("dynamic-slice", operands, 2)?;
            let (_, dims) = expect_array("dynamic-slice", operands[0])?;
            expect_start_vector("dynamic-slice", operands[1], dims.len())?;
            if sizes.len() != dims.len() {
                return Err(IrError::shape(
                    "dynamic-slice",
                    format!("{} sizes for operand of rank {}", sizes.len(), dims.len()),
                ));
            }
            for (axis, (&size, &dim)) in sizes.iter().zip(dims).enumerate() {
                if size < 0 || size > dim {
                    return Err(IrError::shape(
                        "dynamic-slice",
                        format!("size {size} on axis {axis} exceeds extent {dim}"),
                    ));
                }
            }
            Ok(operands[0].with_dims(sizes.clone()))
        }
        Op::DynamicUpdateSlice => {
            expect_operands("dynamic-update-slice", operands, 3)?;
            let (ty, dims) = expect_array("dynamic-update-slice", operands[0])?;
            let (update_ty, update_dims) = expect_array("dynamic-update-slice", operands[1])?;
            if ty != update_ty || dims.len() != update_dims.len() {
                return Err(IrError::shape(
                    "dynamic-update-slice",
                    format!("update {} does not fit operand {}", operands[1], operands[0]),
                ));
            }
            if update_dims.iter().zip(dims).any(|(u, d)| u > d) {
                return Err(IrError::shape(
                    "dynamic-update-slice",
                    format!("update {} is larger than operand {}", operands[1], operands[0]),
                ));
            }
            expect_start_vector("dynamic-update-slice", operands[2], dims.len())?;
            Ok(operands[0].clone())
        }
        Op::Concatenate { dimension } => {
            if operands.is_empty() {
                return Err(IrError::shape("concatenate", "needs at least one operand"));
            }
            let (ty, dims) = expect_array("concatenate", operands[0])?;
            if *dimension >= dims.len() {
                return Err(IrError::shape(
                    "concatenate",
                    format!("dimension {dimension} out of bounds for rank {}", dims.len()),
                ));
            }
            let mut out = dims.to_vec();
            for other in &operands[1..] {
                let (other_ty, other_dims) = expect_array("concatenate", other)?;
                let compatible = other_ty == ty
                    && other_dims.len() == dims.len()
                    && other_dims
                        .iter()
                        .zip(dims)
                        .enumerate()
                        .all(|(axis, (a, b))| axis == *dimension || a == b);
                if !compatible {
                    return Err(IrError::shape(
                        "concatenate",
                        format!("{other} is not compatible with {}", operands[0]),
                    ));
                }
                out[*dimension] += other_dims[*dimension];
            }
            Ok(Shape::array(ty, out))
        }
        Op::Tuple => Ok(Shape::tuple(
            operands.iter().map(|s| (*s).clone()).collect::<Vec<_>>(),
        )),
        Op::GetTupleElement { index } => {
            expect_operands("get-tuple-element", operands, 1)?;
            operands[0].tuple_element(*index).cloned().ok_or_else(|| {
                IrError::shape(
                    "get-tuple-element",
                    format!("index {index} out of range for {}", operands[0]),
                )
            })
        }
        Op::While { .. } => {
            expect_operands("while", operands, 1)?;
            if !operands[0].is_tuple() {
                return Err(IrError::shape(
                    "while",
                    format!("loop state must be a tuple, got {}", operands[0]),
                ));
            }
            Ok(operands[0].clone())
        }
        Op::Gather {
            dimension_numbers,
            slice_sizes,
        } => {
            expect_operands("gather", operands, 2)?;
            infer_gather_shape(operands[0], operands[1], dimension_numbers, slice_sizes)
        }
    }
}

/// Checks that `result` is a valid result shape of `op` applied to `operands`.
pub fn check_shape(op: &Op, operands: &[&Shape], result: &Shape) -> Result<(), IrError> {
    match op {
        Op::Parameter { .. } => {
            expect_operands("parameter", operands, 0)?;
            Ok(())
        }
        Op::Reshape => {
            expect_operands("reshape", operands, 1)?;
            let (ty, _) = expect_array("reshape", operands[0])?;
            let (result_ty, result_dims) = expect_array("reshape", result)?;
            if ty != result_ty || result_dims.iter().any(|&d| d < 0) {
                return Err(IrError::shape(
                    "reshape",
                    format!("cannot reshape {} to {result}", operands[0]),
                ));
            }
            if operands[0].element_count() != result.element_count() {
                return Err(IrError::shape(
                    "reshape",
                    format!("element counts differ: {} vs {result}", operands[0]),
                ));
            }
            Ok(())
        }
        Op::Convert => {
            expect_operands("convert", operands, 1)?;
            let (ty, dims) = expect_array("convert", operands[0])?;
            let (result_ty, result_dims) = expect_array("convert", result)?;
            if !ty.is_integral() || !result_ty.is_integral() || dims != result_dims {
                return Err(IrError::shape(
                    "convert",
                    format!("cannot convert {} to {result}", operands[0]),
                ));
            }
            Ok(())
        }
        Op::Broadcast { dimensions } => {
            expect_operands("broadcast", operands, 1)?;
            let (ty, dims) = expect_array("broadcast", operands[0])?;
            let (result_ty, result_dims) = expect_array("broadcast", result)?;
            if ty != result_ty || dimensions.len() != dims.len() {
                return Err(IrError::shape(
                    "broadcast",
                    format!(
                        "cannot broadcast {} to {result} along {dimensions:?}",
                        operands[0]
                    ),
                ));
            }
            for (i, &target) in dimensions.iter().enumerate() {
                if target >= result_dims.len()
                    || dimensions[..i].contains(&target)
                    || result_dims[target] != dims[i]
                {
                    return Err(IrError::shape(
                        "broadcast",
                        format!(
                            "operand axis {i} of {} does not map onto {result} via {dimensions:?}",
                            operands[0]
                        ),
                    ));
                }
            }
            Ok(())
        }
        _ => {
            let inferred = infer_shape(op, operands)?;
            if inferred != *result {
                return Err(IrError::shape(
                    "instruction",
                    format!("{} produces {inferred}, declared {result}", op.opcode()),
                ));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::Literal;
    use crate::types::PrimitiveType::{F32, Pred, S32, S64, U8};

    fn s32(dims: &[i64]) -> Shape {
        Shape::array(S32, dims.to_vec())
    }

    #[test]
    fn transpose_permutes_dims() {
        let shape = infer_shape(
            &Op::Transpose {
                permutation: vec![1, 0],
            },
            &[&s32(&[2, 3])],
        )
        .unwrap();
        assert_eq!(shape, s32(&[3, 2]));
        assert!(
            infer_shape(
                &Op::Transpose {
                    permutation: vec![0, 0]
                },
                &[&s32(&[2, 3])]
            )
            .is_err()
        );
    }

    #[test]
    fn compare_yields_pred() {
        let shape = infer_shape(
            &Op::Compare {
                direction: crate::instr::ComparisonDirection::Lt,
            },
            &[&s32(&[]), &s32(&[])],
        )
        .unwrap();
        assert_eq!(shape, Shape::scalar(Pred));
    }

    #[test]
    fn dynamic_slice_requires_full_start_vector() {
        let op = Op::DynamicSlice { sizes: vec![1, 3] };
        assert_eq!(
            infer_shape(&op, &[&s32(&[3, 3]), &s32(&[2])]).unwrap(),
            s32(&[1, 3])
        );
        assert!(infer_shape(&op, &[&s32(&[3, 3]), &s32(&[1])]).is_err());
        let op = Op::DynamicSlice { sizes: vec![4, 3] };
        assert!(infer_shape(&op, &[&s32(&[3, 3]), &s32(&[2])]).is_err());
    }

    #[test]
    fn concatenate_sums_axis() {
        let shape = infer_shape(
            &Op::Concatenate { dimension: 0 },
            &[&s32(&[1]), &s32(&[2]), &s32(&[1])],
        )
        .unwrap();
        assert_eq!(shape, s32(&[4]));
    }

    #[test]
    fn slice_bounds_checked() {
        let op = Op::Slice {
            starts: vec![0, 1],
            limits: vec![3, 2],
        };
        assert_eq!(infer_shape(&op, &[&s32(&[3, 3])]).unwrap(), s32(&[3, 1]));
        let op = Op::Slice {
            starts: vec![0, 2],
            limits: vec![3, 4],
        };
        assert!(infer_shape(&op, &[&s32(&[3, 3])]).is_err());
    }

    #[test]
    fn reshape_and_broadcast_are_checked_not_inferred() {
        assert!(infer_shape(&Op::Reshape, &[&s32(&[6])]).is_err());
        assert!(check_shape(&Op::Reshape, &[&s32(&[6])], &s32(&[2, 3])).is_ok());
        assert!(check_shape(&Op::Reshape, &[&s32(&[6])], &s32(&[4])).is_err());

        let bcast = Op::Broadcast {
            dimensions: vec![1],
        };
        assert!(check_shape(&bcast, &[&s32(&[3])], &s32(&[7, 3, 5])).is_ok());
        assert!(check_shape(&bcast, &[&s32(&[3])], &s32(&[3, 7])).is_err());
    }

    #[test]
    fn convert_keeps_dims_and_changes_integer_type() {
        let u8s = Shape::array(U8, [2, 3]);
        assert!(infer_shape(&Op::Convert, &[&u8s]).is_err());
        assert!(check_shape(&Op::Convert, &[&u8s], &Shape::array(S64, [2, 3])).is_ok());
        assert!(check_shape(&Op::Convert, &[&u8s], &Shape::array(S64, [6])).is_err());
        assert!(check_shape(&Op::Convert, &[&u8s], &Shape::array(F32, [2, 3])).is_err());
        let tuple = Shape::tuple(vec![u8s.clone()]);
        assert!(check_shape(&Op::Convert, &[&tuple], &Shape::array(S64, [2, 3])).is_err());
    }

    #[test]
    fn constant_shape_comes_from_literal() {
        let lit = Literal::vector(S32, &[1, 2, 3]);
        let op = Op::Constant(lit);
        assert_eq!(infer_shape(&op, &[]).unwrap(), s32(&[3]));
        assert!(check_shape(&op, &[], &s32(&[4])).is_err());
    }
}
