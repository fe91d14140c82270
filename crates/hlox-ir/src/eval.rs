//! Reference interpreter.
//!
//! Straightforward, element-at-a-time evaluation of every opcode, meant for
//! checking that rewrites preserve meaning rather than for speed.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::computation::Computation;
use crate::error::IrError;
use crate::gather::GatherDimensionNumbers;
use crate::instr::{ComparisonDirection, ComputationId, InstrId, Op};
use crate::literal::{for_each_index, normalize, Literal};
use crate::module::Module;
use crate::types::{PrimitiveType, Shape};

/// A runtime value: an array or a tuple of values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Array(Literal),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn as_array(&self) -> Result<&Literal, IrError> {
        match self {
            Self::Array(lit) => Ok(lit),
            Self::Tuple(_) => Err(IrError::Eval("expected an array, got a tuple".into())),
        }
    }

    pub fn into_array(self) -> Result<Literal, IrError> {
        match self {
            Self::Array(lit) => Ok(lit),
            Self::Tuple(_) => Err(IrError::Eval("expected an array, got a tuple".into())),
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Self::Array(lit) => lit.shape().clone(),
            Self::Tuple(elements) => {
                Shape::tuple(elements.iter().map(Value::shape).collect::<Vec<_>>())
            }
        }
    }
}

impl From<Literal> for Value {
    fn from(lit: Literal) -> Self {
        Self::Array(lit)
    }
}

/// Evaluates the entry computation of `module` on `args`.
pub fn evaluate(module: &Module, args: &[Literal]) -> Result<Value, IrError> {
    let entry = module
        .entry()
        .ok_or_else(|| IrError::Eval(format!("module {} has no entry", module.name)))?;
    let args = args.iter().cloned().map(Value::Array).collect();
    evaluate_computation(module, entry, args)
}

/// Evaluates one computation of `module` on `args`.
pub fn evaluate_computation(
    module: &Module,
    id: ComputationId,
    args: Vec<Value>,
) -> Result<Value, IrError> {
    let comp = module
        .try_computation(id)
        .ok_or(IrError::BadHandle {
            kind: "computation",
            index: id.index(),
        })?;
    if args.len() != comp.parameters().len() {
        return Err(IrError::Eval(format!(
            "{} takes {} argument(s), got {}",
            comp.name,
            comp.parameters().len(),
            args.len()
        )));
    }
    for (number, (arg, &param)) in args.iter().zip(comp.parameters()).enumerate() {
        if arg.shape() != *comp.shape(param) {
            return Err(IrError::Eval(format!(
                "argument {number} of {} has shape {}, expected {}",
                comp.name,
                arg.shape(),
                comp.shape(param)
            )));
        }
    }

    let root = comp
        .root()
        .ok_or_else(|| IrError::Eval(format!("{} has no root", comp.name)))?;
    let order = comp.post_order();
    if order.len() != comp.instruction_count() {
        return Err(IrError::Eval(format!("{} has a cycle", comp.name)));
    }

    let mut values: HashMap<InstrId, Value> = HashMap::with_capacity(order.len());
    for id in order {
        let value = eval_instruction(module, comp, id, &values, &args)?;
        values.insert(id, value);
    }
    values
        .remove(&root)
        .ok_or_else(|| IrError::Eval(format!("root of {} was not evaluated", comp.name)))
}

fn eval_instruction(
    module: &Module,
    comp: &Computation,
    id: InstrId,
    values: &HashMap<InstrId, Value>,
    args: &[Value],
) -> Result<Value, IrError> {
    let instr = comp.instruction(id);
    let operand = |i: usize| {
        instr
            .operands
            .get(i)
            .and_then(|o| values.get(o))
            .ok_or_else(|| IrError::Eval(format!("{}: operand {i} has no value", instr.name)))
    };
    let array = |i: usize| operand(i)?.as_array();
    let out_dims = instr.shape.dims();

    let value = match &instr.op {
        Op::Parameter { number } => args
            .get(*number)
            .cloned()
            .ok_or_else(|| IrError::Eval(format!("missing argument {number}")))?,
        Op::Constant(lit) => Value::Array(lit.clone()),
        Op::Add => {
            let (a, b) = (array(0)?, array(1)?);
            let ty = a.element_type();
            let data = a
                .data()
                .iter()
                .zip(b.data())
                .map(|(&x, &y)| add_elements(ty, x, y))
                .collect::<Result<Vec<_>, _>>()?;
            Value::Array(Literal::new(instr.shape.clone(), data)?)
        }
        Op::Compare { direction } => {
            let (a, b) = (array(0)?, array(1)?);
            let ty = a.element_type();
            let data = a
                .data()
                .iter()
                .zip(b.data())
                .map(|(&x, &y)| i64::from(compare(*direction, compare_elements(ty, x, y))))
                .collect();
            Value::Array(Literal::new(instr.shape.clone(), data)?)
        }
        Op::Clamp => {
            let (lo, x, hi) = (array(0)?, array(1)?, array(2)?);
            let ty = x.element_type();
            let mut data = Vec::with_capacity(x.data().len());
            for ((&l, &v), &h) in lo.data().iter().zip(x.data()).zip(hi.data()) {
                let mut out = v;
                if compare_elements(ty, out, l) == Some(Ordering::Less) {
                    out = l;
                }
                if compare_elements(ty, out, h) == Some(Ordering::Greater) {
                    out = h;
                }
                data.push(out);
            }
            Value::Array(Literal::new(instr.shape.clone(), data)?)
        }
        Op::Broadcast { dimensions } => {
            let src = array(0)?;
            let mut out = Literal::zeros(&instr.shape)?;
            let mut src_index = vec![0; dimensions.len()];
            for_each_index(out_dims, |index| {
                for (i, &d) in dimensions.iter().enumerate() {
                    src_index[i] = index[d];
                }
                out.set(index, src.get(&src_index));
            });
            Value::Array(out)
        }
        Op::Reshape => Value::Array(array(0)?.reshape(out_dims)?),
        Op::Convert => {
            // Payloads already hold the integer value, so wrapping to the new
            // width is the whole conversion.
            let data = array(0)?.data().to_vec();
            Value::Array(Literal::new(instr.shape.clone(), data)?)
        }
        Op::Transpose { permutation } => {
            let src = array(0)?;
            let mut out = Literal::zeros(&instr.shape)?;
            let mut src_index = vec![0; permutation.len()];
            for_each_index(out_dims, |index| {
                for (j, &p) in permutation.iter().enumerate() {
                    src_index[p] = index[j];
                }
                out.set(index, src.get(&src_index));
            });
            Value::Array(out)
        }
        Op::Slice { starts, .. } => {
            let src = array(0)?;
            Value::Array(copy_window(src, starts, &instr.shape)?)
        }
        Op::DynamicSlice { sizes } => {
            let src = array(0)?;
            let starts = clamped_starts(array(1)?, src.dims(), sizes);
            Value::Array(copy_window(src, &starts, &instr.shape)?)
        }
        Op::DynamicUpdateSlice => {
            let (base, update) = (array(0)?, array(1)?);
            let starts = clamped_starts(array(2)?, base.dims(), update.dims());
            let mut out = base.clone();
            let mut at = vec![0; starts.len()];
            for_each_index(update.dims(), |index| {
                for (k, (&s, &i)) in starts.iter().zip(index).enumerate() {
                    at[k] = s + i;
                }
                out.set(&at, update.get(index));
            });
            Value::Array(out)
        }
        Op::Concatenate { dimension } => {
            let mut out = Literal::zeros(&instr.shape)?;
            let mut offset = 0;
            for i in 0..instr.operands.len() {
                let piece = array(i)?;
                let mut at = vec![0; piece.dims().len()];
                for_each_index(piece.dims(), |index| {
                    at.copy_from_slice(index);
                    at[*dimension] += offset;
                    out.set(&at, piece.get(index));
                });
                offset += piece.dims()[*dimension];
            }
            Value::Array(out)
        }
        Op::Tuple => Value::Tuple(
            (0..instr.operands.len())
                .map(|i| operand(i).cloned())
                .collect::<Result<_, _>>()?,
        ),
        Op::GetTupleElement { index } => match operand(0)? {
            Value::Tuple(elements) => elements
                .get(*index)
                .cloned()
                .ok_or_else(|| IrError::Eval(format!("tuple index {index} out of range")))?,
            Value::Array(_) => {
                return Err(IrError::Eval(format!("{}: operand is not a tuple", instr.name)));
            }
        },
        Op::While { condition, body } => {
            let mut state = operand(0)?.clone();
            loop {
                let keep_going = evaluate_computation(module, *condition, vec![state.clone()])?
                    .into_array()?;
                if keep_going.data().first().copied().unwrap_or(0) == 0 {
                    break;
                }
                state = evaluate_computation(module, *body, vec![state])?;
            }
            state
        }
        Op::Gather {
            dimension_numbers,
            slice_sizes,
        } => Value::Array(eval_gather(
            array(0)?,
            array(1)?,
            dimension_numbers,
            slice_sizes,
            &instr.shape,
        )?),
    };
    Ok(value)
}

/// Copies the window of `shape`'s extents starting at `starts`.
fn copy_window(src: &Literal, starts: &[i64], shape: &Shape) -> Result<Literal, IrError> {
    let mut out = Literal::zeros(shape)?;
    let mut at = vec![0; starts.len()];
    for_each_index(shape.dims(), |index| {
        for (k, (&s, &i)) in starts.iter().zip(index).enumerate() {
            at[k] = s + i;
        }
        out.set(index, src.get(&at));
    });
    Ok(out)
}

/// Start indices from a start vector, clamped so a window of `sizes` fits.
fn clamped_starts(start: &Literal, dims: &[i64], sizes: &[i64]) -> Vec<i64> {
    let ty = start.element_type();
    start
        .data()
        .iter()
        .zip(dims.iter().zip(sizes))
        .map(|(&s, (&d, &size))| clamp_index(index_value(ty, s), d - size))
        .collect()
}

/// An index payload as a signed value. `u64` payloads beyond `i64::MAX`
/// saturate, which clamps them to the upper bound like any large index.
fn index_value(ty: PrimitiveType, payload: i64) -> i64 {
    if ty == PrimitiveType::U64 && payload < 0 {
        i64::MAX
    } else {
        payload
    }
}

fn clamp_index(value: i64, max: i64) -> i64 {
    value.clamp(0, max.max(0))
}

fn eval_gather(
    operand: &Literal,
    indices: &Literal,
    dnums: &GatherDimensionNumbers,
    slice_sizes: &[i64],
    shape: &Shape,
) -> Result<Literal, IrError> {
    let operand_dims = operand.dims();
    let indices_dims = indices.dims();
    let index_type = indices.element_type();
    let implicit = dnums.index_vector_is_implicit(indices_dims.len());
    let batch_axes: Vec<usize> = (0..shape.rank())
        .filter(|a| !dnums.offset_dims.contains(a))
        .collect();
    let window_axes: Vec<usize> = (0..operand_dims.len())
        .filter(|a| !dnums.collapsed_slice_dims.contains(a))
        .collect();

    let mut out = Literal::zeros(shape)?;
    let mut index_at = vec![0; indices_dims.len()];
    let mut operand_at = vec![0; operand_dims.len()];
    for_each_index(shape.dims(), |out_index| {
        // Position of this output element's index vector in `indices`.
        let mut batch = batch_axes.iter().map(|&a| out_index[a]);
        for (axis, slot) in index_at.iter_mut().enumerate() {
            if axis != dnums.index_vector_dim {
                *slot = batch.next().unwrap_or(0);
            }
        }
        operand_at.iter_mut().for_each(|x| *x = 0);
        for (k, &axis) in dnums.start_index_map.iter().enumerate() {
            if !implicit {
                index_at[dnums.index_vector_dim] = k as i64;
            }
            let start = index_value(index_type, indices.get(&index_at));
            operand_at[axis] = clamp_index(start, operand_dims[axis] - slice_sizes[axis]);
        }
        for (&window_axis, &out_axis) in window_axes.iter().zip(&dnums.offset_dims) {
            operand_at[window_axis] += out_index[out_axis];
        }
        out.set(out_index, operand.get(&operand_at));
    });
    Ok(out)
}

fn compare(direction: ComparisonDirection, ordering: Option<Ordering>) -> bool {
    match direction {
        ComparisonDirection::Eq => ordering == Some(Ordering::Equal),
        ComparisonDirection::Ne => ordering != Some(Ordering::Equal),
        ComparisonDirection::Lt => ordering == Some(Ordering::Less),
        ComparisonDirection::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        ComparisonDirection::Gt => ordering == Some(Ordering::Greater),
        ComparisonDirection::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    }
}

/// Orders two payloads of `ty`. `None` for unordered floats (NaN).
fn compare_elements(ty: PrimitiveType, a: i64, b: i64) -> Option<Ordering> {
    match ty {
        PrimitiveType::U64 => Some((a as u64).cmp(&(b as u64))),
        PrimitiveType::F32 => f32::from_bits(a as u32).partial_cmp(&f32::from_bits(b as u32)),
        PrimitiveType::F64 => f64::from_bits(a as u64).partial_cmp(&f64::from_bits(b as u64)),
        PrimitiveType::Bf16 => bf16_to_f32(a).partial_cmp(&bf16_to_f32(b)),
        PrimitiveType::F16 => f16_to_f32(a).partial_cmp(&f16_to_f32(b)),
        _ => Some(a.cmp(&b)),
    }
}

fn add_elements(ty: PrimitiveType, a: i64, b: i64) -> Result<i64, IrError> {
    Ok(match ty {
        PrimitiveType::Pred => a | b,
        PrimitiveType::F32 => i64::from((f32::from_bits(a as u32) + f32::from_bits(b as u32)).to_bits()),
        PrimitiveType::F64 => (f64::from_bits(a as u64) + f64::from_bits(b as u64)).to_bits() as i64,
        PrimitiveType::Bf16 => f32_to_bf16(bf16_to_f32(a) + bf16_to_f32(b)),
        PrimitiveType::F16 => {
            return Err(IrError::Eval("add is not supported for f16".into()));
        }
        _ => normalize(ty, a.wrapping_add(b)),
    })
}

fn bf16_to_f32(bits: i64) -> f32 {
    f32::from_bits((bits as u32 & 0xffff) << 16)
}

/// Rounds to nearest even.
fn f32_to_bf16(value: f32) -> i64 {
    if value.is_nan() {
        return 0x7fc0;
    }
    let bits = value.to_bits();
    let rounding = 0x7fff + ((bits >> 16) & 1);
    i64::from(bits.wrapping_add(rounding) >> 16)
}

fn f16_to_f32(bits: i64) -> f32 {
    let bits = bits as u32 & 0xffff;
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1f) as i32;
    let mantissa = (bits & 0x3ff) as f32;
    sign * match exponent {
        0 => mantissa * 2f32.powi(-24),
        0x1f if mantissa == 0.0 => f32::INFINITY,
        0x1f => f32::NAN,
        e => (1.0 + mantissa / 1024.0) * 2f32.powi(e - 15),
    }
}
