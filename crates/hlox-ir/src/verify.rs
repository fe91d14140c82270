//! Structural verifier.
//!
//! Checks the invariants every pass must preserve: operands are live in the
//! same computation, declared shapes match the shape rules, parameters are
//! numbered densely, each computation has a live root, loop computations
//! match the loop state and the graph is acyclic.

use std::collections::HashSet;

use crate::computation::Computation;
use crate::error::IrError;
use crate::instr::{InstrId, Op};
use crate::module::Module;
use crate::shape_inference::check_shape;
use crate::types::{PrimitiveType, Shape};

fn fail(comp: &Computation, message: impl Into<String>) -> IrError {
    IrError::Verification {
        computation: comp.name.clone(),
        message: message.into(),
    }
}

/// Verifies every computation of `module`.
pub fn verify_module(module: &Module) -> Result<(), IrError> {
    let Some(entry) = module.entry() else {
        return Err(IrError::Verification {
            computation: module.name.clone(),
            message: "module has no entry computation".into(),
        });
    };
    if module.try_computation(entry).is_none() {
        return Err(IrError::BadHandle {
            kind: "computation",
            index: entry.index(),
        });
    }
    let mut names = HashSet::new();
    for (_, comp) in module.computations() {
        if !names.insert(comp.name.as_str()) {
            return Err(fail(comp, "duplicate computation name"));
        }
        verify_computation(module, comp)?;
    }
    Ok(())
}

/// Verifies one computation. Called computations are looked up in `module`.
pub fn verify_computation(module: &Module, comp: &Computation) -> Result<(), IrError> {
    let root = comp.root().ok_or_else(|| fail(comp, "no root instruction"))?;
    if !comp.is_live(root) {
        return Err(fail(comp, "root instruction was removed"));
    }

    for (number, &param) in comp.parameters().iter().enumerate() {
        let ok = comp
            .try_instruction(param)
            .is_some_and(|p| p.op == Op::Parameter { number });
        if !ok {
            return Err(fail(comp, format!("parameter {number} is missing")));
        }
    }

    let mut names = HashSet::new();
    for (id, instr) in comp.instructions() {
        if !names.insert(instr.name.as_str()) {
            return Err(fail(comp, format!("duplicate instruction name {}", instr.name)));
        }
        let mut shapes = Vec::with_capacity(instr.operands.len());
        for &operand in &instr.operands {
            let Some(op_instr) = comp.try_instruction(operand) else {
                return Err(fail(
                    comp,
                    format!("{} uses an instruction that is not live ({operand:?})", instr.name),
                ));
            };
            shapes.push(&op_instr.shape);
        }
        check_shape(&instr.op, &shapes, &instr.shape)
            .map_err(|e| fail(comp, format!("{}: {e}", instr.name)))?;
        if let Op::While { condition, body } = instr.op {
            verify_loop(module, comp, id, condition, body)?;
        }
    }

    if comp.post_order().len() != comp.instruction_count() {
        return Err(fail(comp, "instruction graph has a cycle"));
    }
    Ok(())
}

fn verify_loop(
    module: &Module,
    comp: &Computation,
    id: InstrId,
    condition: crate::instr::ComputationId,
    body: crate::instr::ComputationId,
) -> Result<(), IrError> {
    let instr = comp.instruction(id);
    let state = &instr.shape;
    let expect = |callee: crate::instr::ComputationId, what: &str, result: &Shape| {
        let Some(callee) = module.try_computation(callee) else {
            return Err(fail(comp, format!("{}: {what} computation does not exist", instr.name)));
        };
        let params = callee.parameters();
        if params.len() != 1 || callee.shape(params[0]) != state {
            return Err(fail(
                comp,
                format!("{}: {what} {} must take one {state} parameter", instr.name, callee.name),
            ));
        }
        let root_shape = callee.root().map(|r| callee.shape(r));
        if root_shape != Some(result) {
            return Err(fail(
                comp,
                format!("{}: {what} {} must return {result}", instr.name, callee.name),
            ));
        }
        Ok(())
    };
    expect(condition, "condition", &Shape::scalar(PrimitiveType::Pred))?;
    expect(body, "body", state)
}
