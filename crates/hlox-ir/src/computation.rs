//! Computations: instruction graphs with a root.
//!
//! Instructions live in an append-only arena, so an [`InstrId`] never
//! dangles. Which instructions are part of the graph is tracked separately by
//! the live list, which also fixes the document order used for
//! deterministic traversal. Replacing an instruction redirects every operand
//! edge that names it.

use std::collections::{BTreeSet, HashMap};

use crate::arena::Arena;
use crate::error::IrError;
use crate::instr::{InstrId, Instruction, Op, Opcode};
use crate::types::Shape;

#[derive(Clone, Debug, Default)]
pub struct Computation {
    pub name: String,
    instructions: Arena<Instruction>,
    live: Vec<InstrId>,
    parameters: Vec<InstrId>,
    root: Option<InstrId>,
}

impl Computation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds an instruction at the end of the document order.
    ///
    /// `Parameter` instructions are also registered as parameter `number`.
    pub fn add_instruction(&mut self, instruction: Instruction) -> InstrId {
        let number = match instruction.op {
            Op::Parameter { number } => Some(number),
            _ => None,
        };
        let id = self.instructions.append(instruction);
        self.live.push(id);
        if let Some(number) = number {
            if self.parameters.len() <= number {
                self.parameters.resize(number + 1, id);
            }
            self.parameters[number] = id;
        }
        id
    }

    /// Adds a parameter instruction named `name`.
    pub fn add_parameter(&mut self, number: usize, shape: Shape, name: impl Into<String>) -> InstrId {
        self.add_instruction(Instruction::new(
            name,
            Op::Parameter { number },
            Vec::new(),
            shape,
        ))
    }

    /// A name for a new instruction that is unique in this computation.
    ///
    /// Normally `{prefix}.{index}` with the index the instruction will get;
    /// parsed modules may already use that name, so the suffix is bumped
    /// until it is free.
    pub fn fresh_name(&self, prefix: &str) -> String {
        let mut n = self.instructions.next_handle().index();
        loop {
            let name = format!("{prefix}.{n}");
            if self.find(&name).is_none() {
                return name;
            }
            n += 1;
        }
    }

    pub fn instruction(&self, id: InstrId) -> &Instruction {
        &self.instructions[id]
    }

    pub fn instruction_mut(&mut self, id: InstrId) -> &mut Instruction {
        &mut self.instructions[id]
    }

    /// The instruction if `id` is live in this computation.
    pub fn try_instruction(&self, id: InstrId) -> Option<&Instruction> {
        if self.is_live(id) {
            self.instructions.try_get(id)
        } else {
            None
        }
    }

    pub fn shape(&self, id: InstrId) -> &Shape {
        &self.instructions[id].shape
    }

    pub fn is_live(&self, id: InstrId) -> bool {
        self.live.contains(&id)
    }

    /// Live instructions in document order.
    pub fn instructions(&self) -> impl Iterator<Item = (InstrId, &Instruction)> {
        self.live.iter().map(|&id| (id, &self.instructions[id]))
    }

    /// Snapshot of the live instruction ids in document order.
    pub fn instruction_ids(&self) -> Vec<InstrId> {
        self.live.clone()
    }

    pub fn instruction_count(&self) -> usize {
        self.live.len()
    }

    pub fn parameters(&self) -> &[InstrId] {
        &self.parameters
    }

    pub fn parameter(&self, number: usize) -> Option<InstrId> {
        self.parameters.get(number).copied()
    }

    pub fn root(&self) -> Option<InstrId> {
        self.root
    }

    pub fn set_root(&mut self, id: InstrId) {
        self.root = Some(id);
    }

    /// Finds a live instruction by name.
    pub fn find(&self, name: &str) -> Option<InstrId> {
        self.instructions()
            .find(|(_, instr)| instr.name == name)
            .map(|(id, _)| id)
    }

    /// Live instructions that use `id` as an operand, in document order.
    pub fn users(&self, id: InstrId) -> Vec<InstrId> {
        self.instructions()
            .filter(|(_, instr)| instr.operands.contains(&id))
            .map(|(user, _)| user)
            .collect()
    }

    pub fn contains_opcode(&self, opcode: Opcode) -> bool {
        self.instructions().any(|(_, instr)| instr.opcode() == opcode)
    }

    /// Live instructions with the given opcode, in document order.
    pub fn instructions_with_opcode(&self, opcode: Opcode) -> Vec<InstrId> {
        self.instructions()
            .filter(|(_, instr)| instr.opcode() == opcode)
            .map(|(id, _)| id)
            .collect()
    }

    /// Redirects every use of `old` (operands and root) to `new`.
    pub fn replace_all_uses_with(&mut self, old: InstrId, new: InstrId) {
        for &id in &self.live {
            if id == new {
                continue;
            }
            for operand in &mut self.instructions[id].operands {
                if *operand == old {
                    *operand = new;
                }
            }
        }
        if self.root == Some(old) {
            self.root = Some(new);
        }
    }

    /// Unlinks an instruction that nothing uses.
    pub fn remove_instruction(&mut self, id: InstrId) -> Result<(), IrError> {
        let Some(pos) = self.live.iter().position(|&l| l == id) else {
            return Err(IrError::BadHandle {
                kind: "instruction",
                index: id.index(),
            });
        };
        let users = self.users(id).len();
        if users > 0 || self.root == Some(id) {
            return Err(IrError::HasUsers {
                name: self.instructions[id].name.clone(),
                users: users + usize::from(self.root == Some(id)),
            });
        }
        if self.parameters.contains(&id) {
            return Err(IrError::InvalidAttribute(format!(
                "cannot remove parameter {}",
                self.instructions[id].name
            )));
        }
        self.live.remove(pos);
        Ok(())
    }

    /// Replaces `old` by `new` everywhere and removes `old`.
    ///
    /// Both must produce dimension-equal shapes of the same element type.
    pub fn replace_instruction(&mut self, old: InstrId, new: InstrId) -> Result<(), IrError> {
        for id in [old, new] {
            if !self.is_live(id) {
                return Err(IrError::BadHandle {
                    kind: "instruction",
                    index: id.index(),
                });
            }
        }
        let (old_shape, new_shape) = (self.shape(old), self.shape(new));
        if old_shape != new_shape {
            return Err(IrError::ShapeMismatch {
                op: "replace",
                message: format!(
                    "{} has shape {old_shape}, replacement {} has {new_shape}",
                    self.instructions[old].name, self.instructions[new].name
                ),
            });
        }
        log::trace!(
            "{}: replacing {} with {}",
            self.name,
            self.instructions[old].name,
            self.instructions[new].name
        );
        self.replace_all_uses_with(old, new);
        self.remove_instruction(old)
    }

    /// Live instructions ordered so every operand precedes its users.
    ///
    /// Deterministic: among ready instructions the one earliest in document
    /// order is emitted first. Instructions on a cycle are omitted, so a
    /// result shorter than [`instruction_count`](Self::instruction_count)
    /// signals a cycle.
    pub fn post_order(&self) -> Vec<InstrId> {
        let position: HashMap<InstrId, usize> =
            self.live.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let n = self.live.len();
        let mut in_degree = vec![0usize; n];
        let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (ci, &id) in self.live.iter().enumerate() {
            for operand in &self.instructions[id].operands {
                if let Some(&pi) = position.get(operand) {
                    in_degree[ci] += 1;
                    consumers[pi].push(ci);
                }
            }
        }

        // Kahn's algorithm with a BTreeSet for stable ordering.
        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(idx) = ready.pop_first() {
            order.push(self.live[idx]);
            for &ci in &consumers[idx] {
                in_degree[ci] -= 1;
                if in_degree[ci] == 0 {
                    ready.insert(ci);
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrimitiveType::S32;

    fn s32(dims: &[i64]) -> Shape {
        Shape::array(S32, dims.to_vec())
    }

    /// p0 -> add(p0, p0) -> reshape
    fn small() -> (Computation, InstrId, InstrId, InstrId) {
        let mut comp = Computation::new("main");
        let p0 = comp.add_parameter(0, s32(&[4]), "p0");
        let add = comp.add_instruction(Instruction::new("add", Op::Add, vec![p0, p0], s32(&[4])));
        let reshape = comp.add_instruction(Instruction::new(
            "reshape",
            Op::Reshape,
            vec![add],
            s32(&[2, 2]),
        ));
        comp.set_root(reshape);
        (comp, p0, add, reshape)
    }

    #[test]
    fn users_and_parameters() {
        let (comp, p0, add, reshape) = small();
        assert_eq!(comp.users(p0), vec![add]);
        assert_eq!(comp.users(add), vec![reshape]);
        assert_eq!(comp.parameter(0), Some(p0));
        assert_eq!(comp.find("add"), Some(add));
        assert!(comp.contains_opcode(Opcode::Reshape));
        assert!(!comp.contains_opcode(Opcode::Gather));
    }

    #[test]
    fn replace_redirects_uses_and_unlinks() {
        let (mut comp, p0, add, reshape) = small();
        let other = comp.add_instruction(Instruction::new("other", Op::Add, vec![p0, p0], s32(&[4])));
        comp.replace_instruction(add, other).unwrap();
        assert!(!comp.is_live(add));
        assert_eq!(comp.instruction(reshape).operands, vec![other]);
        assert_eq!(comp.instruction_count(), 3);
    }

    #[test]
    fn replace_root_moves_root() {
        let (mut comp, _, add, reshape) = small();
        let new_root = comp.add_instruction(Instruction::new(
            "r2",
            Op::Reshape,
            vec![add],
            s32(&[2, 2]),
        ));
        comp.replace_instruction(reshape, new_root).unwrap();
        assert_eq!(comp.root(), Some(new_root));
    }

    #[test]
    fn replace_rejects_shape_change() {
        let (mut comp, _, add, _) = small();
        let wrong = comp.add_instruction(Instruction::new("w", Op::Reshape, vec![add], s32(&[4, 1])));
        assert!(comp.replace_instruction(add, wrong).is_err());
        assert!(comp.is_live(add));
    }

    #[test]
    fn remove_refuses_used_instruction() {
        let (mut comp, _, add, _) = small();
        assert!(matches!(
            comp.remove_instruction(add),
            Err(IrError::HasUsers { users: 1, .. })
        ));
    }

    #[test]
    fn post_order_puts_operands_first() {
        let (mut comp, p0, add, reshape) = small();
        // Appended last but consumed by `add`.
        let late = comp.add_parameter(1, s32(&[4]), "p1");
        comp.instruction_mut(add).operands = vec![p0, late];
        let order = comp.post_order();
        assert_eq!(order.len(), 4);
        let pos = |id| order.iter().position(|&o| o == id).unwrap();
        assert!(pos(late) < pos(add));
        assert!(pos(add) < pos(reshape));
    }

    #[test]
    fn post_order_omits_cycles() {
        let (mut comp, _, add, reshape) = small();
        comp.instruction_mut(add).operands = vec![reshape, reshape];
        assert!(comp.post_order().len() < comp.instruction_count());
    }

    #[test]
    fn fresh_names_are_unique() {
        let (mut comp, p0, ..) = small();
        assert_eq!(comp.fresh_name("gather"), "gather.3");
        comp.add_instruction(Instruction::new("add.4", Op::Add, vec![p0, p0], s32(&[4])));
        assert_eq!(comp.fresh_name("add"), "add.5");
    }
}
