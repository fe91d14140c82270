//! Modules: a set of computations with a distinguished entry.

use crate::arena::Arena;
use crate::computation::Computation;
use crate::instr::ComputationId;

#[derive(Clone, Debug, Default)]
pub struct Module {
    pub name: String,
    computations: Arena<Computation>,
    entry: Option<ComputationId>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_computation(&mut self, computation: Computation) -> ComputationId {
        self.computations.append(computation)
    }

    /// Adds `computation` and makes it the entry.
    pub fn add_entry_computation(&mut self, computation: Computation) -> ComputationId {
        let id = self.add_computation(computation);
        self.entry = Some(id);
        id
    }

    pub fn entry(&self) -> Option<ComputationId> {
        self.entry
    }

    pub fn set_entry(&mut self, id: ComputationId) {
        self.entry = Some(id);
    }

    /// The entry computation. Panics if none was set.
    pub fn entry_computation(&self) -> &Computation {
        match self.entry {
            Some(id) => &self.computations[id],
            None => panic!("module {} has no entry computation", self.name),
        }
    }

    pub fn computation(&self, id: ComputationId) -> &Computation {
        &self.computations[id]
    }

    pub fn computation_mut(&mut self, id: ComputationId) -> &mut Computation {
        &mut self.computations[id]
    }

    pub fn try_computation(&self, id: ComputationId) -> Option<&Computation> {
        self.computations.try_get(id)
    }

    /// Computations in creation order.
    pub fn computations(&self) -> impl Iterator<Item = (ComputationId, &Computation)> {
        self.computations.iter()
    }

    /// Snapshot of every computation id, in creation order.
    pub fn computation_ids(&self) -> Vec<ComputationId> {
        self.computations.handles()
    }

    pub fn computation_count(&self) -> usize {
        self.computations.len()
    }

    pub fn find_computation(&self, name: &str) -> Option<ComputationId> {
        self.computations
            .iter()
            .find(|(_, c)| c.name == name)
            .map(|(id, _)| id)
    }

    /// A computation name not yet used in this module.
    pub fn fresh_computation_name(&self, prefix: &str) -> String {
        let mut n = self.computations.next_handle().index();
        loop {
            let name = format!("{prefix}.{n}");
            if self.find_computation(&name).is_none() {
                return name;
            }
            n += 1;
        }
    }

    /// Computations ordered so that every callee precedes its callers.
    ///
    /// Computations unreachable from any caller keep their creation order
    /// relative to each other.
    pub fn computation_post_order(&self) -> Vec<ComputationId> {
        fn visit(module: &Module, id: ComputationId, seen: &mut Vec<bool>, out: &mut Vec<ComputationId>) {
            if seen[id.index()] {
                return;
            }
            seen[id.index()] = true;
            for (_, instr) in module.computations[id].instructions() {
                for callee in instr.op.called_computations() {
                    if callee.index() < seen.len() {
                        visit(module, callee, seen, out);
                    }
                }
            }
            out.push(id);
        }

        let mut seen = vec![false; self.computations.len()];
        let mut out = Vec::with_capacity(seen.len());
        let mut roots = self.computation_ids();
        // Entry last so its callees come out before it.
        if let Some(entry) = self.entry {
            roots.retain(|&id| id != entry);
            roots.push(entry);
        }
        for id in roots {
            visit(self, id, &mut seen, &mut out);
        }
        out
    }
}
