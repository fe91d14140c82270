//! IR optimization passes for Hlox.
//!
//! Provides a [`Pass`] trait, a [`PassManager`] with fixed-point iteration
//! and optional verification, and the [`GatherExpander`] pass.

mod error;
pub mod gather_expander;

pub use error::{ErrorKind, OptError};
pub use gather_expander::{GatherExpander, GatherExpansionMode};

use std::fmt::Debug;

use hlox_ir::{Module, verify_module};

/// An optimization pass that transforms an IR module.
pub trait Pass: Debug {
    /// Human-readable name of the pass.
    fn name(&self) -> &str;

    /// Run the pass on a module. Returns `true` if anything was modified.
    ///
    /// After an error the module may be partially rewritten and should be
    /// discarded.
    fn run(&self, module: &mut Module) -> Result<bool, OptError>;
}

/// Maximum number of fixed-point iterations before giving up.
const MAX_ITERATIONS: usize = 10;

/// Runs passes in sequence with fixed-point iteration.
#[derive(Debug, Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    verify: bool,
}

impl PassManager {
    /// Creates an empty pass manager with no passes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pass to the pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Verify the module after every pass that changed it.
    pub fn set_verify(&mut self, verify: bool) {
        self.verify = verify;
    }

    /// Runs all passes until a fixed point is reached or the iteration limit.
    /// Returns `true` if any pass changed the module.
    pub fn run(&self, module: &mut Module) -> Result<bool, OptError> {
        let mut any_changed = false;
        for iteration in 0..MAX_ITERATIONS {
            let mut changed = false;
            for pass in &self.passes {
                let pass_changed = pass.run(module)?;
                log::debug!(
                    "iteration {iteration}: {} {}",
                    pass.name(),
                    if pass_changed { "changed the module" } else { "made no changes" }
                );
                if pass_changed && self.verify {
                    verify_module(module)?;
                }
                changed |= pass_changed;
            }
            any_changed |= changed;
            if !changed {
                return Ok(any_changed);
            }
        }
        log::warn!("no fixed point after {MAX_ITERATIONS} iterations");
        Ok(any_changed)
    }
}

/// Convenience function: expands every gather in `module`.
pub fn expand_gathers(module: &mut Module, mode: GatherExpansionMode) -> Result<bool, OptError> {
    GatherExpander::new(mode).run(module)
}
