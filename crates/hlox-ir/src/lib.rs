//! Hlox intermediate representation.
//!
//! An arena-based instruction graph for tensor programs: modules hold
//! computations, computations hold instructions that consume the results of
//! other instructions. Alongside the model this crate provides instruction
//! builders, a counted-loop primitive, a structural verifier, a reference
//! evaluator and the text dump read back by `hlox-parser`.

pub mod arena;
pub mod builder;
mod computation;
mod counted_loop;
mod display;
mod error;
mod eval;
mod gather;
mod instr;
mod literal;
mod module;
mod shape_inference;
mod types;
mod verify;

pub use arena::{Arena, Handle};
pub use computation::Computation;
pub use counted_loop::{CountedLoop, INDUCTION_TYPE, make_counted_loop};
pub use display::{dump_module, format_instruction};
pub use error::IrError;
pub use eval::{Value, evaluate, evaluate_computation};
pub use gather::{GatherDimensionNumbers, infer_gather_shape};
pub use instr::{
    ComparisonDirection, ComputationId, InstrId, Instruction, Op, OpMetadata, Opcode,
};
pub use literal::{Literal, for_each_index, format_element, parse_element};
pub use module::Module;
pub use shape_inference::{check_shape, infer_shape};
pub use types::{PrimitiveType, Shape, delete_dims};
pub use verify::{verify_computation, verify_module};
