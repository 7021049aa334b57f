mod batch;
pub mod gadgets;

pub use batch::{BatchAssignment, BatchCircuit, InstructionAssignment};
