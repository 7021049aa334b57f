//! Commitment scheme and batch circuit for the Reserva proof-of-reserves
//! engine.
//!
//! The commitment primitives in [`commitment`] and the constraint system
//! in [`circuit`] express the same computation on the two sides of the
//! witness/circuit boundary. They share one Poseidon configuration; any
//! divergence in hash, field or input ordering would make every produced
//! proof permanently unverifiable.

pub mod circuit;
pub mod commitment;
pub mod groth16;
pub mod poseidon;

pub use circuit::{BatchAssignment, BatchCircuit, InstructionAssignment};
pub use poseidon::poseidon_config;
