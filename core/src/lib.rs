//! Witness-construction pipeline.
//!
//! Replays account insertions against the versioned account tree and the
//! running asset ledger, producing a sequence of persisted, resumable
//! batch transitions that the circuit side can prove.

pub mod ingest;
pub mod smt;
pub mod store;
pub mod witness;

pub use smt::{MemorySmt, MerklePath, RocksSmt, SparseMerkleTree, VersionedSmt};
pub use store::{BatchWitnessStore, MemoryWitnessStore, RocksWitnessStore};
pub use witness::{BuilderOptions, RunReport, WitnessBuilder};
