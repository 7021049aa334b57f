//! Shared data model for the Reserva proof-of-reserves engine.
//!
//! Everything in this crate is plain data: account records, the asset
//! schema, the running ledger, batch transitions and their persisted
//! encoding, and the error taxonomy shared by the witness pipeline and
//! the circuit side. No hashing or field arithmetic lives here.

mod account;
mod batch;
mod error;
mod fixed;
mod ledger;
mod schema;

pub use account::{AccountAsset, AccountRecord};
pub use batch::{
    BatchTransition, Instruction, StoredWitness, TotalsPair, WitnessStatus, WITNESS_FORMAT_VERSION,
};
pub use error::{Error, Result};
pub use fixed::{format_scaled, parse_scaled, parse_scaled_i64, parse_scaled_u64};
pub use ledger::LedgerVector;
pub use schema::AssetSchema;

/// Depth of the account tree. Leaf positions are dense account indices,
/// so the tree admits up to 2^28 accounts.
pub const TREE_DEPTH: usize = 28;
