use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::{AssetSchema, Error, Result};

/// Version tag of the persisted witness blob. Bumped whenever the stored
/// layout changes; older versions are rejected at decode time.
pub const WITNESS_FORMAT_VERSION: u32 = 3;

/// Running equity/debt totals across processed accounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsPair {
    pub equity: u64,
    pub debt: u64,
}

/// One account's contribution to a batch: the root transition its leaf
/// insertion caused, the sibling path it was inserted under, and the
/// account fields the circuit re-hashes.
///
/// Instructions chain: instruction i's `after_root` is instruction
/// i+1's `before_root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub before_root: [u8; 32],
    pub after_root: [u8; 32],
    pub account_index: u32,
    pub id_hash: [u8; 32],
    pub equity: u64,
    pub debt: u64,
    /// Dense, schema-width signed asset deltas.
    pub assets: Vec<i64>,
    /// Bottom-up sibling path, one hash per tree level.
    pub path: Vec<[u8; 32]>,
}

/// The full private record of one batch's state change. Created once by
/// the witness builder, persisted immutably, and later decoded as the
/// SNARK witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTransition {
    pub height: u64,
    pub before_root: [u8; 32],
    pub after_root: [u8; 32],
    pub before_commitment: [u8; 32],
    pub after_commitment: [u8; 32],
    /// Snapshot of the ledger before this batch; private witness for the
    /// circuit's commitment constraints.
    pub before_ledger: Vec<i64>,
    pub before_totals: TotalsPair,
    pub after_totals: TotalsPair,
    pub instructions: Vec<Instruction>,
    pub group_commitment: [u8; 32],
}

/// Publication state of a persisted witness record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WitnessStatus {
    Published,
    Proving,
    Proved,
}

/// A height-keyed witness store record: the text-safe blob plus status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredWitness {
    pub height: u64,
    pub witness_data: String,
    pub status: WitnessStatus,
}

// Stored layout. Asset vectors are kept sparse on disk (nonzero entries
// only) and re-densified against the embedded schema on decode.

#[derive(Serialize, Deserialize)]
struct StoredInstruction {
    before_root: [u8; 32],
    after_root: [u8; 32],
    account_index: u32,
    id_hash: [u8; 32],
    equity: u64,
    debt: u64,
    assets: Vec<(u16, i64)>,
    path: Vec<[u8; 32]>,
}

#[derive(Serialize, Deserialize)]
struct StoredBatch {
    format_version: u32,
    schema: AssetSchema,
    height: u64,
    before_root: [u8; 32],
    after_root: [u8; 32],
    before_commitment: [u8; 32],
    after_commitment: [u8; 32],
    before_ledger: Vec<i64>,
    before_totals: TotalsPair,
    after_totals: TotalsPair,
    instructions: Vec<StoredInstruction>,
    group_commitment: [u8; 32],
}

impl BatchTransition {
    /// Serialize into the versioned, text-safe blob stored by the witness
    /// store. The asset schema rides along so decoding is self-contained.
    pub fn encode(&self, schema: &AssetSchema) -> Result<String> {
        let stored = StoredBatch {
            format_version: WITNESS_FORMAT_VERSION,
            schema: schema.clone(),
            height: self.height,
            before_root: self.before_root,
            after_root: self.after_root,
            before_commitment: self.before_commitment,
            after_commitment: self.after_commitment,
            before_ledger: self.before_ledger.clone(),
            before_totals: self.before_totals,
            after_totals: self.after_totals,
            instructions: self
                .instructions
                .iter()
                .map(|instr| StoredInstruction {
                    before_root: instr.before_root,
                    after_root: instr.after_root,
                    account_index: instr.account_index,
                    id_hash: instr.id_hash,
                    equity: instr.equity,
                    debt: instr.debt,
                    assets: instr
                        .assets
                        .iter()
                        .enumerate()
                        .filter(|(_, balance)| **balance != 0)
                        .map(|(index, balance)| (index as u16, *balance))
                        .collect(),
                    path: instr.path.clone(),
                })
                .collect(),
            group_commitment: self.group_commitment,
        };
        let bytes =
            bincode::serialize(&stored).map_err(|e| Error::Decode(format!("serialize: {e}")))?;
        Ok(BASE64.encode(bytes))
    }

    /// Decode a stored blob back into the exact structure that produced
    /// it, along with the schema it was built under.
    pub fn decode(blob: &str) -> Result<(BatchTransition, AssetSchema)> {
        let bytes = BASE64
            .decode(blob)
            .map_err(|e| Error::Decode(format!("base64: {e}")))?;
        let stored: StoredBatch =
            bincode::deserialize(&bytes).map_err(|e| Error::Decode(format!("bincode: {e}")))?;
        if stored.format_version != WITNESS_FORMAT_VERSION {
            return Err(Error::Decode(format!(
                "unsupported witness format version {} (expected {})",
                stored.format_version, WITNESS_FORMAT_VERSION
            )));
        }
        let width = stored.schema.len();
        let mut instructions = Vec::with_capacity(stored.instructions.len());
        for instr in stored.instructions {
            let mut dense = vec![0i64; width];
            for (index, balance) in instr.assets {
                let slot = dense.get_mut(index as usize).ok_or_else(|| {
                    Error::Decode(format!("asset index {index} outside stored schema"))
                })?;
                *slot = balance;
            }
            instructions.push(Instruction {
                before_root: instr.before_root,
                after_root: instr.after_root,
                account_index: instr.account_index,
                id_hash: instr.id_hash,
                equity: instr.equity,
                debt: instr.debt,
                assets: dense,
                path: instr.path,
            });
        }
        if stored.before_ledger.len() != width {
            return Err(Error::Decode(format!(
                "ledger snapshot width {} does not match schema width {width}",
                stored.before_ledger.len()
            )));
        }
        let batch = BatchTransition {
            height: stored.height,
            before_root: stored.before_root,
            after_root: stored.after_root,
            before_commitment: stored.before_commitment,
            after_commitment: stored.after_commitment,
            before_ledger: stored.before_ledger,
            before_totals: stored.before_totals,
            after_totals: stored.after_totals,
            instructions,
            group_commitment: stored.group_commitment,
        };
        Ok((batch, stored.schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (BatchTransition, AssetSchema) {
        let schema = AssetSchema::new(
            vec!["BTC".into(), "ETH".into(), "USDT".into()],
            vec![8, 8, 8],
        );
        let instr = |index: u32, assets: Vec<i64>| Instruction {
            before_root: [index as u8; 32],
            after_root: [index as u8 + 1; 32],
            account_index: index,
            id_hash: [0xAB; 32],
            equity: 1000 + index as u64,
            debt: 10,
            assets,
            path: vec![[7u8; 32]; crate::TREE_DEPTH],
        };
        let batch = BatchTransition {
            height: 4,
            before_root: [1; 32],
            after_root: [2; 32],
            before_commitment: [3; 32],
            after_commitment: [4; 32],
            before_ledger: vec![5, 0, -9],
            before_totals: TotalsPair { equity: 7, debt: 1 },
            after_totals: TotalsPair { equity: 2010, debt: 21 },
            instructions: vec![instr(0, vec![100, 0, -3]), instr(1, vec![0, 42, 0])],
            group_commitment: [9; 32],
        };
        (batch, schema)
    }

    #[test]
    fn round_trip_is_identity() {
        let (batch, schema) = sample();
        let blob = batch.encode(&schema).unwrap();
        let (decoded, decoded_schema) = BatchTransition::decode(&blob).unwrap();
        assert_eq!(decoded, batch);
        assert_eq!(decoded_schema, schema);
    }

    #[test]
    fn rejects_unknown_format_version() {
        let (batch, schema) = sample();
        let blob = batch.encode(&schema).unwrap();
        let mut bytes = BASE64.decode(&blob).unwrap();
        // format_version is the first little-endian u32 of the payload
        bytes[0] = 0xFF;
        let tampered = BASE64.encode(&bytes);
        let err = BatchTransition::decode(&tampered).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            BatchTransition::decode("not-base64!!").unwrap_err(),
            Error::Decode(_)
        ));
        assert!(matches!(
            BatchTransition::decode(&BASE64.encode(b"short")).unwrap_err(),
            Error::Decode(_)
        ));
    }
}
