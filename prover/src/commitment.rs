//! Native-side commitment primitives.
//!
//! Three composable commitments are used by the witness builder and
//! re-derived inside the circuit: the absolute-value vector commitment
//! (asset vectors and ledger snapshots), the account leaf commitment,
//! and the public group commitment binding a batch's roots and ledger
//! commitments.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::PoseidonSponge;
use ark_crypto_primitives::sponge::CryptographicSponge;
use ark_ff::{BigInteger, PrimeField};

use reserva_types::{AccountRecord, BatchTransition, Error, LedgerVector, Result, TotalsPair};

use crate::poseidon::poseidon_config;

/// Poseidon over an ordered list of field elements.
pub fn hash_fields(inputs: &[Fr]) -> Fr {
    let mut sponge = PoseidonSponge::<Fr>::new(&poseidon_config());
    for input in inputs {
        sponge.absorb(input);
    }
    sponge.squeeze_field_elements(1)[0]
}

/// Canonical 32-byte little-endian transport of a field element.
pub fn fr_to_bytes(value: Fr) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&value.into_bigint().to_bytes_le());
    out
}

pub fn fr_from_bytes(bytes: &[u8; 32]) -> Fr {
    Fr::from_le_bytes_mod_order(bytes)
}

/// Field encoding of a signed balance: negatives map to `p - |v|`.
pub fn signed_fr(value: i64) -> Fr {
    if value >= 0 {
        Fr::from(value as u64)
    } else {
        -Fr::from(value.unsigned_abs())
    }
}

/// Commitment over a dense signed vector: Poseidon of the index-ordered
/// absolute values. The sign is not committed; the circuit recovers the
/// magnitude the same way.
pub fn vector_commitment(balances: &[i64]) -> Fr {
    let magnitudes: Vec<Fr> = balances
        .iter()
        .map(|b| Fr::from(b.unsigned_abs()))
        .collect();
    hash_fields(&magnitudes)
}

/// Leaf commitment from raw parts; shared by the account path and the
/// instruction re-check path.
pub fn leaf_commitment(id_hash: &[u8; 32], equity: u64, debt: u64, dense_assets: &[i64]) -> Fr {
    let assets = vector_commitment(dense_assets);
    hash_fields(&[
        fr_from_bytes(id_hash),
        Fr::from(equity),
        Fr::from(debt),
        assets,
    ])
}

/// Leaf commitment of an account under a schema of `asset_count` assets.
pub fn account_leaf(account: &AccountRecord, asset_count: usize) -> Fr {
    leaf_commitment(
        &account.id_hash,
        account.total_equity,
        account.total_debt,
        &account.dense_balances(asset_count),
    )
}

/// The empty-leaf sentinel: the leaf commitment of the all-zero account.
/// Doubles as the tree's nil leaf, which makes padding insertions root
/// no-ops.
pub fn empty_leaf(asset_count: usize) -> Fr {
    account_leaf(&AccountRecord::padding(0), asset_count)
}

/// The public value bound by each proof.
pub fn group_commitment(before_root: Fr, after_root: Fr, before: Fr, after: Fr) -> Fr {
    hash_fields(&[before_root, after_root, before, after])
}

/// Inner tree node hash.
pub fn hash_pair(left: Fr, right: Fr) -> Fr {
    hash_fields(&[left, right])
}

/// Rebuild the post-batch ledger and totals from a decoded transition,
/// cross-checking the stored after-commitment. Used by the resume path.
pub fn recover_ledger(batch: &BatchTransition) -> Result<(LedgerVector, TotalsPair)> {
    let mut ledger = LedgerVector::from_vec(batch.before_ledger.clone());
    for instr in &batch.instructions {
        ledger.fold_dense(&instr.assets)?;
    }
    let recomputed = fr_to_bytes(vector_commitment(ledger.balances()));
    if recomputed != batch.after_commitment {
        return Err(Error::CommitmentMismatch {
            height: batch.height,
            detail: format!(
                "refolded ledger commits to {}, stored witness says {}",
                hex::encode(recomputed),
                hex::encode(batch.after_commitment)
            ),
        });
    }
    Ok((ledger, batch.after_totals))
}
