//! Thin Groth16 driver around the batch circuit.
//!
//! Key generation, proving and verification are one-call wrappers; the
//! SNARK internals belong to arkworks. Keys and proofs travel in
//! compressed canonical form.

use std::fs;
use std::path::Path;

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, Proof, ProvingKey, VerifyingKey, prepare_verifying_key};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, RngCore};
use rand::rngs::OsRng;

use reserva_types::{BatchTransition, Error, Result};

use crate::circuit::BatchCircuit;
use crate::commitment::fr_from_bytes;

/// Circuit-specific trusted setup for a given shape.
pub fn setup(
    asset_count: usize,
    batch_size: usize,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>)> {
    let circuit = BatchCircuit::blank(asset_count, batch_size);
    Groth16::<Bn254>::circuit_specific_setup(circuit, rng)
        .map_err(|e| Error::Constraint(format!("setup: {e}")))
}

/// Prove one decoded batch transition.
pub fn prove(pk: &ProvingKey<Bn254>, batch: &BatchTransition) -> Result<Proof<Bn254>> {
    let circuit = BatchCircuit::new(batch)?;
    Groth16::<Bn254>::prove(pk, circuit, &mut OsRng)
        .map_err(|e| Error::Constraint(format!("prove at height {}: {e}", batch.height)))
}

/// Verify a proof against its public group commitment.
pub fn verify(
    vk: &VerifyingKey<Bn254>,
    group_commitment: &[u8; 32],
    proof: &Proof<Bn254>,
) -> Result<bool> {
    let pvk = prepare_verifying_key(vk);
    let public: [Fr; 1] = [fr_from_bytes(group_commitment)];
    Groth16::<Bn254>::verify_with_processed_vk(&pvk, &public, proof)
        .map_err(|e| Error::Constraint(format!("verify: {e}")))
}

pub fn write_key<K: CanonicalSerialize>(key: &K, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut bytes = Vec::new();
    key.serialize_compressed(&mut bytes)?;
    fs::write(path, bytes)?;
    Ok(())
}

pub fn read_proving_key(path: &Path) -> anyhow::Result<ProvingKey<Bn254>> {
    let bytes = fs::read(path)?;
    Ok(ProvingKey::deserialize_compressed(&*bytes)?)
}

pub fn read_verifying_key(path: &Path) -> anyhow::Result<VerifyingKey<Bn254>> {
    let bytes = fs::read(path)?;
    Ok(VerifyingKey::deserialize_compressed(&*bytes)?)
}
