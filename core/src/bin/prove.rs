//! Drive a Groth16 proof from a persisted batch witness.
//!
//! Reads a stored witness by height (latest by default), decodes it,
//! proves it with the configured keys and checks the proof against its
//! group commitment.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use ark_serialize::CanonicalSerialize;
use clap::Parser;

use reserva_config::ReservaConfig;
use reserva_core::{BatchWitnessStore, RocksWitnessStore};
use reserva_prover::groth16;
use reserva_types::BatchTransition;

#[derive(Parser)]
#[command(name = "reserva-prove", about = "Prove a persisted batch witness")]
struct Args {
    /// Batch height to prove; defaults to the latest persisted batch
    #[arg(long)]
    height: Option<u64>,

    /// Where to write the compressed proof
    #[arg(long)]
    proof_out: Option<PathBuf>,

    /// Override the configured proving key path
    #[arg(long)]
    proving_key: Option<PathBuf>,

    /// Override the configured verifying key path
    #[arg(long)]
    verifying_key: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = ReservaConfig::load()?;

    let store = RocksWitnessStore::open(&config.database.witness_path)?;
    let record = match args.height {
        Some(height) => store
            .get(height)?
            .with_context(|| format!("no witness stored for height {height}"))?,
        None => store.get_latest()?.context("witness store is empty")?,
    };
    let (batch, schema) = BatchTransition::decode(&record.witness_data)?;
    println!(
        "proving batch {} ({} instructions, {} assets)",
        batch.height,
        batch.instructions.len(),
        schema.len()
    );

    let pk_path = args.proving_key.unwrap_or(config.keys.proving_key);
    let vk_path = args.verifying_key.unwrap_or(config.keys.verifying_key);
    let pk = groth16::read_proving_key(&pk_path)
        .with_context(|| format!("loading proving key {}", pk_path.display()))?;
    let vk = groth16::read_verifying_key(&vk_path)
        .with_context(|| format!("loading verifying key {}", vk_path.display()))?;

    let proof = groth16::prove(&pk, &batch)?;
    if !groth16::verify(&vk, &batch.group_commitment, &proof)? {
        bail!("freshly generated proof failed verification");
    }
    println!(
        "proof verified, group commitment {}",
        hex::encode(batch.group_commitment)
    );

    if let Some(path) = args.proof_out {
        let mut bytes = Vec::new();
        proof.serialize_compressed(&mut bytes)?;
        std::fs::write(&path, bytes)?;
        println!("proof written to {}", path.display());
    }
    Ok(())
}
