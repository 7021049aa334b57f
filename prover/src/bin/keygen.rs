//! Trusted-setup key generation for the batch circuit.
//!
//! Compiles the blank circuit at the configured shape and writes the
//! Groth16 proving and verifying keys. One-time operation; keys must be
//! regenerated whenever the circuit shape (asset count or batch size)
//! changes.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use ark_bn254::Fr;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem, SynthesisMode};
use clap::Parser;
use rand::rngs::OsRng;

use reserva_prover::BatchCircuit;
use reserva_prover::groth16;

#[derive(Parser)]
#[command(name = "reserva-keygen", about = "Generate Groth16 keys for the batch circuit")]
struct Args {
    /// Width of the asset schema the keys are generated for
    #[arg(long)]
    asset_count: usize,

    /// Accounts per batch
    #[arg(long)]
    batch_size: usize,

    #[arg(long, default_value = "./keys/proving.key")]
    pk_out: PathBuf,

    #[arg(long, default_value = "./keys/verifying.key")]
    vk_out: PathBuf,

    /// Overwrite existing key files
    #[arg(long, short)]
    force: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.asset_count == 0 || args.batch_size == 0 {
        bail!("asset count and batch size must be nonzero");
    }
    if !args.force && args.pk_out.exists() && args.vk_out.exists() {
        bail!(
            "keys already exist at {} / {} (use --force to regenerate)",
            args.pk_out.display(),
            args.vk_out.display()
        );
    }

    let cs = ConstraintSystem::<Fr>::new_ref();
    cs.set_mode(SynthesisMode::Setup);
    BatchCircuit::blank(args.asset_count, args.batch_size).generate_constraints(cs.clone())?;
    println!(
        "circuit shape: {} assets x {} accounts, {} constraints, {} witness variables",
        args.asset_count,
        args.batch_size,
        cs.num_constraints(),
        cs.num_witness_variables()
    );

    let (pk, vk) = groth16::setup(args.asset_count, args.batch_size, &mut OsRng)
        .context("circuit-specific setup failed")?;
    groth16::write_key(&pk, &args.pk_out)?;
    groth16::write_key(&vk, &args.vk_out)?;
    println!("proving key written to {}", args.pk_out.display());
    println!("verifying key written to {}", args.vk_out.display());
    Ok(())
}
