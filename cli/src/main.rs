mod proofpath;
mod verify;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use proofpath::ProofFile;
use verify::{PathNode, verify_path};

#[derive(Parser)]
#[command(name = "reserva", about = "Reserva proof-of-reserves user tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify a Merkle proof-path file
    Verify {
        /// Path to the proof JSON file
        #[arg(long)]
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Verify { file } => match run_verify(&file) {
            Ok(()) => {
                println!("Merkle proof verify passed.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Merkle proof verify failed: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn run_verify(file: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading proof file {}", file.display()))?;
    if content.trim().is_empty() {
        bail!("empty proof file");
    }
    let proof: ProofFile = serde_json::from_str(&content).context("parsing proof file")?;
    let path = proof
        .data
        .iter()
        .map(PathNode::from_proof_node)
        .collect::<Result<Vec<_>, _>>()
        .context("decoding proof nodes")?;
    verify_path(&path)?;
    Ok(())
}
