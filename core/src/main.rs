// Copyright 2026 Reserva Labs
// Licensed under the Apache License, Version 2.0

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use reserva_config::ReservaConfig;
use reserva_core::smt::{RocksNodes, VersionedSmt};
use reserva_core::witness::{BuilderOptions, WitnessBuilder};
use reserva_core::{RocksWitnessStore, SparseMerkleTree, ingest};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ReservaConfig::load()?;
    info!(dir = %config.witness.user_data_dir.display(), "parsing account data");
    let ingested = ingest::parse_account_dir(&config.witness.user_data_dir)?;

    let nodes = RocksNodes::open(&config.database.tree_path)?;
    let tree = VersionedSmt::new(nodes, ingested.schema.len())?;
    info!(
        version = tree.latest_version()?,
        root = %hex::encode(reserva_prover::commitment::fr_to_bytes(tree.root()?)),
        "account tree opened"
    );
    let store = Arc::new(RocksWitnessStore::open(&config.database.witness_path)?);

    let options = BuilderOptions {
        batch_size: config.witness.batch_size,
        queue_depth: config.witness.queue_depth,
        worker_reserve: config.witness.worker_reserve,
    };
    let mut builder = WitnessBuilder::new(tree, store, ingested.accounts, ingested.schema, options);
    let report = builder.run().await?;

    info!(
        first_height = report.first_height,
        batches = report.batches_built,
        equity = report.final_totals.equity,
        debt = report.final_totals.debt,
        root = %hex::encode(report.final_root),
        "witness service finished"
    );
    Ok(())
}
