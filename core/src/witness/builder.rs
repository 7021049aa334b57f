//! The witness builder.
//!
//! Turns an ordered account set plus the running ledger into a sequence
//! of persisted batch transitions. Leaf commitments are hashed by a
//! worker pool and handed to the sequential builder through per-slot
//! capacity-1 channels, so tree mutation order is exactly ascending
//! account index regardless of hash completion order. Finished batches
//! flow to a single writer task through a bounded queue; a full queue
//! backpressures the builder.
//!
//! Batches are strictly sequential: batch h+1 starts from batch h's
//! committed tree and ledger. Any failure aborts the whole run; recovery
//! is restart-and-resume from the last durably committed height.

use std::sync::Arc;
use std::thread::available_parallelism;

use ark_bn254::Fr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use reserva_prover::commitment::{
    self, account_leaf, empty_leaf, fr_to_bytes, group_commitment, vector_commitment,
};
use reserva_types::{
    AccountRecord, AssetSchema, BatchTransition, Error, Instruction, LedgerVector, Result,
    StoredWitness, TotalsPair, TREE_DEPTH, WitnessStatus,
};

use crate::smt::{self, SparseMerkleTree};
use crate::store::BatchWitnessStore;

#[derive(Debug, Clone)]
pub struct BuilderOptions {
    /// Accounts per batch. Every batch is padded to exactly this size.
    pub batch_size: usize,
    /// Bound of the builder-to-writer persistence queue.
    pub queue_depth: usize,
    /// Cores withheld from the hashing pool; pool size is
    /// `available_parallelism - worker_reserve`, minimum 1.
    pub worker_reserve: usize,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        BuilderOptions {
            batch_size: 64,
            queue_depth: 100,
            worker_reserve: 2,
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub first_height: u64,
    pub batches_built: u64,
    pub final_root: [u8; 32],
    pub final_totals: TotalsPair,
}

pub struct WitnessBuilder<T, S> {
    tree: T,
    store: Arc<S>,
    accounts: Vec<AccountRecord>,
    schema: Arc<AssetSchema>,
    opts: BuilderOptions,
}

impl<T, S> WitnessBuilder<T, S>
where
    T: SparseMerkleTree + Send,
    S: BatchWitnessStore + 'static,
{
    pub fn new(
        tree: T,
        store: Arc<S>,
        accounts: Vec<AccountRecord>,
        schema: AssetSchema,
        opts: BuilderOptions,
    ) -> Self {
        WitnessBuilder {
            tree,
            store,
            accounts,
            schema: Arc::new(schema),
            opts,
        }
    }

    /// Hand the tree back, e.g. to resume with a different account set.
    pub fn into_tree(self) -> T {
        self.tree
    }

    pub async fn run(&mut self) -> Result<RunReport> {
        let asset_count = self.schema.len();
        let batch_size = self.opts.batch_size;
        if batch_size == 0 || asset_count == 0 {
            return Err(Error::StateInconsistency {
                height: 0,
                detail: "batch size and asset schema must be nonempty".into(),
            });
        }
        self.validate_accounts(asset_count)?;

        self.store.create_table()?;

        // Resume point: the ledger and totals left behind by the last
        // persisted batch, cross-checked against its stored commitment.
        let (start_height, mut ledger, mut totals) = match self.store.get_latest()? {
            None => (0u64, LedgerVector::new(asset_count), TotalsPair::default()),
            Some(stored) => {
                let (batch, stored_schema) = BatchTransition::decode(&stored.witness_data)?;
                if stored_schema != *self.schema {
                    return Err(Error::StateInconsistency {
                        height: stored.height,
                        detail: "stored witness was built under a different asset schema".into(),
                    });
                }
                let (ledger, totals) = commitment::recover_ledger(&batch)?;
                info!(height = stored.height, "recovered ledger from stored witness");
                (stored.height + 1, ledger, totals)
            }
        };

        let total_accounts = self.accounts.len() as u64;
        let batch_count = total_accounts.div_ceil(batch_size as u64);
        if start_height >= batch_count {
            if start_height > batch_count {
                return Err(Error::StateInconsistency {
                    height: start_height,
                    detail: format!(
                        "store holds {start_height} batches but the account set only fills {batch_count}"
                    ),
                });
            }
            info!("all account batches already have witnesses");
            return Ok(RunReport {
                first_height: start_height,
                batches_built: 0,
                final_root: fr_to_bytes(self.tree.root()?),
                final_totals: totals,
            });
        }

        // The tree must sit exactly at the resume version. Ahead means
        // uncommitted forward state from a crashed run: roll it back for
        // deterministic replay. Behind is unrepairable.
        let tree_version = self.tree.latest_version()?;
        if tree_version > start_height {
            warn!(tree_version, start_height, "rolling back account tree");
            self.tree.rollback(start_height)?;
        } else if tree_version < start_height {
            return Err(Error::StateInconsistency {
                height: start_height,
                detail: format!(
                    "account tree version {tree_version} is behind resume height {start_height}"
                ),
            });
        }
        debug!(root = %hex::encode(fr_to_bytes(self.tree.root()?)), "starting root");

        // Pad the tail batch with zero-valued accounts.
        for index in total_accounts..batch_count * batch_size as u64 {
            self.accounts.push(AccountRecord::padding(index as u32));
        }
        let accounts = Arc::new(std::mem::take(&mut self.accounts));

        // Writer task: drains the bounded queue into the store.
        let (witness_tx, mut witness_rx) = mpsc::channel::<StoredWitness>(self.opts.queue_depth);
        let store = Arc::clone(&self.store);
        let writer: JoinHandle<Result<()>> = tokio::spawn(async move {
            while let Some(record) = witness_rx.recv().await {
                let height = record.height;
                store.append(&record)?;
                if height % 100 == 0 {
                    info!(height, "batch witness persisted");
                }
            }
            Ok(())
        });

        // Hashing pool: worker w owns a contiguous slot range of every
        // batch and feeds its capacity-1 slot channels.
        let workers = available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .saturating_sub(self.opts.worker_reserve)
            .max(1);
        let per_worker = batch_size / workers + 1;

        let mut slot_rx = Vec::with_capacity(batch_size);
        let mut senders = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let (tx, rx) = mpsc::channel::<Fr>(1);
            senders.push(tx);
            slot_rx.push(rx);
        }
        let mut sender_iter = senders.into_iter();
        let mut hash_workers = Vec::new();
        for worker in 0..workers {
            let lo = worker * per_worker;
            if lo >= batch_size {
                break;
            }
            let hi = ((worker + 1) * per_worker).min(batch_size);
            let slot_tx: Vec<mpsc::Sender<Fr>> = sender_iter.by_ref().take(hi - lo).collect();
            let accounts = Arc::clone(&accounts);
            hash_workers.push(tokio::task::spawn_blocking(move || {
                'batches: for batch in start_height..batch_count {
                    let base = batch as usize * batch_size;
                    for (offset, tx) in slot_tx.iter().enumerate() {
                        let account = &accounts[base + lo + offset];
                        let leaf = account_leaf(account, asset_count);
                        if tx.blocking_send(leaf).is_err() {
                            // The run aborted and dropped the receivers.
                            break 'batches;
                        }
                    }
                }
            }));
        }

        let empty = empty_leaf(asset_count);
        let mut final_root = self.tree.root()?;

        for height in start_height..batch_count {
            let before_root = self.tree.root()?;
            let before_ledger = ledger.clone();
            let before_commitment = vector_commitment(ledger.balances());
            let before_totals = totals;
            let mut after_totals = before_totals;
            let mut instructions = Vec::with_capacity(batch_size);
            let base = height as usize * batch_size;

            for slot in 0..batch_size {
                let account = &accounts[base + slot];
                let leaf_index = account.account_index as u64;
                let instr_before_root = self.tree.root()?;
                let path = self.tree.get_proof(leaf_index)?;

                // Append-only invariant: the leaf position must still
                // hold the empty sentinel. No silent overwrites.
                if !smt::verify_leaf(instr_before_root, empty, leaf_index, &path) {
                    return Err(Error::StateInconsistency {
                        height,
                        detail: format!("leaf {leaf_index} is already occupied"),
                    });
                }

                ledger.fold(&account.assets)?;

                let leaf = slot_rx[slot].recv().await.ok_or_else(|| {
                    Error::StateInconsistency {
                        height,
                        detail: "hashing pool terminated early".into(),
                    }
                })?;
                self.tree.set(leaf_index, leaf)?;
                let instr_after_root = self.tree.root()?;

                after_totals.equity = after_totals
                    .equity
                    .checked_add(account.total_equity)
                    .ok_or_else(|| {
                        Error::ArithmeticOverflow(format!("running equity at height {height}"))
                    })?;
                after_totals.debt = after_totals
                    .debt
                    .checked_add(account.total_debt)
                    .ok_or_else(|| {
                        Error::ArithmeticOverflow(format!("running debt at height {height}"))
                    })?;
                if after_totals.debt > after_totals.equity {
                    return Err(Error::ArithmeticOverflow(format!(
                        "running debt {} exceeds equity {} after account {}",
                        after_totals.debt, after_totals.equity, account.account_index
                    )));
                }

                instructions.push(Instruction {
                    before_root: fr_to_bytes(instr_before_root),
                    after_root: fr_to_bytes(instr_after_root),
                    account_index: account.account_index,
                    id_hash: account.id_hash,
                    equity: account.total_equity,
                    debt: account.total_debt,
                    assets: account.dense_balances(asset_count),
                    path: path.to_bytes(),
                });
            }

            let after_root = self.tree.root()?;
            let after_commitment = vector_commitment(ledger.balances());
            let group = group_commitment(
                before_root,
                after_root,
                before_commitment,
                after_commitment,
            );
            totals = after_totals;

            let transition = BatchTransition {
                height,
                before_root: fr_to_bytes(before_root),
                after_root: fr_to_bytes(after_root),
                before_commitment: fr_to_bytes(before_commitment),
                after_commitment: fr_to_bytes(after_commitment),
                before_ledger: before_ledger.into_vec(),
                before_totals,
                after_totals,
                instructions,
                group_commitment: fr_to_bytes(group),
            };
            let witness_data = transition.encode(&self.schema)?;

            // Durably advance the tree before queueing the witness. The
            // tree may run ahead of the store; resume rolls it back.
            self.tree.commit(height + 1)?;

            let record = StoredWitness {
                height,
                witness_data,
                status: WitnessStatus::Published,
            };
            if witness_tx.send(record).await.is_err() {
                return match writer.await {
                    Ok(Err(e)) => Err(e),
                    _ => Err(Error::Store("witness writer terminated".into())),
                };
            }
            final_root = after_root;
        }

        // Let the writer drain, then surface any persistence failure.
        drop(witness_tx);
        drop(slot_rx);
        writer
            .await
            .map_err(|e| Error::Store(format!("witness writer panicked: {e}")))??;
        for worker in hash_workers {
            let _ = worker.await;
        }

        info!(
            batches = batch_count - start_height,
            root = %hex::encode(fr_to_bytes(final_root)),
            "witness run finished"
        );
        Ok(RunReport {
            first_height: start_height,
            batches_built: batch_count - start_height,
            final_root: fr_to_bytes(final_root),
            final_totals: totals,
        })
    }

    fn validate_accounts(&self, asset_count: usize) -> Result<()> {
        for (position, account) in self.accounts.iter().enumerate() {
            if account.account_index as usize != position {
                return Err(Error::StateInconsistency {
                    height: 0,
                    detail: format!(
                        "account at position {position} carries index {}",
                        account.account_index
                    ),
                });
            }
            if (account.account_index as u64) >= 1u64 << TREE_DEPTH {
                return Err(Error::StateInconsistency {
                    height: 0,
                    detail: format!("account index {} exceeds tree capacity", account.account_index),
                });
            }
            for asset in &account.assets {
                if asset.index as usize >= asset_count {
                    return Err(Error::Decode(format!(
                        "account {} references asset {} outside the schema",
                        account.account_index, asset.index
                    )));
                }
            }
        }
        Ok(())
    }
}
