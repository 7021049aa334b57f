//! End-to-end tests of the witness pipeline against in-memory
//! collaborators, and of the circuit over builder-produced batches.

use std::sync::Arc;

use ark_bn254::Fr;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};

use reserva_core::smt::{MemoryNodes, MemorySmt, SparseMerkleTree, VersionedSmt};
use reserva_core::witness::{BuilderOptions, WitnessBuilder};
use reserva_core::{BatchWitnessStore, MemoryWitnessStore};
use reserva_prover::BatchCircuit;
use reserva_prover::commitment::{
    self, fr_from_bytes, fr_to_bytes, group_commitment, vector_commitment,
};
use reserva_types::{
    AccountAsset, AccountRecord, AssetSchema, BatchTransition, Error, TotalsPair, WitnessStatus,
};

fn schema2() -> AssetSchema {
    AssetSchema::new(vec!["BTC".into(), "ETH".into()], vec![8, 8])
}

fn account(index: u32, equity: u64, debt: u64, assets: &[(u16, i64)]) -> AccountRecord {
    AccountRecord {
        account_index: index,
        id_hash: fr_to_bytes(Fr::from(1000 + index as u64)),
        total_equity: equity,
        total_debt: debt,
        assets: assets
            .iter()
            .map(|(i, b)| AccountAsset { index: *i, balance: *b })
            .collect(),
    }
}

fn memory_tree(asset_count: usize) -> MemorySmt {
    VersionedSmt::new(MemoryNodes::new(), asset_count).unwrap()
}

fn options(batch_size: usize) -> BuilderOptions {
    BuilderOptions {
        batch_size,
        queue_depth: 8,
        worker_reserve: 0,
    }
}

/// Four accounts over two assets, including negative balances, filling
/// two batches of two.
fn four_accounts() -> Vec<AccountRecord> {
    vec![
        account(0, 100, 0, &[(0, 100)]),
        account(1, 50, 0, &[(1, -7)]),
        account(2, 25, 5, &[(0, 25)]),
        account(3, 30, 0, &[(1, 3)]),
    ]
}

#[tokio::test]
async fn concrete_two_account_scenario() {
    let schema = schema2();
    let accounts = vec![
        account(0, 100, 0, &[(0, 100)]),
        account(1, 50, 0, &[(1, 50)]),
    ];
    let store = Arc::new(MemoryWitnessStore::new());
    let mut builder = WitnessBuilder::new(
        memory_tree(2),
        Arc::clone(&store),
        accounts,
        schema.clone(),
        options(2),
    );
    let report = builder.run().await.unwrap();
    assert_eq!(report.first_height, 0);
    assert_eq!(report.batches_built, 1);
    assert_eq!(report.final_totals, TotalsPair { equity: 150, debt: 0 });

    let stored = store.get_latest().unwrap().unwrap();
    assert_eq!(stored.height, 0);
    assert_eq!(stored.status, WitnessStatus::Published);

    let (batch, decoded_schema) = BatchTransition::decode(&stored.witness_data).unwrap();
    assert_eq!(decoded_schema, schema);
    assert_eq!(batch.before_ledger, vec![0, 0]);
    assert_eq!(batch.before_totals, TotalsPair::default());
    assert_eq!(batch.after_totals, TotalsPair { equity: 150, debt: 0 });

    // The final ledger and its commitment are computable by hand.
    let (ledger, totals) = commitment::recover_ledger(&batch).unwrap();
    assert_eq!(ledger.balances(), &[150i64, 50]);
    assert_eq!(totals, TotalsPair { equity: 150, debt: 0 });
    assert_eq!(
        batch.after_commitment,
        fr_to_bytes(vector_commitment(&[150, 50]))
    );

    // The group commitment recomputes off-circuit from the stored parts.
    let recomputed = group_commitment(
        fr_from_bytes(&batch.before_root),
        fr_from_bytes(&batch.after_root),
        fr_from_bytes(&batch.before_commitment),
        fr_from_bytes(&batch.after_commitment),
    );
    assert_eq!(batch.group_commitment, fr_to_bytes(recomputed));

    // Instructions chain and anchor the batch roots.
    assert_eq!(batch.before_root, batch.instructions[0].before_root);
    assert_eq!(batch.instructions[0].after_root, batch.instructions[1].before_root);
    assert_eq!(batch.after_root, batch.instructions[1].after_root);
    assert_eq!(batch.after_root, report.final_root);
}

#[tokio::test]
async fn padding_fills_the_tail_batch() {
    let schema = schema2();
    let accounts = vec![
        account(0, 100, 0, &[(0, 100)]),
        account(1, 50, 0, &[(1, 50)]),
        account(2, 10, 0, &[(0, 10)]),
    ];
    let store = Arc::new(MemoryWitnessStore::new());
    let mut builder = WitnessBuilder::new(
        memory_tree(2),
        Arc::clone(&store),
        accounts,
        schema,
        options(2),
    );
    let report = builder.run().await.unwrap();
    assert_eq!(report.batches_built, 2);

    let (tail, _) = BatchTransition::decode(&store.get(1).unwrap().unwrap().witness_data).unwrap();
    let padding = &tail.instructions[1];
    assert_eq!(padding.account_index, 3);
    assert_eq!(padding.equity, 0);
    assert_eq!(padding.debt, 0);
    assert_eq!(padding.assets, vec![0, 0]);
    // Inserting the zero account rewrites the empty sentinel in place,
    // leaving the root unchanged.
    assert_eq!(padding.before_root, padding.after_root);

    let (ledger, totals) = commitment::recover_ledger(&tail).unwrap();
    assert_eq!(ledger.balances(), &[110i64, 50]);
    assert_eq!(totals, TotalsPair { equity: 160, debt: 0 });
}

#[tokio::test]
async fn resume_after_truncation_is_byte_identical() {
    let schema = schema2();
    let accounts = four_accounts();

    let full_store = Arc::new(MemoryWitnessStore::new());
    let mut full = WitnessBuilder::new(
        memory_tree(2),
        Arc::clone(&full_store),
        accounts.clone(),
        schema.clone(),
        options(2),
    );
    let report = full.run().await.unwrap();
    assert_eq!(report.batches_built, 2);
    let tree = full.into_tree();
    assert_eq!(tree.latest_version().unwrap(), 2);

    // Truncate the persisted store to height 0 and resume with the same
    // tree: the forward tree version must roll back, and the rebuilt
    // batch must come out byte-identical.
    let truncated = Arc::new(MemoryWitnessStore::new());
    truncated
        .append(&full_store.get(0).unwrap().unwrap())
        .unwrap();
    let mut resumed = WitnessBuilder::new(
        tree,
        Arc::clone(&truncated),
        accounts,
        schema,
        options(2),
    );
    let report = resumed.run().await.unwrap();
    assert_eq!(report.first_height, 1);
    assert_eq!(report.batches_built, 1);

    for height in 0..2 {
        assert_eq!(
            truncated.get(height).unwrap().unwrap().witness_data,
            full_store.get(height).unwrap().unwrap().witness_data
        );
    }

    // Running again is a no-op.
    let mut again = WitnessBuilder::new(
        resumed.into_tree(),
        Arc::clone(&truncated),
        four_accounts(),
        schema2(),
        options(2),
    );
    let report = again.run().await.unwrap();
    assert_eq!(report.batches_built, 0);
}

#[tokio::test]
async fn insolvent_running_totals_abort_without_persisting() {
    let schema = schema2();
    let accounts = vec![
        account(0, 100, 0, &[(0, 100)]),
        account(1, 10, 120, &[(1, 10)]),
    ];
    let store = Arc::new(MemoryWitnessStore::new());
    let mut builder = WitnessBuilder::new(
        memory_tree(2),
        Arc::clone(&store),
        accounts,
        schema,
        options(2),
    );
    let err = builder.run().await.unwrap_err();
    assert!(matches!(err, Error::ArithmeticOverflow(_)));
    assert!(store.get_latest().unwrap().is_none());
}

#[tokio::test]
async fn occupied_leaf_is_fatal() {
    let schema = schema2();
    let mut tree = memory_tree(2);
    tree.set(1, Fr::from(123u64)).unwrap();

    let store = Arc::new(MemoryWitnessStore::new());
    let mut builder = WitnessBuilder::new(
        tree,
        Arc::clone(&store),
        vec![account(0, 10, 0, &[]), account(1, 10, 0, &[])],
        schema,
        options(2),
    );
    let err = builder.run().await.unwrap_err();
    assert!(matches!(err, Error::StateInconsistency { .. }));
    assert!(store.get_latest().unwrap().is_none());
}

#[tokio::test]
async fn tree_behind_persisted_height_is_fatal() {
    let schema = schema2();
    let accounts = four_accounts();

    let store = Arc::new(MemoryWitnessStore::new());
    let mut first = WitnessBuilder::new(
        memory_tree(2),
        Arc::clone(&store),
        accounts.clone(),
        schema.clone(),
        options(2),
    );
    first.run().await.unwrap();

    // Keep the store but start over with an empty tree.
    let truncated = Arc::new(MemoryWitnessStore::new());
    truncated.append(&store.get(0).unwrap().unwrap()).unwrap();
    let mut resumed = WitnessBuilder::new(
        memory_tree(2),
        truncated,
        accounts,
        schema,
        options(2),
    );
    let err = resumed.run().await.unwrap_err();
    assert!(matches!(err, Error::StateInconsistency { .. }));
}

#[tokio::test]
async fn produced_batches_satisfy_the_circuit() {
    let schema = schema2();
    let store = Arc::new(MemoryWitnessStore::new());
    let mut builder = WitnessBuilder::new(
        memory_tree(2),
        Arc::clone(&store),
        four_accounts(),
        schema,
        options(2),
    );
    builder.run().await.unwrap();

    for height in 0..2 {
        let (batch, _) =
            BatchTransition::decode(&store.get(height).unwrap().unwrap().witness_data).unwrap();
        let circuit = BatchCircuit::new(&batch).unwrap();
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        assert!(cs.is_satisfied().unwrap(), "batch {height} unsatisfied");
    }
}

#[tokio::test]
async fn tampered_batches_do_not_satisfy_the_circuit() {
    let store = Arc::new(MemoryWitnessStore::new());
    let mut builder = WitnessBuilder::new(
        memory_tree(2),
        Arc::clone(&store),
        four_accounts(),
        schema2(),
        options(2),
    );
    builder.run().await.unwrap();
    let (batch, _) =
        BatchTransition::decode(&store.get(0).unwrap().unwrap().witness_data).unwrap();

    let mut inflated = batch.clone();
    inflated.after_totals.equity += 1;
    let cs = ConstraintSystem::<Fr>::new_ref();
    BatchCircuit::new(&inflated)
        .unwrap()
        .generate_constraints(cs.clone())
        .unwrap();
    assert!(!cs.is_satisfied().unwrap());

    let mut rerooted = batch;
    rerooted.after_root = fr_to_bytes(Fr::from(1u64));
    let cs = ConstraintSystem::<Fr>::new_ref();
    BatchCircuit::new(&rerooted)
        .unwrap()
        .generate_constraints(cs.clone())
        .unwrap();
    assert!(!cs.is_satisfied().unwrap());
}

#[tokio::test]
#[ignore = "runs a full Groth16 setup, slow"]
async fn groth16_end_to_end() {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use reserva_prover::groth16;

    let store = Arc::new(MemoryWitnessStore::new());
    let mut builder = WitnessBuilder::new(
        memory_tree(2),
        Arc::clone(&store),
        four_accounts(),
        schema2(),
        options(2),
    );
    builder.run().await.unwrap();
    let (batch, _) =
        BatchTransition::decode(&store.get(0).unwrap().unwrap().witness_data).unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    let (pk, vk) = groth16::setup(2, 2, &mut rng).unwrap();
    let proof = groth16::prove(&pk, &batch).unwrap();
    assert!(groth16::verify(&vk, &batch.group_commitment, &proof).unwrap());

    let wrong = fr_to_bytes(Fr::from(42u64));
    assert!(!groth16::verify(&vk, &wrong, &proof).unwrap());
}
