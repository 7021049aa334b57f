//! The versioned sparse account tree.
//!
//! The builder talks to the tree through [`SparseMerkleTree`]; the
//! generic [`VersionedSmt`] implements it over a pluggable node store
//! (in-memory for tests, RocksDB for the service). Mutations are staged
//! until `commit(version)` makes them durable; `rollback(version)`
//! discards committed forward versions for deterministic replay.

mod memory;
mod rocks;
mod tree;

use ark_bn254::Fr;

use reserva_prover::commitment::hash_pair;
use reserva_types::Result;

pub use memory::MemoryNodes;
pub use rocks::RocksNodes;
pub use tree::VersionedSmt;

pub type MemorySmt = VersionedSmt<MemoryNodes>;
pub type RocksSmt = VersionedSmt<RocksNodes>;

/// (level, index) address of a tree node. Level 0 holds the leaves.
pub type NodeKey = (u8, u64);

/// Prior value of a node touched by a version, used to undo it.
pub type UndoEntry = (NodeKey, Option<[u8; 32]>);

/// Bottom-up sibling path of one leaf, fixed depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerklePath {
    pub siblings: Vec<Fr>,
}

impl MerklePath {
    pub fn to_bytes(&self) -> Vec<[u8; 32]> {
        self.siblings
            .iter()
            .map(|s| reserva_prover::commitment::fr_to_bytes(*s))
            .collect()
    }
}

/// Contract of the versioned account tree.
pub trait SparseMerkleTree {
    /// The last durably committed version. 0 for an empty tree.
    fn latest_version(&self) -> Result<u64>;

    /// Current root, including staged mutations.
    fn root(&self) -> Result<Fr>;

    /// Sibling path of a leaf under the current (staged) state.
    fn get_proof(&self, index: u64) -> Result<MerklePath>;

    /// Stage a leaf write and recompute the path to the root.
    fn set(&mut self, index: u64, leaf: Fr) -> Result<()>;

    /// Durably apply staged mutations as `version`. Versions advance by
    /// exactly one.
    fn commit(&mut self, version: u64) -> Result<u64>;

    /// Discard all committed versions above `version`, and any staged
    /// mutations.
    fn rollback(&mut self, version: u64) -> Result<()>;
}

/// Node persistence behind [`VersionedSmt`].
pub trait NodeStore {
    fn get_node(&self, key: NodeKey) -> Result<Option<[u8; 32]>>;
    fn latest_version(&self) -> Result<u64>;
    /// Atomically apply node writes, record the undo journal, and advance
    /// the version counter.
    fn commit_version(
        &mut self,
        version: u64,
        writes: &[(NodeKey, [u8; 32])],
        undo: &[UndoEntry],
    ) -> Result<()>;
    /// Atomically undo one committed version and step the counter back.
    fn revert_version(&mut self, version: u64) -> Result<()>;
}

/// Fold a leaf up its sibling path. Bit i of the leaf index decides
/// whether the running node is the right child at level i.
pub fn fold_path(leaf: Fr, index: u64, path: &MerklePath) -> Fr {
    let mut node = leaf;
    let mut idx = index;
    for sibling in &path.siblings {
        node = if idx & 1 == 1 {
            hash_pair(*sibling, node)
        } else {
            hash_pair(node, *sibling)
        };
        idx >>= 1;
    }
    node
}

/// Check that `leaf` sits at `index` under `root`.
pub fn verify_leaf(root: Fr, leaf: Fr, index: u64, path: &MerklePath) -> bool {
    fold_path(leaf, index, path) == root
}
