use std::collections::HashMap;

use ark_bn254::Fr;

use reserva_prover::commitment::{empty_leaf, fr_from_bytes, fr_to_bytes, hash_pair};
use reserva_types::{Error, Result, TREE_DEPTH};

use super::{MerklePath, NodeKey, NodeStore, SparseMerkleTree};

/// Sparse Merkle tree over a node store, with staged writes and
/// per-version undo journals.
///
/// Untouched subtrees resolve to a precomputed default-hash table seeded
/// with the empty-leaf sentinel of the run's asset schema.
pub struct VersionedSmt<N> {
    nodes: N,
    defaults: Vec<[u8; 32]>,
    staged: HashMap<NodeKey, [u8; 32]>,
    undo: HashMap<NodeKey, Option<[u8; 32]>>,
}

impl<N: NodeStore> VersionedSmt<N> {
    pub fn new(nodes: N, asset_count: usize) -> Result<Self> {
        let mut defaults = Vec::with_capacity(TREE_DEPTH + 1);
        let mut node = empty_leaf(asset_count);
        defaults.push(fr_to_bytes(node));
        for _ in 0..TREE_DEPTH {
            node = hash_pair(node, node);
            defaults.push(fr_to_bytes(node));
        }
        Ok(VersionedSmt {
            nodes,
            defaults,
            staged: HashMap::new(),
            undo: HashMap::new(),
        })
    }

    fn node(&self, key: NodeKey) -> Result<[u8; 32]> {
        if let Some(value) = self.staged.get(&key) {
            return Ok(*value);
        }
        if let Some(value) = self.nodes.get_node(key)? {
            return Ok(value);
        }
        Ok(self.defaults[key.0 as usize])
    }

    fn stage(&mut self, key: NodeKey, value: [u8; 32]) -> Result<()> {
        if !self.undo.contains_key(&key) {
            let prior = self.nodes.get_node(key)?;
            self.undo.insert(key, prior);
        }
        self.staged.insert(key, value);
        Ok(())
    }
}

impl<N: NodeStore> SparseMerkleTree for VersionedSmt<N> {
    fn latest_version(&self) -> Result<u64> {
        self.nodes.latest_version()
    }

    fn root(&self) -> Result<Fr> {
        Ok(fr_from_bytes(&self.node((TREE_DEPTH as u8, 0))?))
    }

    fn get_proof(&self, index: u64) -> Result<MerklePath> {
        if index >= 1u64 << TREE_DEPTH {
            return Err(Error::Tree(format!("leaf index {index} out of range")));
        }
        let mut siblings = Vec::with_capacity(TREE_DEPTH);
        for level in 0..TREE_DEPTH {
            let sibling = (index >> level) ^ 1;
            siblings.push(fr_from_bytes(&self.node((level as u8, sibling))?));
        }
        Ok(MerklePath { siblings })
    }

    fn set(&mut self, index: u64, leaf: Fr) -> Result<()> {
        if index >= 1u64 << TREE_DEPTH {
            return Err(Error::Tree(format!("leaf index {index} out of range")));
        }
        self.stage((0, index), fr_to_bytes(leaf))?;
        let mut idx = index;
        for level in 1..=TREE_DEPTH {
            idx >>= 1;
            let left = fr_from_bytes(&self.node((level as u8 - 1, idx * 2))?);
            let right = fr_from_bytes(&self.node((level as u8 - 1, idx * 2 + 1))?);
            self.stage((level as u8, idx), fr_to_bytes(hash_pair(left, right)))?;
        }
        Ok(())
    }

    fn commit(&mut self, version: u64) -> Result<u64> {
        let expected = self.nodes.latest_version()? + 1;
        if version != expected {
            return Err(Error::Tree(format!(
                "non-sequential commit: version {version}, expected {expected}"
            )));
        }
        let writes: Vec<(NodeKey, [u8; 32])> =
            self.staged.iter().map(|(k, v)| (*k, *v)).collect();
        let undo: Vec<(NodeKey, Option<[u8; 32]>)> =
            self.undo.iter().map(|(k, v)| (*k, *v)).collect();
        self.nodes.commit_version(version, &writes, &undo)?;
        self.staged.clear();
        self.undo.clear();
        Ok(version)
    }

    fn rollback(&mut self, version: u64) -> Result<()> {
        self.staged.clear();
        self.undo.clear();
        let mut latest = self.nodes.latest_version()?;
        if version > latest {
            return Err(Error::Tree(format!(
                "cannot roll back to version {version}: latest is {latest}"
            )));
        }
        while latest > version {
            self.nodes.revert_version(latest)?;
            latest -= 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{MemoryNodes, fold_path, verify_leaf};
    use super::*;

    fn tree() -> VersionedSmt<MemoryNodes> {
        VersionedSmt::new(MemoryNodes::new(), 2).unwrap()
    }

    #[test]
    fn empty_tree_root_is_default() {
        let t = tree();
        let mut expected = empty_leaf(2);
        for _ in 0..TREE_DEPTH {
            expected = hash_pair(expected, expected);
        }
        assert_eq!(t.root().unwrap(), expected);
        assert_eq!(t.latest_version().unwrap(), 0);
    }

    #[test]
    fn set_updates_root_and_proofs_verify() {
        let mut t = tree();
        let leaf = Fr::from(77u64);
        let proof_before = t.get_proof(5).unwrap();
        let root_before = t.root().unwrap();
        assert!(verify_leaf(root_before, empty_leaf(2), 5, &proof_before));

        t.set(5, leaf).unwrap();
        let root_after = t.root().unwrap();
        assert_ne!(root_before, root_after);
        let proof_after = t.get_proof(5).unwrap();
        assert!(verify_leaf(root_after, leaf, 5, &proof_after));
        // Substituting the new leaf along the pre-insert path yields the
        // post-insert root, the relation the circuit enforces.
        assert_eq!(fold_path(leaf, 5, &proof_before), root_after);
    }

    #[test]
    fn commit_is_sequential_and_rollback_restores() {
        let mut t = tree();
        let root0 = t.root().unwrap();

        t.set(0, Fr::from(1u64)).unwrap();
        assert!(t.commit(2).is_err());
        t.commit(1).unwrap();
        let root1 = t.root().unwrap();

        t.set(1, Fr::from(2u64)).unwrap();
        t.commit(2).unwrap();
        assert_eq!(t.latest_version().unwrap(), 2);

        t.rollback(1).unwrap();
        assert_eq!(t.latest_version().unwrap(), 1);
        assert_eq!(t.root().unwrap(), root1);

        t.rollback(0).unwrap();
        assert_eq!(t.root().unwrap(), root0);
        assert!(t.rollback(5).is_err());
    }

    #[test]
    fn rollback_discards_staged_writes() {
        let mut t = tree();
        let root0 = t.root().unwrap();
        t.set(3, Fr::from(9u64)).unwrap();
        assert_ne!(t.root().unwrap(), root0);
        t.rollback(0).unwrap();
        assert_eq!(t.root().unwrap(), root0);
    }
}
