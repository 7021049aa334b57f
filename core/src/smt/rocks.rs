use std::path::Path;
use std::sync::Arc;

use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};

use reserva_types::{Error, Result};

use super::{NodeKey, NodeStore, UndoEntry};

const CF_NODES: &str = "nodes";
const CF_JOURNAL: &str = "journal";
const CF_META: &str = "meta";

const META_VERSION_KEY: &[u8] = b"latest_version";

/// RocksDB-backed node store for the account tree.
#[derive(Clone)]
pub struct RocksNodes {
    db: Arc<DB>,
}

fn node_key_bytes(key: NodeKey) -> [u8; 9] {
    let mut out = [0u8; 9];
    out[0] = key.0;
    out[1..].copy_from_slice(&key.1.to_be_bytes());
    out
}

impl RocksNodes {
    /// Opens the tree database at the given path, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = vec![
            ColumnFamilyDescriptor::new(CF_NODES, Options::default()),
            ColumnFamilyDescriptor::new(CF_JOURNAL, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, families)
            .map_err(|e| Error::Tree(format!("open tree db: {e}")))?;
        Ok(RocksNodes { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Tree(format!("column family {name} missing")))
    }
}

impl NodeStore for RocksNodes {
    fn get_node(&self, key: NodeKey) -> Result<Option<[u8; 32]>> {
        let cf = self.cf(CF_NODES)?;
        let value = self
            .db
            .get_cf(cf, node_key_bytes(key))
            .map_err(|e| Error::Tree(format!("read node: {e}")))?;
        match value {
            Some(bytes) => {
                let node: [u8; 32] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Tree("corrupt node value".into()))?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    fn latest_version(&self) -> Result<u64> {
        let cf = self.cf(CF_META)?;
        let value = self
            .db
            .get_cf(cf, META_VERSION_KEY)
            .map_err(|e| Error::Tree(format!("read version: {e}")))?;
        match value {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Tree("corrupt version value".into()))?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    fn commit_version(
        &mut self,
        version: u64,
        writes: &[(NodeKey, [u8; 32])],
        undo: &[UndoEntry],
    ) -> Result<()> {
        let nodes_cf = self.cf(CF_NODES)?;
        let journal_cf = self.cf(CF_JOURNAL)?;
        let meta_cf = self.cf(CF_META)?;

        let journal =
            bincode::serialize(undo).map_err(|e| Error::Tree(format!("encode journal: {e}")))?;

        let mut batch = WriteBatch::default();
        for (key, value) in writes {
            batch.put_cf(nodes_cf, node_key_bytes(*key), value);
        }
        batch.put_cf(journal_cf, version.to_be_bytes(), journal);
        batch.put_cf(meta_cf, META_VERSION_KEY, version.to_be_bytes());
        self.db
            .write(batch)
            .map_err(|e| Error::Tree(format!("commit version {version}: {e}")))
    }

    fn revert_version(&mut self, version: u64) -> Result<()> {
        let nodes_cf = self.cf(CF_NODES)?;
        let journal_cf = self.cf(CF_JOURNAL)?;
        let meta_cf = self.cf(CF_META)?;

        let raw = self
            .db
            .get_cf(journal_cf, version.to_be_bytes())
            .map_err(|e| Error::Tree(format!("read journal: {e}")))?
            .ok_or_else(|| Error::Tree(format!("no undo journal for version {version}")))?;
        let entries: Vec<UndoEntry> =
            bincode::deserialize(&raw).map_err(|e| Error::Tree(format!("decode journal: {e}")))?;

        let mut batch = WriteBatch::default();
        for (key, prior) in entries {
            match prior {
                Some(value) => batch.put_cf(nodes_cf, node_key_bytes(key), value),
                None => batch.delete_cf(nodes_cf, node_key_bytes(key)),
            }
        }
        batch.delete_cf(journal_cf, version.to_be_bytes());
        batch.put_cf(meta_cf, META_VERSION_KEY, (version - 1).to_be_bytes());
        self.db
            .write(batch)
            .map_err(|e| Error::Tree(format!("revert version {version}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::super::{SparseMerkleTree, VersionedSmt};
    use super::*;
    use ark_bn254::Fr;
    use tempfile::TempDir;

    #[test]
    fn survives_reopen_and_rolls_back() {
        let dir = TempDir::new().unwrap();
        let root1;
        {
            let mut tree = VersionedSmt::new(RocksNodes::open(dir.path()).unwrap(), 2).unwrap();
            tree.set(0, Fr::from(11u64)).unwrap();
            tree.commit(1).unwrap();
            root1 = tree.root().unwrap();
            tree.set(1, Fr::from(22u64)).unwrap();
            tree.commit(2).unwrap();
        }
        {
            let mut tree = VersionedSmt::new(RocksNodes::open(dir.path()).unwrap(), 2).unwrap();
            assert_eq!(tree.latest_version().unwrap(), 2);
            tree.rollback(1).unwrap();
            assert_eq!(tree.latest_version().unwrap(), 1);
            assert_eq!(tree.root().unwrap(), root1);
        }
    }
}
