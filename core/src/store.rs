//! Append-only, height-keyed persistence of batch witnesses.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options};

use reserva_types::{Error, Result, StoredWitness};

const CF_WITNESS: &str = "batch_witness";

/// Contract of the witness store. Records are immutable once written.
pub trait BatchWitnessStore: Send + Sync {
    /// Prepare the backing table. Idempotent.
    fn create_table(&self) -> Result<()>;

    /// Append a record. Fails if the height is already present.
    fn append(&self, witness: &StoredWitness) -> Result<()>;

    /// Fetch one record by height.
    fn get(&self, height: u64) -> Result<Option<StoredWitness>>;

    /// The highest-height record, if any.
    fn get_latest(&self) -> Result<Option<StoredWitness>>;
}

/// RocksDB-backed store. Heights are big-endian keys so the end of the
/// column family is the latest record.
#[derive(Clone)]
pub struct RocksWitnessStore {
    db: Arc<DB>,
}

impl RocksWitnessStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = vec![ColumnFamilyDescriptor::new(CF_WITNESS, Options::default())];
        let db = DB::open_cf_descriptors(&opts, path, families)
            .map_err(|e| Error::Store(format!("open witness db: {e}")))?;
        Ok(RocksWitnessStore { db: Arc::new(db) })
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_WITNESS)
            .ok_or_else(|| Error::Store(format!("column family {CF_WITNESS} missing")))
    }
}

impl BatchWitnessStore for RocksWitnessStore {
    fn create_table(&self) -> Result<()> {
        // Column families are created at open.
        self.cf().map(|_| ())
    }

    fn append(&self, witness: &StoredWitness) -> Result<()> {
        let cf = self.cf()?;
        let key = witness.height.to_be_bytes();
        let existing = self
            .db
            .get_cf(cf, key)
            .map_err(|e| Error::Store(format!("read witness {}: {e}", witness.height)))?;
        if existing.is_some() {
            return Err(Error::Store(format!(
                "witness for height {} already present",
                witness.height
            )));
        }
        let value = bincode::serialize(witness)
            .map_err(|e| Error::Store(format!("encode witness {}: {e}", witness.height)))?;
        self.db
            .put_cf(cf, key, value)
            .map_err(|e| Error::Store(format!("write witness {}: {e}", witness.height)))
    }

    fn get(&self, height: u64) -> Result<Option<StoredWitness>> {
        let cf = self.cf()?;
        let value = self
            .db
            .get_cf(cf, height.to_be_bytes())
            .map_err(|e| Error::Store(format!("read witness {height}: {e}")))?;
        value
            .map(|bytes| {
                bincode::deserialize(&bytes)
                    .map_err(|e| Error::Store(format!("decode witness {height}: {e}")))
            })
            .transpose()
    }

    fn get_latest(&self) -> Result<Option<StoredWitness>> {
        let cf = self.cf()?;
        let mut iter = self.db.iterator_cf(cf, IteratorMode::End);
        match iter.next() {
            Some(Ok((_key, value))) => {
                let witness = bincode::deserialize(&value)
                    .map_err(|e| Error::Store(format!("decode latest witness: {e}")))?;
                Ok(Some(witness))
            }
            Some(Err(e)) => Err(Error::Store(format!("iterate witnesses: {e}"))),
            None => Ok(None),
        }
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryWitnessStore {
    records: Mutex<BTreeMap<u64, StoredWitness>>,
}

impl MemoryWitnessStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchWitnessStore for MemoryWitnessStore {
    fn create_table(&self) -> Result<()> {
        Ok(())
    }

    fn append(&self, witness: &StoredWitness) -> Result<()> {
        let mut records = self.records.lock().expect("store lock poisoned");
        if records.contains_key(&witness.height) {
            return Err(Error::Store(format!(
                "witness for height {} already present",
                witness.height
            )));
        }
        records.insert(witness.height, witness.clone());
        Ok(())
    }

    fn get(&self, height: u64) -> Result<Option<StoredWitness>> {
        let records = self.records.lock().expect("store lock poisoned");
        Ok(records.get(&height).cloned())
    }

    fn get_latest(&self) -> Result<Option<StoredWitness>> {
        let records = self.records.lock().expect("store lock poisoned");
        Ok(records.values().next_back().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reserva_types::WitnessStatus;
    use tempfile::TempDir;

    fn record(height: u64) -> StoredWitness {
        StoredWitness {
            height,
            witness_data: format!("blob-{height}"),
            status: WitnessStatus::Published,
        }
    }

    #[test]
    fn rocks_append_get_latest() {
        let dir = TempDir::new().unwrap();
        let store = RocksWitnessStore::open(dir.path()).unwrap();
        store.create_table().unwrap();
        assert!(store.get_latest().unwrap().is_none());

        for h in 0..5 {
            store.append(&record(h)).unwrap();
        }
        assert_eq!(store.get_latest().unwrap().unwrap().height, 4);
        assert_eq!(store.get(2).unwrap().unwrap().witness_data, "blob-2");
        assert!(store.get(9).unwrap().is_none());

        let err = store.append(&record(3)).unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn memory_mirrors_rocks_semantics() {
        let store = MemoryWitnessStore::new();
        store.append(&record(0)).unwrap();
        store.append(&record(1)).unwrap();
        assert_eq!(store.get_latest().unwrap().unwrap().height, 1);
        assert!(store.append(&record(1)).is_err());
    }
}
