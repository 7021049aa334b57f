use std::collections::{BTreeMap, HashMap};

use reserva_types::{Error, Result};

use super::{NodeKey, NodeStore, UndoEntry};

/// In-memory node store, used by tests and throwaway runs.
#[derive(Default)]
pub struct MemoryNodes {
    nodes: HashMap<NodeKey, [u8; 32]>,
    journal: BTreeMap<u64, Vec<UndoEntry>>,
    version: u64,
}

impl MemoryNodes {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NodeStore for MemoryNodes {
    fn get_node(&self, key: NodeKey) -> Result<Option<[u8; 32]>> {
        Ok(self.nodes.get(&key).copied())
    }

    fn latest_version(&self) -> Result<u64> {
        Ok(self.version)
    }

    fn commit_version(
        &mut self,
        version: u64,
        writes: &[(NodeKey, [u8; 32])],
        undo: &[UndoEntry],
    ) -> Result<()> {
        for (key, value) in writes {
            self.nodes.insert(*key, *value);
        }
        self.journal.insert(version, undo.to_vec());
        self.version = version;
        Ok(())
    }

    fn revert_version(&mut self, version: u64) -> Result<()> {
        let entries = self
            .journal
            .remove(&version)
            .ok_or_else(|| Error::Tree(format!("no undo journal for version {version}")))?;
        for (key, prior) in entries {
            match prior {
                Some(value) => self.nodes.insert(key, value),
                None => self.nodes.remove(&key),
            };
        }
        self.version = version - 1;
        Ok(())
    }
}
