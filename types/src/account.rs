use serde::{Deserialize, Serialize};

/// One nonzero asset position of an account. `index` points into the
/// asset schema, `balance` is a signed scaled fixed-point quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAsset {
    pub index: u16,
    pub balance: i64,
}

/// A user account as produced by ingestion. Immutable once ingested.
///
/// `account_index` is the dense tree leaf position assigned at ingestion,
/// `id_hash` the canonical field-element bytes of the hashed user id.
/// Invariant: `total_equity >= total_debt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_index: u32,
    pub id_hash: [u8; 32],
    pub total_equity: u64,
    pub total_debt: u64,
    pub assets: Vec<AccountAsset>,
}

impl AccountRecord {
    /// A zero-valued account used to pad the final batch. Its leaf
    /// commitment equals the empty-leaf sentinel, so inserting it leaves
    /// the tree root unchanged.
    pub fn padding(account_index: u32) -> Self {
        AccountRecord {
            account_index,
            id_hash: [0u8; 32],
            total_equity: 0,
            total_debt: 0,
            assets: Vec::new(),
        }
    }

    /// Expand the sparse asset list into a dense, index-ordered vector of
    /// `asset_count` balances. Callers validate index bounds beforehand.
    pub fn dense_balances(&self, asset_count: usize) -> Vec<i64> {
        let mut dense = vec![0i64; asset_count];
        for asset in &self.assets {
            dense[asset.index as usize] = asset.balance;
        }
        dense
    }

    pub fn is_solvent(&self) -> bool {
        self.total_equity >= self.total_debt
    }
}
