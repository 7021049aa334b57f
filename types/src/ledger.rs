use serde::{Deserialize, Serialize};

use crate::{AccountAsset, Error, Result};

/// Dense vector of signed running balances, one per schema asset.
///
/// Exclusively owned and mutated by the witness builder. All additions
/// are checked; overflow is fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerVector(Vec<i64>);

impl LedgerVector {
    pub fn new(asset_count: usize) -> Self {
        LedgerVector(vec![0i64; asset_count])
    }

    pub fn from_vec(balances: Vec<i64>) -> Self {
        LedgerVector(balances)
    }

    pub fn balances(&self) -> &[i64] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<i64> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fold one account's sparse asset deltas into the running balances.
    pub fn fold(&mut self, assets: &[AccountAsset]) -> Result<()> {
        for asset in assets {
            let slot = self
                .0
                .get_mut(asset.index as usize)
                .ok_or_else(|| Error::Decode(format!("asset index {} outside schema", asset.index)))?;
            *slot = slot.checked_add(asset.balance).ok_or_else(|| {
                Error::ArithmeticOverflow(format!("ledger balance for asset {}", asset.index))
            })?;
        }
        Ok(())
    }

    /// Fold a dense delta vector, as carried by a decoded instruction.
    pub fn fold_dense(&mut self, deltas: &[i64]) -> Result<()> {
        if deltas.len() != self.0.len() {
            return Err(Error::Decode(format!(
                "dense delta width {} does not match ledger width {}",
                deltas.len(),
                self.0.len()
            )));
        }
        for (slot, delta) in self.0.iter_mut().zip(deltas) {
            *slot = slot.checked_add(*delta).ok_or_else(|| {
                Error::ArithmeticOverflow("ledger balance during dense fold".into())
            })?;
        }
        Ok(())
    }
}
