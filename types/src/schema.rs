use serde::{Deserialize, Serialize};

/// The ordered set of asset types known to a run.
///
/// Built once at ingestion from the data set header and threaded by
/// reference through the pipeline; persisted inside every witness blob so
/// a resumed run can detect schema drift. This replaces the legacy
/// process-wide coin list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSchema {
    pub version: u32,
    pub symbols: Vec<String>,
    /// Fixed-point decimal places per asset, index-aligned with `symbols`.
    pub decimals: Vec<u32>,
}

impl AssetSchema {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(symbols: Vec<String>, decimals: Vec<u32>) -> Self {
        debug_assert_eq!(symbols.len(), decimals.len());
        AssetSchema {
            version: Self::CURRENT_VERSION,
            symbols,
            decimals,
        }
    }

    /// The AssetCount of the run: the width of every dense asset vector.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn index_of(&self, symbol: &str) -> Option<u16> {
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .map(|i| i as u16)
    }
}
