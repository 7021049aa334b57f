//! Proof-path file decoding.
//!
//! The canonical format carries each node's balances as an ordered list
//! of (symbol, value) pairs. Two older exports encoded balances as a
//! colon/comma string over a fixed asset set; those decode through an
//! explicit compatibility path and are deprecated.

use serde::Deserialize;

use crate::verify::VerifyError;

/// Symbols of the deprecated five-asset balance string, in order.
const LEGACY_FIVE: [&str; 5] = ["BTC", "ETH", "TRX", "USDT", "HT"];
/// Symbols of the deprecated eight-asset balance string, in order.
const LEGACY_EIGHT: [&str; 8] = ["BTC", "ETH", "TRX", "USDT", "HT", "XRP", "DOGE", "SOL"];

#[derive(Debug, Deserialize)]
pub struct ProofFile {
    pub data: Vec<ProofNode>,
}

#[derive(Debug, Deserialize)]
pub struct ProofNode {
    #[serde(default, rename = "type")]
    pub kind: String,
    pub hash: String,
    #[serde(default)]
    pub uhash: String,
    #[serde(default)]
    pub depth: i64,
    /// 1 when the node sits on the right of its pair.
    pub r: i64,
    pub balances: RawBalances,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawBalances {
    Pairs(Vec<BalancePair>),
    Legacy(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalancePair {
    pub symbol: String,
    pub value: String,
}

impl RawBalances {
    /// Normalize into canonical pairs.
    pub fn normalize(&self) -> Result<Vec<BalancePair>, VerifyError> {
        match self {
            RawBalances::Pairs(pairs) => Ok(pairs.clone()),
            RawBalances::Legacy(raw) => decode_legacy(raw),
        }
    }
}

fn decode_legacy(raw: &str) -> Result<Vec<BalancePair>, VerifyError> {
    let entries: Vec<&str> = raw.split(',').collect();
    let symbols: &[&str] = match entries.len() {
        5 => &LEGACY_FIVE,
        8 => &LEGACY_EIGHT,
        n => {
            return Err(VerifyError::MalformedBalances(format!(
                "legacy balance string has {n} entries (expected 5 or 8)"
            )));
        }
    };
    let mut pairs = Vec::with_capacity(entries.len());
    for (entry, expected) in entries.iter().zip(symbols) {
        let (symbol, value) = entry.split_once(':').ok_or_else(|| {
            VerifyError::MalformedBalances(format!("legacy balance entry {entry:?} lacks a colon"))
        })?;
        if !symbol.eq_ignore_ascii_case(expected) {
            return Err(VerifyError::MalformedBalances(format!(
                "legacy balance entry {entry:?} out of order (expected {expected})"
            )));
        }
        pairs.push(BalancePair {
            symbol: expected.to_string(),
            value: value.to_string(),
        });
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_pairs_pass_through() {
        let json = r#"{"data":[{"type":"node","hash":"ab","r":0,
            "balances":[{"symbol":"BTC","value":"1.5"},{"symbol":"ETH","value":"0"}]}]}"#;
        let file: ProofFile = serde_json::from_str(json).unwrap();
        let pairs = file.data[0].balances.normalize().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].symbol, "BTC");
        assert_eq!(pairs[0].value, "1.5");
    }

    #[test]
    fn legacy_five_asset_string_decodes() {
        let raw = RawBalances::Legacy("btc:1.0,eth:2,trx:0,usdt:3.5,ht:0".into());
        let pairs = raw.normalize().unwrap();
        assert_eq!(
            pairs.iter().map(|p| p.symbol.as_str()).collect::<Vec<_>>(),
            vec!["BTC", "ETH", "TRX", "USDT", "HT"]
        );
        assert_eq!(pairs[3].value, "3.5");
    }

    #[test]
    fn legacy_wrong_arity_is_rejected() {
        let raw = RawBalances::Legacy("btc:1.0,eth:2".into());
        assert!(raw.normalize().is_err());
    }
}
