//! Proof-path verification.
//!
//! Rebuilds the root by combining the user's leaf with its sibling
//! nodes bottom-up. Each combination sums the per-asset balances and
//! hashes the child hashes together with the summed balances. A
//! root/balance mismatch is always reported as a descriptive error,
//! never as a bare failure.

use sha2::{Digest, Sha256};
use thiserror::Error;

use reserva_types::{format_scaled, parse_scaled};

use crate::proofpath::ProofNode;

/// Balances are carried at eight decimal places; excess digits round
/// down, as the exports do.
pub const BALANCE_DECIMALS: u32 = 8;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("proof path needs at least 3 nodes")]
    PathTooShort,

    #[error("malformed balances: {0}")]
    MalformedBalances(String),

    #[error("balance symbol mismatch between siblings: {left} vs {right}")]
    SymbolMismatch { left: String, right: String },

    #[error("balance overflow while summing {symbol}")]
    Overflow { symbol: String },

    #[error("rebuilt root hash {rebuilt} does not match proof file root {expected}")]
    RootHashMismatch { expected: String, rebuilt: String },

    #[error("rebuilt {symbol} balance {rebuilt} does not match proof file root balance {expected}")]
    RootBalanceMismatch {
        symbol: String,
        expected: String,
        rebuilt: String,
    },
}

/// One decoded path node: hex hash, side flag, scaled balances.
#[derive(Debug, Clone)]
pub struct PathNode {
    pub hash: String,
    pub right: bool,
    pub balances: Vec<(String, i128)>,
}

impl PathNode {
    pub fn from_proof_node(node: &ProofNode) -> Result<Self, VerifyError> {
        let mut balances = Vec::new();
        for pair in node.balances.normalize()? {
            let value = parse_scaled(&pair.value, BALANCE_DECIMALS)
                .map_err(|e| VerifyError::MalformedBalances(e.to_string()))?;
            balances.push((pair.symbol, value));
        }
        Ok(PathNode {
            hash: node.hash.clone(),
            right: node.r == 1,
            balances,
        })
    }
}

/// Combine two siblings: sum balances, hash `left.hash + right.hash +
/// summed balances`.
fn combine(left: &PathNode, right: &PathNode) -> Result<PathNode, VerifyError> {
    if left.balances.len() != right.balances.len() {
        return Err(VerifyError::MalformedBalances(format!(
            "sibling balance widths differ: {} vs {}",
            left.balances.len(),
            right.balances.len()
        )));
    }
    let mut balances = Vec::with_capacity(left.balances.len());
    for ((ls, lv), (rs, rv)) in left.balances.iter().zip(&right.balances) {
        if ls != rs {
            return Err(VerifyError::SymbolMismatch {
                left: ls.clone(),
                right: rs.clone(),
            });
        }
        let sum = lv
            .checked_add(*rv)
            .ok_or_else(|| VerifyError::Overflow { symbol: ls.clone() })?;
        balances.push((ls.clone(), sum));
    }

    let mut preimage = String::new();
    preimage.push_str(&left.hash);
    preimage.push_str(&right.hash);
    for (_, value) in &balances {
        preimage.push_str(&format_scaled(*value, BALANCE_DECIMALS));
    }
    let hash = hex::encode(Sha256::digest(preimage.as_bytes()));
    Ok(PathNode {
        hash,
        right: false,
        balances,
    })
}

/// Verify a decoded proof path: `[root, sibling_0, .., sibling_k, self]`.
pub fn verify_path(path: &[PathNode]) -> Result<(), VerifyError> {
    if path.len() < 3 {
        return Err(VerifyError::PathTooShort);
    }
    let own = &path[path.len() - 1];
    let mut node = if own.right {
        combine(&path[1], own)?
    } else {
        combine(own, &path[1])?
    };
    for sibling in &path[2..path.len() - 1] {
        node = if sibling.right {
            combine(&node, sibling)?
        } else {
            combine(sibling, &node)?
        };
    }

    let root = &path[0];
    if node.hash != root.hash {
        return Err(VerifyError::RootHashMismatch {
            expected: root.hash.clone(),
            rebuilt: node.hash.clone(),
        });
    }
    for ((symbol, expected), (_, rebuilt)) in root.balances.iter().zip(&node.balances) {
        if expected != rebuilt {
            return Err(VerifyError::RootBalanceMismatch {
                symbol: symbol.clone(),
                expected: format_scaled(*expected, BALANCE_DECIMALS),
                rebuilt: format_scaled(*rebuilt, BALANCE_DECIMALS),
            });
        }
    }
    Ok(())
}
