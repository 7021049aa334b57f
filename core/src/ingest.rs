//! CSV account ingestion.
//!
//! Reads a directory of account export files. The header row carries the
//! asset symbols; each data row is `record_id, user_id, <balances...>,
//! total_equity, total_debt`. Balances are decimal strings converted to
//! scaled fixed-point integers. Rows that fail to parse or carry more
//! debt than equity are skipped and counted.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use ark_bn254::Fr;
use ark_ff::PrimeField;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use reserva_prover::commitment::fr_to_bytes;
use reserva_types::{AccountAsset, AccountRecord, AssetSchema, parse_scaled_i64, parse_scaled_u64};

/// Symbols historically exported with two decimal places instead of
/// eight. Recorded into the schema at ingestion; nothing global.
const TWO_DIGIT_ASSETS: &[&str] = &[
    "BTTC", "SHIB", "LUNC", "XEC", "WIN", "BIDR", "SPELL", "HOT", "DOGE",
];

const DEFAULT_DECIMALS: u32 = 8;
const EQUITY_DECIMALS: u32 = 8;

pub struct IngestReport {
    pub accounts: Vec<AccountRecord>,
    pub schema: AssetSchema,
    pub invalid_rows: usize,
}

/// Hash a user id into the canonical field-element bytes used as the
/// account id in leaf commitments.
pub fn account_id_hash(user_id: &str) -> [u8; 32] {
    let digest = Sha256::digest(user_id.as_bytes());
    fr_to_bytes(Fr::from_be_bytes_mod_order(&digest))
}

/// Parse every `.csv` file under `dir`, in name order, into one dense
/// account set. The first file fixes the asset schema; the others must
/// agree with it.
pub fn parse_account_dir(dir: &Path) -> Result<IngestReport> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading account directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();
    if files.is_empty() {
        bail!("no .csv files under {}", dir.display());
    }

    let mut schema: Option<AssetSchema> = None;
    let mut accounts = Vec::new();
    let mut invalid_rows = 0usize;
    for file in &files {
        let file_schema = read_schema(file)?;
        if let Some(existing) = &schema {
            if *existing != file_schema {
                bail!(
                    "asset schema of {} disagrees with the first file",
                    file.display()
                );
            }
        } else {
            schema = Some(file_schema);
        }
        let current = schema.as_ref().expect("schema set above");
        invalid_rows += read_accounts(file, current, &mut accounts)?;
        info!(file = %file.display(), total = accounts.len(), "ingested account file");
    }

    let schema = schema.expect("at least one file");
    info!(
        accounts = accounts.len(),
        assets = schema.len(),
        invalid_rows,
        "account ingestion finished"
    );
    Ok(IngestReport {
        accounts,
        schema,
        invalid_rows,
    })
}

fn read_schema(path: &Path) -> Result<AssetSchema> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening account file {}", path.display()))?;
    let headers = reader.headers().context("reading header row")?;
    if headers.len() < 5 {
        bail!(
            "account file {} needs id, uid, at least one asset and the totals columns",
            path.display()
        );
    }
    let symbols: Vec<String> = headers
        .iter()
        .skip(2)
        .take(headers.len() - 4)
        .map(|h| h.split('_').next().unwrap_or(h).to_string())
        .collect();
    let decimals = symbols
        .iter()
        .map(|s| {
            if TWO_DIGIT_ASSETS.contains(&s.as_str()) {
                2
            } else {
                DEFAULT_DECIMALS
            }
        })
        .collect();
    Ok(AssetSchema::new(symbols, decimals))
}

/// Append the file's valid rows to `accounts`; returns the number of
/// rows skipped.
fn read_accounts(
    path: &Path,
    schema: &AssetSchema,
    accounts: &mut Vec<AccountRecord>,
) -> Result<usize> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening account file {}", path.display()))?;
    let asset_count = schema.len();
    let mut invalid = 0usize;

    for (row_number, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("reading row {row_number} of {}", path.display()))?;
        if row.len() != asset_count + 4 {
            warn!(row = row_number, "row has wrong column count, skipping");
            invalid += 1;
            continue;
        }
        let user_id = &row[1];

        let mut assets = Vec::new();
        let mut row_ok = true;
        for j in 0..asset_count {
            match parse_scaled_i64(&row[j + 2], schema.decimals[j]) {
                Ok(0) => {}
                Ok(balance) => assets.push(AccountAsset {
                    index: j as u16,
                    balance,
                }),
                Err(e) => {
                    warn!(row = row_number, symbol = %schema.symbols[j], %e, "bad balance, skipping row");
                    row_ok = false;
                    break;
                }
            }
        }
        if !row_ok {
            invalid += 1;
            continue;
        }

        let total_equity = match parse_scaled_u64(&row[asset_count + 2], EQUITY_DECIMALS) {
            Ok(v) => v,
            Err(e) => {
                warn!(row = row_number, %e, "bad total equity, skipping row");
                invalid += 1;
                continue;
            }
        };
        let total_debt = match parse_scaled_u64(&row[asset_count + 3], EQUITY_DECIMALS) {
            Ok(v) => v,
            Err(e) => {
                warn!(row = row_number, %e, "bad total debt, skipping row");
                invalid += 1;
                continue;
            }
        };
        if total_debt > total_equity {
            warn!(row = row_number, "debt above equity, skipping row");
            invalid += 1;
            continue;
        }

        accounts.push(AccountRecord {
            account_index: accounts.len() as u32,
            id_hash: account_id_hash(user_id),
            total_equity,
            total_debt,
            assets,
        });
    }
    Ok(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, content: &str) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn parses_accounts_and_schema() {
        let dir = tempfile::TempDir::new().unwrap();
        write_csv(
            dir.path(),
            "accounts_0.csv",
            "id,uid,BTC_balance,DOGE_balance,total_equity,total_debt\n\
             1,alice,1.5,0.0,2.0,0.5\n\
             2,bob,0.0,3.25,1.0,0.0\n",
        );
        let report = parse_account_dir(dir.path()).unwrap();
        assert_eq!(report.schema.symbols, vec!["BTC", "DOGE"]);
        assert_eq!(report.schema.decimals, vec![8, 2]);
        assert_eq!(report.invalid_rows, 0);
        assert_eq!(report.accounts.len(), 2);

        let alice = &report.accounts[0];
        assert_eq!(alice.account_index, 0);
        assert_eq!(alice.assets, vec![AccountAsset { index: 0, balance: 150_000_000 }]);
        assert_eq!(alice.total_equity, 200_000_000);
        assert_eq!(alice.total_debt, 50_000_000);
        assert_eq!(alice.id_hash, account_id_hash("alice"));

        let bob = &report.accounts[1];
        assert_eq!(bob.assets, vec![AccountAsset { index: 1, balance: 325 }]);
    }

    #[test]
    fn skips_invalid_rows_and_keeps_indices_dense() {
        let dir = tempfile::TempDir::new().unwrap();
        write_csv(
            dir.path(),
            "accounts_0.csv",
            "id,uid,BTC_balance,total_equity,total_debt\n\
             1,alice,xx,1.0,0.0\n\
             2,bob,1.0,0.5,2.0\n\
             3,carol,1.0,1.0,0.0\n",
        );
        let report = parse_account_dir(dir.path()).unwrap();
        assert_eq!(report.invalid_rows, 2);
        assert_eq!(report.accounts.len(), 1);
        assert_eq!(report.accounts[0].account_index, 0);
        assert_eq!(report.accounts[0].id_hash, account_id_hash("carol"));
    }

    #[test]
    fn rejects_schema_drift_between_files() {
        let dir = tempfile::TempDir::new().unwrap();
        write_csv(
            dir.path(),
            "a.csv",
            "id,uid,BTC_b,total_equity,total_debt\n1,u,1.0,1.0,0.0\n",
        );
        write_csv(
            dir.path(),
            "b.csv",
            "id,uid,ETH_b,total_equity,total_debt\n1,u,1.0,1.0,0.0\n",
        );
        assert!(parse_account_dir(dir.path()).is_err());
    }
}
