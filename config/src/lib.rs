//! Reserva configuration.
//!
//! Handles loading configuration from:
//! 1. RESERVA_CONFIG env var (explicit path)
//! 2. ./reserva.toml (current directory)
//! 3. ~/.reserva/reserva.toml (user home)
//!
//! Environment variables take precedence over TOML values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "reserva.toml";
const CONFIG_DIR_NAME: &str = ".reserva";

const DEFAULT_WITNESS_DB: &str = "./reserva-db/witness";
const DEFAULT_TREE_DB: &str = "./reserva-db/tree";
const DEFAULT_USER_DATA_DIR: &str = "./userdata";
const DEFAULT_BATCH_SIZE: usize = 64;
const DEFAULT_QUEUE_DEPTH: usize = 100;
const DEFAULT_WORKER_RESERVE: usize = 2;
const DEFAULT_PROVING_KEY: &str = "./keys/proving.key";
const DEFAULT_VERIFYING_KEY: &str = "./keys/verifying.key";

/// Root configuration structure (matches TOML layout).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservaConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub witness: WitnessConfig,
    #[serde(default)]
    pub keys: KeyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_witness_db")]
    pub witness_path: PathBuf,
    #[serde(default = "default_tree_db")]
    pub tree_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessConfig {
    #[serde(default = "default_user_data_dir")]
    pub user_data_dir: PathBuf,
    /// Accounts per batch; must match the shape the keys were generated for.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Bound of the persistence queue between builder and writer.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Cores withheld from the hashing worker pool.
    #[serde(default = "default_worker_reserve")]
    pub worker_reserve: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    #[serde(default = "default_proving_key")]
    pub proving_key: PathBuf,
    #[serde(default = "default_verifying_key")]
    pub verifying_key: PathBuf,
}

fn default_witness_db() -> PathBuf {
    DEFAULT_WITNESS_DB.into()
}
fn default_tree_db() -> PathBuf {
    DEFAULT_TREE_DB.into()
}
fn default_user_data_dir() -> PathBuf {
    DEFAULT_USER_DATA_DIR.into()
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}
fn default_worker_reserve() -> usize {
    DEFAULT_WORKER_RESERVE
}
fn default_proving_key() -> PathBuf {
    DEFAULT_PROVING_KEY.into()
}
fn default_verifying_key() -> PathBuf {
    DEFAULT_VERIFYING_KEY.into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            witness_path: default_witness_db(),
            tree_path: default_tree_db(),
        }
    }
}

impl Default for WitnessConfig {
    fn default() -> Self {
        WitnessConfig {
            user_data_dir: default_user_data_dir(),
            batch_size: default_batch_size(),
            queue_depth: default_queue_depth(),
            worker_reserve: default_worker_reserve(),
        }
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        KeyConfig {
            proving_key: default_proving_key(),
            verifying_key: default_verifying_key(),
        }
    }
}

impl ReservaConfig {
    /// Load configuration from the usual locations, then apply env
    /// overrides. Missing files fall back to defaults.
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => ReservaConfig::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("RESERVA_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let user = home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
            if user.exists() {
                return Some(user);
            }
        }
        None
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = env::var("RESERVA_WITNESS_DB") {
            self.database.witness_path = path.into();
        }
        if let Ok(path) = env::var("RESERVA_TREE_DB") {
            self.database.tree_path = path.into();
        }
        if let Ok(path) = env::var("RESERVA_USER_DATA") {
            self.witness.user_data_dir = path.into();
        }
        if let Ok(v) = env::var("RESERVA_BATCH_SIZE") {
            self.witness.batch_size = v.parse().context("RESERVA_BATCH_SIZE must be a number")?;
        }
        if let Ok(v) = env::var("RESERVA_QUEUE_DEPTH") {
            self.witness.queue_depth = v.parse().context("RESERVA_QUEUE_DEPTH must be a number")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ReservaConfig::default();
        assert_eq!(config.witness.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.witness.queue_depth, DEFAULT_QUEUE_DEPTH);
        assert_eq!(config.database.witness_path, PathBuf::from(DEFAULT_WITNESS_DB));
    }

    #[test]
    fn parses_partial_toml() {
        let config: ReservaConfig = toml::from_str(
            r#"
            [witness]
            batch_size = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.witness.batch_size, 8);
        assert_eq!(config.witness.queue_depth, DEFAULT_QUEUE_DEPTH);
    }

    #[test]
    fn env_overrides_apply() {
        // Env vars are process-global; keep this test self-contained.
        unsafe {
            env::set_var("RESERVA_BATCH_SIZE", "16");
        }
        let mut config = ReservaConfig::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.witness.batch_size, 16);
        unsafe {
            env::remove_var("RESERVA_BATCH_SIZE");
        }
    }
}
