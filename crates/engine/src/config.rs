//! Deployment configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// The default name for the embark configuration file.
pub const EMBARK_FILENAME: &str = "Embark.toml";

/// Configuration for one named deployment target.
///
/// Serialized to TOML; network identity (chain id, endpoint, signer set) is
/// supplied here and treated as opaque by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Name of the deployment; scopes the journal directory.
    pub network_name: String,
    /// Chain ID the deployment targets.
    pub chain_id: u64,
    /// HTTP JSON-RPC endpoint of a node that manages its own accounts.
    pub rpc_url: String,
    /// Directory holding compiled contract artifacts (`<Name>.json`).
    pub artifacts_dir: PathBuf,
    /// Directory holding per-deployment journals.
    pub deployments_dir: PathBuf,
    /// Seconds to wait for a transaction confirmation.
    pub tx_timeout_secs: u64,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            network_name: "embark-local".to_string(),
            chain_id: 31337,
            rpc_url: "http://localhost:8545".to_string(),
            artifacts_dir: PathBuf::from("artifacts"),
            deployments_dir: PathBuf::from("deployments"),
            tx_timeout_secs: 120,
        }
    }
}

impl DeploymentConfig {
    /// Directory holding this deployment's journal.
    pub fn journal_dir(&self) -> PathBuf {
        self.deployments_dir.join(&self.network_name)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deployment config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from `Embark.toml` inside
    /// a directory.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = if path.is_dir() {
            path.join(EMBARK_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .context(format!("Failed to read config from {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn config_round_trips_through_toml() {
        let dir = TempDir::new("embark-config").expect("temp dir");
        let path = dir.path().join(EMBARK_FILENAME);

        let config = DeploymentConfig {
            network_name: "sepolia-auction".to_string(),
            chain_id: 11155111,
            rpc_url: "https://ethereum-sepolia-rpc.publicnode.com".to_string(),
            ..Default::default()
        };

        config.save_to_file(&path).expect("save");
        let loaded = DeploymentConfig::load_from_file(&path).expect("load");
        assert_eq!(config, loaded);
    }

    #[test]
    fn a_directory_resolves_to_its_embark_toml() {
        let dir = TempDir::new("embark-config").expect("temp dir");
        let config = DeploymentConfig::default();
        config
            .save_to_file(&dir.path().join(EMBARK_FILENAME))
            .expect("save");

        let loaded =
            DeploymentConfig::load_from_file(&dir.path().to_path_buf()).expect("load from dir");
        assert_eq!(config, loaded);
    }

    #[test]
    fn journal_dir_is_scoped_by_network_name() {
        let config = DeploymentConfig {
            network_name: "mainnet-auction".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.journal_dir(),
            PathBuf::from("deployments/mainnet-auction")
        );
    }

    #[test]
    fn missing_config_is_an_error() {
        let result = DeploymentConfig::load_from_file(&PathBuf::from("/nonexistent/Embark.toml"));
        assert!(result.is_err());
    }
}
