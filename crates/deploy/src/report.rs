//! Deployment report: the ordered record of confirmed contracts.

use std::path::Path;

use alloy_core::primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use comfy_table::{Table, presets::UTF8_FULL};
use serde::{Deserialize, Serialize};

use crate::ArgValue;

/// A contract whose deployment transaction has been confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    /// Artifact name.
    pub name: String,
    /// On-chain address.
    pub address: Address,
    /// Account that submitted the deployment.
    pub deployer: Address,
    /// Hash of the creation transaction.
    pub tx_hash: B256,
    /// Constructor arguments as submitted, with prior addresses substituted.
    pub args: Vec<ArgValue>,
}

/// Ordered outcome of a complete deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub network: String,
    pub chain_id: u64,
    pub deployer: Address,
    /// Balance of the deployer before the first deployment, if it could be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starting_balance: Option<U256>,
    pub contracts: Vec<DeployedContract>,
    /// RFC 3339 UTC timestamp of the end of the run.
    pub completed_at: String,
}

impl DeploymentReport {
    pub fn new(
        network: String,
        chain_id: u64,
        deployer: Address,
        starting_balance: Option<U256>,
        contracts: Vec<DeployedContract>,
    ) -> Self {
        Self {
            network,
            chain_id,
            deployer,
            starting_balance,
            contracts,
            completed_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Address of the contract deployed from `name`.
    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.contracts
            .iter()
            .find(|contract| contract.name == name)
            .map(|contract| contract.address)
    }

    /// Render the report as a table for the operator.
    pub fn render(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["#", "Contract", "Address", "Deployer"]);

        for (index, contract) in self.contracts.iter().enumerate() {
            table.add_row(vec![
                index.to_string(),
                contract.name.clone(),
                contract.address.to_string(),
                contract.deployer.to_string(),
            ]);
        }

        let balance = self
            .starting_balance
            .map(|balance| balance.to_string())
            .unwrap_or_else(|| "unavailable".to_string());

        format!(
            "Network: {} (chain id {})\nDeployer: {} (starting balance: {})\n{table}",
            self.network, self.chain_id, self.deployer, balance
        )
    }

    /// Save the report as pretty JSON, e.g. for wiring addresses into a front-end.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment report")?;
        std::fs::write(path, json)
            .context(format!("Failed to write deployment report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Deployment report saved");
        Ok(())
    }

    /// Load a report previously written by [`DeploymentReport::save_to_file`].
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read deployment report from {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse deployment report JSON")
    }
}
