//! Network configuration table and resolution of the active network.

use std::{collections::BTreeMap, fmt, path::Path, time::Duration};

use alloy_core::primitives::Address;
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};
use derive_more::{Deref, From};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{DeployError, DeployStep, DeploymentSequence};

/// The default name for the stackup configuration file.
pub const STACKUP_CONF_FILENAME: &str = "Stackup.toml";

/// Prefix of the environment variables merged over the configuration file.
pub const ENV_PREFIX: &str = "STACKUP_";

/// Gas price used by the Theta networks, in wei.
pub const THETA_GAS_PRICE: u128 = 4_000_000_000_000;

/// Default time to wait for a deployment transaction to be mined.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

/// Default interval between two receipt polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// An opaque signing credential: a hex private key or a BIP-39 phrase.
///
/// The value is never logged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningKey(String);

impl SigningKey {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Build a local signer from the credential.
    ///
    /// A value containing whitespace is treated as a mnemonic phrase and derives
    /// the first account of the default derivation path.
    fn to_signer(&self) -> Result<PrivateKeySigner, String> {
        let secret = self.0.trim();
        if secret.contains(char::is_whitespace) {
            return MnemonicBuilder::<English>::default()
                .phrase(secret)
                .index(0)
                .and_then(|builder| builder.build())
                .map_err(|e| e.to_string());
        }

        secret.parse::<PrivateKeySigner>().map_err(|e| e.to_string())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Ordered signing credentials of a network. The first one deploys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Deref, From)]
pub struct SigningAccounts(Vec<SigningKey>);

/// Gas price policy of a network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGasPrice", into = "RawGasPrice")]
pub enum GasPrice {
    /// Ask the node with `eth_gasPrice` before each deployment.
    #[default]
    Auto,
    /// A fixed price in wei per gas unit.
    Fixed(u128),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawGasPrice {
    Wei(u64),
    Keyword(String),
}

impl TryFrom<RawGasPrice> for GasPrice {
    type Error = String;

    fn try_from(raw: RawGasPrice) -> Result<Self, Self::Error> {
        match raw {
            RawGasPrice::Wei(wei) => Ok(Self::Fixed(u128::from(wei))),
            RawGasPrice::Keyword(word) if word.eq_ignore_ascii_case("auto") => Ok(Self::Auto),
            RawGasPrice::Keyword(word) => match word.trim().parse::<u128>() {
                Ok(wei) => Ok(Self::Fixed(wei)),
                Err(_) => Err(format!(
                    "invalid gas price '{word}': expected an integer amount of wei or \"auto\""
                )),
            },
        }
    }
}

impl From<GasPrice> for RawGasPrice {
    fn from(price: GasPrice) -> Self {
        match price {
            GasPrice::Auto => Self::Keyword("auto".to_string()),
            // Prices beyond a TOML integer are written as strings.
            GasPrice::Fixed(wei) => match u64::try_from(wei) {
                Ok(wei) => Self::Wei(wei),
                Err(_) => Self::Keyword(wei.to_string()),
            },
        }
    }
}

fn default_confirmation_timeout_secs() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT_SECS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// A network entry as written in the configuration file.
///
/// Required fields are optional here so that a missing value is reported by
/// [`StackupConfig::resolve`] with the network name attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<SigningKey>>,
    #[serde(default)]
    pub gas_price: GasPrice,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl NetworkEntry {
    pub fn new(url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            url: Some(url.into()),
            chain_id: Some(chain_id),
            accounts: None,
            gas_price: GasPrice::Auto,
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    pub fn gas_price(mut self, gas_price: GasPrice) -> Self {
        self.gas_price = gas_price;
        self
    }

    pub fn accounts(mut self, accounts: Vec<SigningKey>) -> Self {
        self.accounts = Some(accounts);
        self
    }
}

/// The configuration table: every known network and the deployment steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackupConfig {
    /// Network used when the operator does not select one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_network: Option<String>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkEntry>,
    /// Overrides the built-in deployment sequence when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<DeployStep>>,
}

impl Default for StackupConfig {
    fn default() -> Self {
        let networks = BTreeMap::from([
            (
                "theta_privatenet".to_string(),
                NetworkEntry::new("http://localhost:18888/rpc", 366)
                    .gas_price(GasPrice::Fixed(THETA_GAS_PRICE)),
            ),
            (
                "theta_testnet".to_string(),
                NetworkEntry::new("https://eth-rpc-api-testnet.thetatoken.org/rpc", 365)
                    .gas_price(GasPrice::Fixed(THETA_GAS_PRICE)),
            ),
        ]);

        Self {
            default_network: Some("theta_privatenet".to_string()),
            networks,
            steps: None,
        }
    }
}

impl StackupConfig {
    /// Load the configuration, layering the built-in networks, the TOML file at
    /// `path` (skipped when absent) and `STACKUP_`-prefixed environment variables.
    ///
    /// Nested keys use `__` in the environment, e.g.
    /// `STACKUP_NETWORKS__THETA_TESTNET__URL`.
    pub fn load(path: &Path) -> Result<Self, DeployError> {
        // Keys reach the filter in their original case.
        let env = Env::prefixed(ENV_PREFIX).split("__").filter(|key| {
            let key = key.as_str().to_ascii_lowercase();
            key == "default_network" || key.starts_with("networks.")
        });

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(env)
            .extract()
            .map_err(|e| {
                DeployError::Configuration(format!(
                    "failed to load configuration from {}: {e}",
                    path.display()
                ))
            })?;

        tracing::debug!(
            path = %path.display(),
            networks = ?config.networks.keys().collect::<Vec<_>>(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// The network selected when the operator does not name one.
    pub fn default_network(&self) -> Result<&str, DeployError> {
        self.default_network.as_deref().ok_or_else(|| {
            DeployError::Configuration(
                "no network selected and no default_network configured".to_string(),
            )
        })
    }

    /// The deployment sequence: the configured steps, or the built-in one.
    pub fn sequence(&self) -> Result<DeploymentSequence, DeployError> {
        match &self.steps {
            Some(steps) => DeploymentSequence::new(steps.clone()),
            None => Ok(DeploymentSequence::default()),
        }
    }

    /// Resolve the network named `name`.
    ///
    /// `credential` is the out-of-band signing key. It becomes the first signing
    /// account, ahead of any accounts listed in the file. A network without any
    /// signing account resolves fine; the failure is raised by
    /// [`NetworkConfig::deployment_account`].
    pub fn resolve(
        &self,
        name: &str,
        credential: Option<SigningKey>,
    ) -> Result<NetworkConfig, DeployError> {
        let entry = self.networks.get(name).ok_or_else(|| {
            DeployError::Configuration(format!(
                "unknown network '{name}' (known networks: {})",
                self.networks.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;

        let url = entry
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                DeployError::Configuration(format!("no RPC URL configured for network {name}"))
            })?;
        let rpc_url = Url::parse(url).map_err(|e| {
            DeployError::Configuration(format!("invalid RPC URL '{url}' for network {name}: {e}"))
        })?;

        let chain_id = entry.chain_id.ok_or_else(|| {
            DeployError::Configuration(format!("no chain id configured for network {name}"))
        })?;

        let signing_accounts = match (credential, &entry.accounts) {
            (None, None) => None,
            (credential, accounts) => {
                let mut keys: Vec<SigningKey> = credential.into_iter().collect();
                keys.extend(accounts.iter().flatten().cloned());
                Some(SigningAccounts::from(keys))
            }
        };

        Ok(NetworkConfig {
            name: name.to_string(),
            rpc_url,
            chain_id,
            signing_accounts,
            gas_price: entry.gas_price,
            confirmation_timeout: Duration::from_secs(entry.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(entry.poll_interval_ms),
        })
    }
}

/// The resolved, immutable parameters of the active network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: String,
    pub rpc_url: Url,
    pub chain_id: u64,
    pub signing_accounts: Option<SigningAccounts>,
    pub gas_price: GasPrice,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
}

impl NetworkConfig {
    /// Derive the account performing deployments: the first signing account.
    pub fn deployment_account(&self) -> Result<DeploymentAccount, DeployError> {
        let key = self
            .signing_accounts
            .as_ref()
            .and_then(|accounts| accounts.first())
            .filter(|key| !key.is_blank())
            .ok_or_else(|| {
                DeployError::Configuration(format!(
                    "no signing account configured for network {}",
                    self.name
                ))
            })?;

        let signer = key.to_signer().map_err(|e| {
            DeployError::Configuration(format!(
                "invalid signing account for network {}: {e}",
                self.name
            ))
        })?;

        Ok(DeploymentAccount::new(signer))
    }
}

/// The account submitting deployment transactions.
#[derive(Clone)]
pub struct DeploymentAccount {
    address: Address,
    signer: PrivateKeySigner,
}

impl DeploymentAccount {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self {
            address: signer.address(),
            signer,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

impl fmt::Debug for DeploymentAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentAccount")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
