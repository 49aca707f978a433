//! stackup-deploy - Sequenced deployment of interdependent EVM contracts.
//!
//! This crate resolves the target network, then deploys a fixed, ordered list of
//! contracts where a later contract may take the confirmed address of an earlier
//! one as a constructor argument.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use stackup_deploy::{
//!     ArtifactDir, DeploymentOrchestrator, RpcContractFactory, SigningKey, StackupConfig,
//! };
//!
//! # async fn example() -> Result<(), stackup_deploy::DeployError> {
//! let config = StackupConfig::load(Path::new("Stackup.toml"))?;
//! let network = config.resolve("theta_testnet", Some(SigningKey::new("0x...")))?;
//! let factory =
//!     RpcContractFactory::connect(network.clone(), ArtifactDir::new("artifacts")).await?;
//!
//! let report = DeploymentOrchestrator::new(network, config.sequence()?, factory)
//!     .run()
//!     .await?;
//! println!("{}", report.render());
//! # Ok(())
//! # }
//! ```

mod artifact;
pub use artifact::{ArtifactDir, ArtifactSource, ContractArtifact, InMemoryArtifacts};

mod error;
pub use error::DeployError;

mod factory;
pub use factory::{ConfirmationSender, ContractFactory, PendingDeployment};

mod network;
pub use network::{
    DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_MS, DeploymentAccount, ENV_PREFIX,
    GasPrice, NetworkConfig, NetworkEntry, STACKUP_CONF_FILENAME, SigningAccounts, SigningKey,
    StackupConfig, THETA_GAS_PRICE,
};

mod orchestrator;
pub use orchestrator::DeploymentOrchestrator;

mod report;
pub use report::{DeployedContract, DeploymentReport};

pub mod rpc;
pub use rpc::RpcContractFactory;

mod sequence;
pub use sequence::{
    ArgValue, ConstructorArg, DeployStep, DeploymentSequence, ITEM_CONTRACT, JOB_CONTRACT,
};
