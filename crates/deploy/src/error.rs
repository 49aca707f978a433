//! Error taxonomy for a deployment run.

use thiserror::Error;

use crate::DeployedContract;

/// Errors that can abort a deployment run.
///
/// None of these are retried: once a contract is on-chain there is no
/// compensating action, so every failure is fatal to the run.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Unknown network, missing RPC URL or chain id, or no usable signing account.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The requested compiled artifact does not exist.
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    /// Constructor arguments do not match what the artifact expects.
    #[error("constructor argument mismatch for {artifact}: {reason}")]
    ArgumentMismatch { artifact: String, reason: String },

    /// RPC unreachable, transaction rejected or reverted, insufficient balance,
    /// or confirmation timeout.
    #[error("network error: {0}")]
    Network(String),

    /// A deployment step failed. Contracts confirmed before it stay deployed.
    #[error(
        "step {index} ({step}) failed after {} contract(s) were deployed{}",
        .deployed.len(),
        format_deployed(.deployed)
    )]
    StepFailed {
        step: String,
        index: usize,
        deployed: Vec<DeployedContract>,
        #[source]
        source: Box<DeployError>,
    },

    /// The run was stopped before `step` started.
    #[error("deployment cancelled before step {step}{}", format_deployed(.deployed))]
    Cancelled {
        step: String,
        deployed: Vec<DeployedContract>,
    },
}

impl DeployError {
    /// Contracts that were confirmed before the run stopped.
    pub fn deployed(&self) -> &[DeployedContract] {
        match self {
            Self::StepFailed { deployed, .. } | Self::Cancelled { deployed, .. } => deployed,
            _ => &[],
        }
    }
}

fn format_deployed(deployed: &[DeployedContract]) -> String {
    if deployed.is_empty() {
        return String::new();
    }

    let list = deployed
        .iter()
        .map(|c| format!("{}={}", c.name, c.address))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" [already deployed: {list}]")
}
