//! The contract factory capability and its pending deployment handle.

use std::future::Future;

use alloy_core::primitives::{Address, B256, U256};
use tokio::sync::oneshot;

use crate::{ArgValue, DeployError, DeploymentAccount};

/// Turns a deploy request into a confirmed on-chain address.
///
/// Implementations own transport, signing, broadcasting and confirmation
/// policy (timeouts included). Failures are reported, never swallowed.
pub trait ContractFactory: Send + Sync {
    /// Submit the creation transaction of `artifact` with `args`, signed by `account`.
    ///
    /// Returns once the transaction is accepted for broadcast; confirmation is
    /// observed through the returned [`PendingDeployment`].
    fn deploy(
        &self,
        artifact: &str,
        args: &[ArgValue],
        account: &DeploymentAccount,
    ) -> impl Future<Output = Result<PendingDeployment, DeployError>> + Send;

    /// Current balance of `address`, in wei.
    fn balance(&self, address: Address) -> impl Future<Output = Result<U256, DeployError>> + Send;
}

/// A submitted deployment waiting for confirmation.
///
/// The factory keeps the matching [`ConfirmationSender`] and resolves it once
/// the network has confirmed (or rejected) the transaction.
#[derive(Debug)]
pub struct PendingDeployment {
    artifact: String,
    tx_hash: B256,
    receiver: oneshot::Receiver<Result<Address, DeployError>>,
}

impl PendingDeployment {
    pub fn new(artifact: impl Into<String>, tx_hash: B256) -> (Self, ConfirmationSender) {
        let (sender, receiver) = oneshot::channel();
        let pending = Self {
            artifact: artifact.into(),
            tx_hash,
            receiver,
        };
        (pending, ConfirmationSender(sender))
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    pub fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    /// Suspend until the deployment is confirmed and return the contract address.
    pub async fn confirmed(self) -> Result<Address, DeployError> {
        self.receiver.await.map_err(|_| {
            DeployError::Network(format!(
                "confirmation of {} (tx {}) was abandoned before completing",
                self.artifact, self.tx_hash
            ))
        })?
    }
}

/// Resolves a [`PendingDeployment`].
#[derive(Debug)]
pub struct ConfirmationSender(oneshot::Sender<Result<Address, DeployError>>);

impl ConfirmationSender {
    pub fn confirm(self, address: Address) {
        self.send(Ok(address));
    }

    pub fn fail(self, err: DeployError) {
        self.send(Err(err));
    }

    /// Completes once the [`PendingDeployment`] has been dropped.
    pub async fn closed(&mut self) {
        self.0.closed().await
    }

    fn send(self, outcome: Result<Address, DeployError>) {
        if self.0.send(outcome).is_err() {
            tracing::debug!("Pending deployment dropped before its confirmation was delivered");
        }
    }
}
