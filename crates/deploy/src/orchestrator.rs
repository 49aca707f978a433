//! Sequenced deployment of a [`DeploymentSequence`].
//!
//! One deployment is in flight at a time: a step is submitted only after every
//! earlier step is confirmed, because its constructor arguments are built from
//! their literal addresses. A failed step ends the run; confirmed contracts are
//! left on-chain and returned with the error.

use tokio::sync::watch;

use crate::{
    ContractFactory, DeployError, DeployStep, DeployedContract, DeploymentAccount,
    DeploymentReport, DeploymentSequence, NetworkConfig,
};

/// Runs a deployment sequence against one network.
#[derive(Debug)]
pub struct DeploymentOrchestrator<F> {
    network: NetworkConfig,
    sequence: DeploymentSequence,
    factory: F,
    cancel: Option<watch::Receiver<bool>>,
}

impl<F: ContractFactory> DeploymentOrchestrator<F> {
    pub fn new(network: NetworkConfig, sequence: DeploymentSequence, factory: F) -> Self {
        Self {
            network,
            sequence,
            factory,
            cancel: None,
        }
    }

    /// Stop before the next step once `true` is published on `cancel`.
    ///
    /// A step already submitted is still awaited; it cannot be withdrawn.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn sequence(&self) -> &DeploymentSequence {
        &self.sequence
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|cancel| *cancel.borrow())
    }

    /// Deploy every step in order and return the report.
    ///
    /// Each run deploys fresh instances: running twice yields distinct addresses.
    pub async fn run(&self) -> Result<DeploymentReport, DeployError> {
        // No network call happens before the account is known to be usable.
        let account = self.network.deployment_account()?;

        tracing::info!(
            network = %self.network.name,
            chain_id = self.network.chain_id,
            account = %account.address(),
            "Deploying the contracts with the account"
        );

        let starting_balance = match self.factory.balance(account.address()).await {
            Ok(balance) => {
                tracing::info!(balance = %balance, "Account balance");
                Some(balance)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not read the account balance");
                None
            }
        };

        let mut deployed: Vec<DeployedContract> = Vec::with_capacity(self.sequence.len());
        for (index, step) in self.sequence.steps().iter().enumerate() {
            if self.is_cancelled() {
                tracing::warn!(step = %step.artifact, "Deployment cancelled");
                return Err(DeployError::Cancelled {
                    step: step.artifact.clone(),
                    deployed,
                });
            }

            match self.deploy_step(step, &account, &deployed).await {
                Ok(contract) => deployed.push(contract),
                Err(source) => {
                    tracing::error!(
                        step = %step.artifact,
                        index,
                        deployed = deployed.len(),
                        error = %source,
                        "Deployment step failed"
                    );
                    return Err(DeployError::StepFailed {
                        step: step.artifact.clone(),
                        index,
                        deployed,
                        source: Box::new(source),
                    });
                }
            }
        }

        tracing::info!(contracts = deployed.len(), "Deployment complete");

        Ok(DeploymentReport::new(
            self.network.name.clone(),
            self.network.chain_id,
            account.address(),
            starting_balance,
            deployed,
        ))
    }

    async fn deploy_step(
        &self,
        step: &DeployStep,
        account: &DeploymentAccount,
        deployed: &[DeployedContract],
    ) -> Result<DeployedContract, DeployError> {
        let args = step.resolve_args(deployed)?;

        tracing::debug!(step = %step.artifact, args = ?args, "Submitting deployment");
        let pending = self.factory.deploy(&step.artifact, &args, account).await?;
        let tx_hash = pending.tx_hash();

        tracing::debug!(step = %step.artifact, tx_hash = %tx_hash, "Awaiting confirmation");
        let address = pending.confirmed().await?;

        tracing::info!("{} address: {}", step.artifact, address);

        Ok(DeployedContract {
            name: step.artifact.clone(),
            address,
            deployer: account.address(),
            tx_hash,
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use alloy_core::primitives::{Address, B256, U256};

    use super::*;
    use crate::{ArgValue, NetworkEntry, PendingDeployment, SigningKey, StackupConfig};

    const TEST_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    /// Deterministic factory: confirms on a spawned task, records every call.
    #[derive(Default)]
    struct FakeFactory {
        calls: Mutex<Vec<(String, Vec<ArgValue>)>>,
        balance_calls: AtomicUsize,
        balance_unavailable: bool,
        /// Submission is rejected for this artifact.
        reject: Option<String>,
        /// Submission succeeds but the transaction reverts for this artifact.
        revert: Option<String>,
        /// Publishes cancellation while this artifact is being deployed.
        cancel_on: Option<(String, watch::Sender<bool>)>,
    }

    impl FakeFactory {
        fn calls(&self) -> Vec<(String, Vec<ArgValue>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ContractFactory for FakeFactory {
        async fn deploy(
            &self,
            artifact: &str,
            args: &[ArgValue],
            _account: &DeploymentAccount,
        ) -> Result<PendingDeployment, DeployError> {
            self.calls
                .lock()
                .unwrap()
                .push((artifact.to_string(), args.to_vec()));

            if let Some((name, cancel)) = &self.cancel_on {
                if name == artifact {
                    cancel.send_replace(true);
                }
            }

            if self.reject.as_deref() == Some(artifact) {
                return Err(DeployError::Network(
                    "insufficient funds for gas * price + value".to_string(),
                ));
            }

            let reverts = self.revert.as_deref() == Some(artifact);
            let (pending, sender) =
                PendingDeployment::new(artifact, B256::from(rand::random::<[u8; 32]>()));
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                if reverts {
                    sender.fail(DeployError::Network("transaction reverted".to_string()));
                } else {
                    sender.confirm(Address::from(rand::random::<[u8; 20]>()));
                }
            });

            Ok(pending)
        }

        async fn balance(&self, _address: Address) -> Result<U256, DeployError> {
            self.balance_calls.fetch_add(1, Ordering::SeqCst);
            if self.balance_unavailable {
                return Err(DeployError::Network("connection refused".to_string()));
            }
            Ok(U256::from(5_000_000_000_000_000_000u128))
        }
    }

    fn network(credential: Option<&str>) -> NetworkConfig {
        let mut config = StackupConfig::default();
        config.networks.insert(
            "testnetA".to_string(),
            NetworkEntry::new("http://127.0.0.1:8545", 31337),
        );
        config
            .resolve("testnetA", credential.map(SigningKey::new))
            .unwrap()
    }

    fn registry_consumer() -> DeploymentSequence {
        DeploymentSequence::new(vec![
            DeployStep::new("Registry"),
            DeployStep::new("Consumer").address_of("Registry"),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_address_is_wired_into_next_step() {
        let orchestrator = DeploymentOrchestrator::new(
            network(Some(TEST_KEY)),
            registry_consumer(),
            FakeFactory::default(),
        );

        let report = orchestrator.run().await.unwrap();
        assert_eq!(report.contracts.len(), 2);
        assert_eq!(report.contracts[0].name, "Registry");
        assert_eq!(report.contracts[1].name, "Consumer");

        let registry = report.address_of("Registry").unwrap();
        assert_ne!(registry, Address::ZERO);
        assert_eq!(report.contracts[1].args, vec![ArgValue::Address(registry)]);

        let calls = orchestrator.factory.calls();
        assert_eq!(calls[1], ("Consumer".to_string(), vec![ArgValue::Address(registry)]));
        assert!(report.starting_balance.is_some());
        assert_eq!(report.deployer, report.contracts[0].deployer);
    }

    #[tokio::test]
    async fn test_missing_account_makes_no_calls() {
        let orchestrator =
            DeploymentOrchestrator::new(network(None), registry_consumer(), FakeFactory::default());

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, DeployError::Configuration(_)));
        assert!(orchestrator.factory.calls().is_empty());
        assert_eq!(orchestrator.factory.balance_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_step_failure_stops_the_run() {
        let factory = FakeFactory {
            revert: Some("Registry".to_string()),
            ..Default::default()
        };
        let orchestrator =
            DeploymentOrchestrator::new(network(Some(TEST_KEY)), registry_consumer(), factory);

        let err = orchestrator.run().await.unwrap_err();
        match &err {
            DeployError::StepFailed {
                step,
                index,
                deployed,
                source,
            } => {
                assert_eq!(step, "Registry");
                assert_eq!(*index, 0);
                assert!(deployed.is_empty());
                assert!(matches!(**source, DeployError::Network(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let calls = orchestrator.factory.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "Registry");
    }

    #[tokio::test]
    async fn test_second_step_failure_keeps_first_contract() {
        let factory = FakeFactory {
            reject: Some("Consumer".to_string()),
            ..Default::default()
        };
        let orchestrator =
            DeploymentOrchestrator::new(network(Some(TEST_KEY)), registry_consumer(), factory);

        let err = orchestrator.run().await.unwrap_err();
        let DeployError::StepFailed {
            step,
            index,
            deployed,
            source,
        } = &err
        else {
            panic!("unexpected error: {err:?}");
        };

        assert_eq!(step, "Consumer");
        assert_eq!(*index, 1);
        assert_eq!(deployed.len(), 1);
        assert_eq!(deployed[0].name, "Registry");
        assert!(source.to_string().contains("insufficient funds"));
        assert!(err.to_string().contains("Registry="));
    }

    #[tokio::test]
    async fn test_runs_deploy_fresh_instances() {
        let orchestrator = DeploymentOrchestrator::new(
            network(Some(TEST_KEY)),
            registry_consumer(),
            FakeFactory::default(),
        );

        let first = orchestrator.run().await.unwrap();
        let second = orchestrator.run().await.unwrap();

        assert_ne!(first.address_of("Registry"), second.address_of("Registry"));
        assert_ne!(first.address_of("Consumer"), second.address_of("Consumer"));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let (cancel_tx, cancel_rx) = watch::channel(true);
        let orchestrator = DeploymentOrchestrator::new(
            network(Some(TEST_KEY)),
            registry_consumer(),
            FakeFactory::default(),
        )
        .with_cancellation(cancel_rx);

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, DeployError::Cancelled { ref step, .. } if step == "Registry"));
        assert!(orchestrator.factory.calls().is_empty());
        drop(cancel_tx);
    }

    #[tokio::test]
    async fn test_cancel_after_submission_completes_the_step() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let factory = FakeFactory {
            cancel_on: Some(("Registry".to_string(), cancel_tx)),
            ..Default::default()
        };
        let orchestrator =
            DeploymentOrchestrator::new(network(Some(TEST_KEY)), registry_consumer(), factory)
                .with_cancellation(cancel_rx);

        let err = orchestrator.run().await.unwrap_err();
        let DeployError::Cancelled { step, deployed } = &err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(step, "Consumer");
        assert_eq!(deployed.len(), 1);
        assert_eq!(orchestrator.factory.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_balance_is_not_fatal() {
        let factory = FakeFactory {
            balance_unavailable: true,
            ..Default::default()
        };
        let orchestrator =
            DeploymentOrchestrator::new(network(Some(TEST_KEY)), registry_consumer(), factory);

        let report = orchestrator.run().await.unwrap();
        assert!(report.starting_balance.is_none());
        assert_eq!(report.contracts.len(), 2);
    }

    #[tokio::test]
    async fn test_default_sequence_wires_job_to_nft() {
        let orchestrator = DeploymentOrchestrator::new(
            network(Some(TEST_KEY)),
            DeploymentSequence::default(),
            FakeFactory::default(),
        );

        let report = orchestrator.run().await.unwrap();
        let nft = report.address_of(crate::ITEM_CONTRACT).unwrap();
        assert_eq!(report.contracts[1].name, crate::JOB_CONTRACT);
        assert_eq!(report.contracts[1].args, vec![ArgValue::Address(nft)]);
    }
}
