//! JSON-RPC implementation of the [`ContractFactory`] capability.

use std::time::Duration;

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes, TxKind, U64, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::{
    ArgValue, ArtifactSource, ConfirmationSender, ContractFactory, DeployError,
    DeploymentAccount, GasPrice, NetworkConfig, PendingDeployment,
};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Poll `check_fn` until it yields a value.
///
/// `Ok(None)` means "not yet"; errors are logged and polled again. Fails once
/// `timeout` has elapsed, including the last error seen.
pub async fn poll_until<T, F, Fut>(
    name: &str,
    timeout: Duration,
    interval: Duration,
    check_fn: F,
) -> Result<T, anyhow::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let mut last_error = None;

    loop {
        match check_fn().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => {
                tracing::trace!(error = %e, target = %name, "Poll failed, retrying...");
                last_error = Some(e);
            }
        }

        if start.elapsed() > timeout {
            match last_error {
                Some(e) => anyhow::bail!(
                    "Timeout after {:?} waiting for {}: last error: {:#}",
                    timeout,
                    name,
                    e
                ),
                None => anyhow::bail!("Timeout after {:?} waiting for {}", timeout, name),
            }
        }

        tokio::time::sleep(interval).await;
    }
}

/// The fields of a transaction receipt this crate looks at.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReceipt {
    /// `0x1` on success, `0x0` when the creation reverted.
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub block_number: Option<U64>,
}

impl DeploymentReceipt {
    /// The created contract address, or why there is none.
    pub fn into_address(self, artifact: &str, tx_hash: B256) -> Result<Address, DeployError> {
        if self.status == Some(U64::ZERO) {
            return Err(DeployError::Network(format!(
                "deployment transaction {tx_hash} of {artifact} reverted"
            )));
        }

        self.contract_address.ok_or_else(|| {
            DeployError::Network(format!(
                "receipt of {tx_hash} for {artifact} carries no contract address"
            ))
        })
    }
}

fn network_error(context: &str, err: anyhow::Error) -> DeployError {
    DeployError::Network(format!("{context}: {err:#}"))
}

/// Deploys contracts through a JSON-RPC endpoint, signing locally.
///
/// Transactions are legacy EIP-155 creations priced per the network's
/// [`GasPrice`] policy. Confirmation is watched by a spawned task polling
/// `eth_getTransactionReceipt` until the network's confirmation timeout.
#[derive(Debug, Clone)]
pub struct RpcContractFactory<A> {
    client: reqwest::Client,
    network: NetworkConfig,
    artifacts: A,
}

impl<A: ArtifactSource> RpcContractFactory<A> {
    /// Connect to the network's RPC endpoint and check it serves the configured chain.
    pub async fn connect(network: NetworkConfig, artifacts: A) -> Result<Self, DeployError> {
        let client = create_client().map_err(|e| network_error("RPC client", e))?;

        let chain_id: U64 = json_rpc_call(&client, &network.rpc_url, "eth_chainId", vec![])
            .await
            .map_err(|e| network_error(&format!("failed to reach {}", network.rpc_url), e))?;

        if chain_id.to::<u64>() != network.chain_id {
            return Err(DeployError::Configuration(format!(
                "network {} expects chain id {} but {} reports {}",
                network.name, network.chain_id, network.rpc_url, chain_id
            )));
        }

        tracing::debug!(
            network = %network.name,
            rpc_url = %network.rpc_url,
            chain_id = network.chain_id,
            "Connected to RPC endpoint"
        );

        Ok(Self {
            client,
            network,
            artifacts,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, DeployError> {
        json_rpc_call(&self.client, &self.network.rpc_url, method, params)
            .await
            .map_err(|e| network_error(method, e))
    }

    async fn gas_price(&self) -> Result<u128, DeployError> {
        match self.network.gas_price {
            GasPrice::Fixed(wei) => Ok(wei),
            GasPrice::Auto => {
                let price: U256 = self.call("eth_gasPrice", vec![]).await?;
                u128::try_from(price).map_err(|_| {
                    DeployError::Network(format!(
                        "gas price {price} reported by the node is out of range"
                    ))
                })
            }
        }
    }
}

impl<A: ArtifactSource> ContractFactory for RpcContractFactory<A> {
    async fn deploy(
        &self,
        artifact: &str,
        args: &[ArgValue],
        account: &DeploymentAccount,
    ) -> Result<PendingDeployment, DeployError> {
        let code = self.artifacts.artifact(artifact)?.deploy_code(args)?;
        let from = account.address();

        let nonce: U64 = self
            .call(
                "eth_getTransactionCount",
                vec![serde_json::json!(from), serde_json::json!("pending")],
            )
            .await?;
        let gas_price = self.gas_price().await?;
        let gas_limit: U64 = self
            .call(
                "eth_estimateGas",
                vec![serde_json::json!({
                    "from": from,
                    "data": code,
                    "gasPrice": U256::from(gas_price),
                })],
            )
            .await?;

        let mut tx = TxLegacy {
            chain_id: Some(self.network.chain_id),
            nonce: nonce.to(),
            gas_price,
            gas_limit: gas_limit.to(),
            to: TxKind::Create,
            value: U256::ZERO,
            input: code,
        };
        let signature = account
            .signer()
            .sign_transaction_sync(&mut tx)
            .map_err(|e| {
                DeployError::Network(format!("failed to sign {artifact} deployment: {e}"))
            })?;
        let raw = Bytes::from(TxEnvelope::from(tx.into_signed(signature)).encoded_2718());

        let tx_hash: B256 = self
            .call("eth_sendRawTransaction", vec![serde_json::json!(raw)])
            .await?;

        tracing::info!(
            artifact,
            tx_hash = %tx_hash,
            nonce = nonce.to::<u64>(),
            gas_limit = gas_limit.to::<u64>(),
            gas_price,
            "Deployment transaction submitted"
        );

        let (pending, sender) = PendingDeployment::new(artifact, tx_hash);
        tokio::spawn(watch_confirmation(
            self.client.clone(),
            self.network.clone(),
            artifact.to_string(),
            tx_hash,
            sender,
        ));

        Ok(pending)
    }

    async fn balance(&self, address: Address) -> Result<U256, DeployError> {
        self.call(
            "eth_getBalance",
            vec![serde_json::json!(address), serde_json::json!("latest")],
        )
        .await
    }
}

/// Poll for the receipt of `tx_hash` and resolve the pending deployment.
///
/// Stops early once the pending deployment is dropped.
async fn watch_confirmation(
    client: reqwest::Client,
    network: NetworkConfig,
    artifact: String,
    tx_hash: B256,
    mut sender: ConfirmationSender,
) {
    let what = format!("confirmation of {tx_hash}");
    let poll = poll_until(
        &what,
        network.confirmation_timeout,
        network.poll_interval,
        || {
            json_rpc_call::<Option<DeploymentReceipt>>(
                &client,
                &network.rpc_url,
                "eth_getTransactionReceipt",
                vec![serde_json::json!(tx_hash)],
            )
        },
    );

    let receipt = tokio::select! {
        receipt = poll => receipt,
        () = sender.closed() => {
            tracing::debug!(
                artifact = %artifact,
                tx_hash = %tx_hash,
                "Nobody awaits the deployment anymore, stopping confirmation polling"
            );
            return;
        }
    };

    match receipt {
        Ok(receipt) => {
            tracing::debug!(
                artifact = %artifact,
                tx_hash = %tx_hash,
                block_number = ?receipt.block_number,
                "Deployment transaction mined"
            );
            match receipt.into_address(&artifact, tx_hash) {
                Ok(address) => sender.confirm(address),
                Err(e) => sender.fail(e),
            }
        }
        Err(e) => sender.fail(network_error(&format!("{artifact} was not confirmed"), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NetworkEntry, StackupConfig};

    #[test]
    fn test_receipt_success() {
        let receipt: DeploymentReceipt = serde_json::from_value(serde_json::json!({
            "status": "0x1",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "blockNumber": "0x2"
        }))
        .unwrap();

        let address = receipt.into_address("JobReadyNFT", B256::ZERO).unwrap();
        assert_eq!(
            address.to_string().to_lowercase(),
            "0x5fbdb2315678afecb367f032d93f642f64180aa3"
        );
    }

    #[test]
    fn test_receipt_reverted() {
        let receipt: DeploymentReceipt = serde_json::from_value(serde_json::json!({
            "status": "0x0",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3"
        }))
        .unwrap();

        let err = receipt.into_address("Job", B256::ZERO).unwrap_err();
        assert!(matches!(err, DeployError::Network(_)));
        assert!(err.to_string().contains("of Job reverted"));
    }

    #[test]
    fn test_receipt_without_address() {
        let receipt: DeploymentReceipt =
            serde_json::from_value(serde_json::json!({ "status": "0x1" })).unwrap();
        assert!(receipt.into_address("Job", B256::ZERO).is_err());
    }

    #[tokio::test]
    async fn test_poll_until_value() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let value = poll_until(
            "counter",
            Duration::from_secs(5),
            Duration::from_millis(1),
            || {
                let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    match n {
                        0 => anyhow::bail!("not reachable yet"),
                        1 => Ok(None),
                        _ => Ok(Some(n)),
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_watcher_stops_when_pending_is_dropped() {
        let mut config = StackupConfig::default();
        config.networks.insert(
            "local".to_string(),
            NetworkEntry {
                confirmation_timeout_secs: 600,
                poll_interval_ms: 10,
                // Nothing listens on the discard port: every poll fails.
                ..NetworkEntry::new("http://127.0.0.1:9/", 1)
            },
        );
        let network = config.resolve("local", None).unwrap();

        let (pending, sender) = PendingDeployment::new("Job", B256::ZERO);
        let watcher = tokio::spawn(watch_confirmation(
            create_client().unwrap(),
            network,
            "Job".to_string(),
            B256::ZERO,
            sender,
        ));
        drop(pending);

        tokio::time::timeout(Duration::from_secs(5), watcher)
            .await
            .expect("watcher should stop once the deployment is dropped")
            .unwrap();
    }

    #[tokio::test]
    async fn test_poll_until_timeout_reports_last_error() {
        let err = poll_until::<(), _, _>(
            "receipt",
            Duration::from_millis(20),
            Duration::from_millis(5),
            || async { anyhow::bail!("connection refused") },
        )
        .await
        .unwrap_err();

        let message = format!("{err:#}");
        assert!(message.contains("Timeout"));
        assert!(message.contains("connection refused"));
    }
}
