//! stackup is a CLI tool to deploy a registry contract and the contracts that depend on it.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;

use cli::Cli;
use stackup_deploy::{
    ArtifactDir, DeploymentOrchestrator, RpcContractFactory, SigningKey, StackupConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = StackupConfig::load(&cli.config)?;

    let network_name = match cli.network {
        Some(name) => name,
        None => config.default_network()?.to_string(),
    };

    let network = config.resolve(&network_name, cli.private_key.map(SigningKey::new))?;
    let sequence = config.sequence()?;

    tracing::info!(
        config_path = %cli.config.display(),
        artifacts = %cli.artifacts.display(),
        network = %network.name,
        rpc_url = %network.rpc_url,
        chain_id = network.chain_id,
        steps = sequence.len(),
        "Starting deployment..."
    );

    // Refuse to touch the network without an account able to sign.
    network.deployment_account()?;

    let factory =
        RpcContractFactory::connect(network.clone(), ArtifactDir::new(&cli.artifacts)).await?;

    // Ctrl+C stops the run before the next step; a submitted step cannot be withdrawn.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current step...");
            cancel_tx.send_replace(true);
        }
    });

    let report = DeploymentOrchestrator::new(network, sequence, factory)
        .with_cancellation(cancel_rx)
        .run()
        .await?;

    println!("{}", report.render());

    if let Some(path) = &cli.report {
        report
            .save_to_file(path)
            .context("Failed to write the deployment report")?;
    }

    Ok(())
}
