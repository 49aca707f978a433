use std::path::PathBuf;

use clap::Parser;
use stackup_deploy::STACKUP_CONF_FILENAME;
use tracing::level_filters::LevelFilter;

/// The default directory holding compiled Hardhat artifacts.
const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

#[derive(Parser)]
#[command(name = "stackup")]
#[command(
    author,
    version,
    about = "Deploy an item registry and the contracts wired to it, in dependency order"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "STACKUP_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// The network to deploy to, as named in the configuration file.
    ///
    /// If not provided, the configuration's `default_network` is used.
    #[arg(short, long, env = "STACKUP_NETWORK")]
    pub network: Option<String>,

    /// Path to the configuration file.
    ///
    /// Built-in networks are used when the file does not exist.
    #[arg(
        short,
        long,
        alias = "conf",
        env = "STACKUP_CONFIG",
        default_value = STACKUP_CONF_FILENAME
    )]
    pub config: PathBuf,

    /// Directory containing the compiled contract artifacts.
    #[arg(long, env = "STACKUP_ARTIFACTS", default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts: PathBuf,

    /// The private key (or mnemonic phrase) of the deploying account.
    ///
    /// It becomes the first signing account of the selected network.
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Write the deployment report as JSON to this path.
    #[arg(long, env = "STACKUP_REPORT")]
    pub report: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["stackup"]);
        assert_eq!(cli.config, PathBuf::from(STACKUP_CONF_FILENAME));
        assert_eq!(cli.artifacts, PathBuf::from(DEFAULT_ARTIFACTS_DIR));
        assert!(cli.report.is_none());
    }

    #[test]
    fn test_cli_network_selection() {
        let cli = Cli::parse_from(["stackup", "--network", "theta_testnet", "-v", "debug"]);
        assert_eq!(cli.network.as_deref(), Some("theta_testnet"));
        assert_eq!(cli.verbosity, LevelFilter::DEBUG);
    }

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
