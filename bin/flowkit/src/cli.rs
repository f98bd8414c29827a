use std::path::PathBuf;

use clap::{Parser, Subcommand};
use flowkit::{
    config::DEFAULT_CONFIG_FILE,
    crypto::{HashAlgorithm, SignatureAlgorithm},
};
use tracing::level_filters::LevelFilter;

/// Network used when none is given.
const DEFAULT_NETWORK: &str = "emulator";

/// Account paying for transactions when none is given.
const DEFAULT_SIGNER: &str = "emulator-account";

#[derive(Parser, Debug)]
#[command(name = "flowkit", author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level.
    #[arg(
        short,
        long,
        env = "FLOW_VERBOSITY",
        default_value_t = LevelFilter::INFO,
        global = true
    )]
    pub verbosity: LevelFilter,

    /// Configuration files to load, later files override earlier ones.
    ///
    /// Defaults to `~/flow.json` when present followed by `./flow.json`.
    #[arg(
        short = 'f',
        long = "config-path",
        env = "FLOW_CONFIG_PATH",
        value_delimiter = ',',
        global = true
    )]
    pub config_paths: Vec<PathBuf>,

    /// Network to talk to, as named in the configuration.
    #[arg(
        short,
        long,
        env = "FLOW_NETWORK",
        default_value = DEFAULT_NETWORK,
        global = true
    )]
    pub network: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy the contracts of every deployment on the network.
    Deploy {
        /// Update contracts that are already deployed instead of skipping them.
        #[arg(short, long)]
        update: bool,

        /// Only resolve imports and print the deployment order.
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect or create accounts.
    Account {
        #[command(subcommand)]
        command: AccountCommand,
    },

    /// Execute a read-only script.
    Script {
        /// Path to the Cadence script.
        path: PathBuf,

        /// JSON-Cadence encoded argument, may be repeated.
        #[arg(short, long = "arg")]
        args: Vec<String>,
    },

    /// Create a new configuration with the default emulator and networks.
    Init {
        /// Hex private key of the emulator service account.
        #[arg(long, env = "FLOW_SERVICE_PRIVATE_KEY")]
        service_private_key: String,

        #[arg(long, default_value_t = SignatureAlgorithm::EcdsaP256)]
        service_sig_algo: SignatureAlgorithm,

        #[arg(long, default_value_t = HashAlgorithm::Sha3_256)]
        service_hash_algo: HashAlgorithm,

        /// Where to write the configuration.
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing configuration.
        #[arg(long)]
        reset: bool,
    },

    /// Inspect or edit the configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum AccountCommand {
    /// Show the on-chain state of an account.
    Get {
        /// Account address or configured account name.
        account: String,

        /// Print the code of every deployed contract.
        #[arg(long)]
        contracts: bool,
    },

    /// Create an account with the given public keys.
    Create {
        /// Hex public key, may be repeated.
        #[arg(short, long = "key", required = true)]
        keys: Vec<String>,

        #[arg(long, default_value_t = SignatureAlgorithm::EcdsaP256)]
        sig_algo: SignatureAlgorithm,

        #[arg(long, default_value_t = HashAlgorithm::Sha3_256)]
        hash_algo: HashAlgorithm,

        /// Configured account paying for the creation.
        #[arg(short, long, default_value = DEFAULT_SIGNER)]
        signer: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the networks, accounts, contracts and deployments.
    Show,

    /// Add or replace a network.
    AddNetwork {
        name: String,
        /// Access node `host:port` or URL.
        host: String,
    },

    /// Add or replace a contract source or alias.
    AddContract {
        name: String,
        /// Path to the contract source, relative to the configuration.
        source: String,

        /// Bind the record to one network.
        #[arg(long = "for-network")]
        for_network: Option<String>,

        /// Address the contract already lives at on `--for-network`.
        #[arg(long, requires = "for_network")]
        alias: Option<String>,
    },

    /// Remove an account.
    RemoveAccount { name: String },
}
