//! Fundscope configuration
use std::{
    fmt,
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use eyre::{Context, Result, bail};
use serde::Deserialize;
use url::Url;

/// Clickhouse database configuration options
#[derive(Debug, Clone, Parser)]
pub struct ClickhouseOpts {
    /// Clickhouse URL
    #[clap(
        long = "clickhouse-url",
        env = "CLICKHOUSE_URL",
        default_value = "http://localhost:8123"
    )]
    pub url: Url,
    /// Clickhouse database
    #[clap(long = "clickhouse-db", env = "CLICKHOUSE_DB", default_value = "fundscope")]
    pub db: String,
    /// Clickhouse username
    #[clap(long = "clickhouse-username", env = "CLICKHOUSE_USERNAME", default_value = "default")]
    pub username: String,
    /// Clickhouse password
    #[clap(long = "clickhouse-password", env = "CLICKHOUSE_PASSWORD", default_value = "")]
    pub password: String,
}

/// Chains the indexer knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainType {
    /// Ethereum mainnet and testnets
    Ethereum,
    /// Polygon PoS
    Polygon,
    /// BNB smart chain
    Bsc,
    /// Arbitrum
    Arbitrum,
    /// Optimism
    Optimism,
}

impl FromStr for ChainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ethereum" => Ok(Self::Ethereum),
            "polygon" => Ok(Self::Polygon),
            "bsc" => Ok(Self::Bsc),
            "arbitrum" => Ok(Self::Arbitrum),
            "optimism" => Ok(Self::Optimism),
            other => Err(format!("unsupported chain type: {other}")),
        }
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ethereum => "ethereum",
            Self::Polygon => "polygon",
            Self::Bsc => "bsc",
            Self::Arbitrum => "arbitrum",
            Self::Optimism => "optimism",
        };
        f.write_str(name)
    }
}

/// Chain endpoint configuration options
#[derive(Debug, Clone, Parser)]
pub struct ChainOpts {
    /// Chain type (ethereum, polygon, bsc, arbitrum, optimism)
    #[clap(long, env = "CHAIN_TYPE", default_value = "ethereum")]
    pub chain_type: ChainType,
    /// Chain ID, used for logging only
    #[clap(long, env = "CHAIN_ID", default_value = "1")]
    pub chain_id: u64,
    /// JSON-RPC HTTP endpoint
    #[clap(long, env = "RPC_URL")]
    pub rpc_url: Url,
}

/// Event monitor configuration options
#[derive(Debug, Clone, Parser)]
pub struct MonitorOpts {
    /// Path to the JSON contract configuration file
    #[clap(long, env = "CONTRACTS_FILE", default_value = "contracts.json")]
    pub contracts_file: PathBuf,
    /// Seconds between two scan cycles
    #[clap(long, env = "POLL_INTERVAL_SECS", default_value = "60")]
    pub poll_interval_secs: u64,
    /// Maximum number of blocks covered by one log query
    #[clap(long, env = "BATCH_SIZE", default_value = "500")]
    pub batch_size: u64,
    /// Delay after the first throttled cycle, in seconds
    #[clap(long, env = "BACKOFF_BASE_SECS", default_value = "60")]
    pub backoff_base_secs: u64,
    /// Ceiling for the throttling delay, in seconds
    #[clap(long, env = "BACKOFF_MAX_SECS", default_value = "600")]
    pub backoff_max_secs: u64,
    /// How many blocks below the head to probe when looking for a deployment block
    #[clap(long, env = "DEPLOY_LOOKBACK", default_value = "1000")]
    pub deploy_lookback: u64,
}

impl MonitorOpts {
    /// Poll interval as a [`Duration`].
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Check the numeric options for values the scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch size must be greater than zero");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll interval must be greater than zero");
        }
        if self.backoff_max_secs < self.backoff_base_secs {
            bail!(
                "backoff ceiling ({}s) is below the base delay ({}s)",
                self.backoff_max_secs,
                self.backoff_base_secs
            );
        }
        Ok(())
    }
}

/// CLI options for fundscope
#[derive(Debug, Clone, Parser)]
pub struct Opts {
    /// Clickhouse database configuration
    #[clap(flatten)]
    pub clickhouse: ClickhouseOpts,

    /// Chain endpoint configuration
    #[clap(flatten)]
    pub chain: ChainOpts,

    /// Event monitor configuration
    #[clap(flatten)]
    pub monitor: MonitorOpts,

    /// Address of the health and status server
    #[clap(long, env = "STATUS_ADDR", default_value = "0.0.0.0:8080")]
    pub status_addr: SocketAddr,

    /// If set, drop & re-create all tables (local/dev only)
    #[clap(long)]
    pub reset_db: bool,

    /// Keep events in memory and skip all database writes
    #[clap(long, env = "DRY_RUN")]
    pub dry_run: bool,
}

/// One entry of the contract configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContractConfig {
    /// Unique name of the contract
    pub name: String,
    /// Address the contract is deployed at
    pub address: String,
    /// Path to the ABI file; relative paths resolve against the config file's directory
    pub abi_path: PathBuf,
    /// Disabled contracts are never registered
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// First block the contract can emit events at; 0 when unknown
    #[serde(default, alias = "block_num")]
    pub deploy_block: u64,
}

const fn default_enabled() -> bool {
    true
}

/// Load the contract configuration file, keeping only enabled entries.
pub fn load_contracts(path: &Path) -> Result<Vec<ContractConfig>> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read contract config {}", path.display()))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_contracts(&raw, base_dir)
        .wrap_err_with(|| format!("failed to parse contract config {}", path.display()))
}

/// Parse a contract configuration document, resolving ABI paths against `base_dir`.
pub fn parse_contracts(raw: &str, base_dir: &Path) -> Result<Vec<ContractConfig>> {
    let contracts: Vec<ContractConfig> = serde_json::from_str(raw)?;

    let mut enabled = Vec::with_capacity(contracts.len());
    for mut contract in contracts {
        if !contract.enabled {
            continue;
        }
        if enabled.iter().any(|c: &ContractConfig| c.name == contract.name) {
            bail!("duplicate contract name: {}", contract.name);
        }
        if contract.abi_path.is_relative() {
            contract.abi_path = base_dir.join(&contract.abi_path);
        }
        enabled.push(contract);
    }
    Ok(enabled)
}
