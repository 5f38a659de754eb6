//! Fundscope driver: wires configuration, chain client, registries and storage into the
//! event monitor and serves its status.

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use chainio::{ChainClient, RpcChainClient};
use config::{ContractConfig, Opts, load_contracts};
use eyre::{Context, Result};
use primitives::{BackoffPolicy, retries::retry_with_backoff_if};
use processor::{ProcessorRegistry, register_crowdfunding};
use registry::ContractRegistry;
use storage::{ClickhouseWriter, EventStore, MemoryEventStore};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    error::IndexerError,
    monitor::{EventMonitor, MonitorConfig},
    status,
};

/// How long the startup health check may take.
const RPC_HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Driver owning the event monitor and the status server
#[derive(Debug)]
pub struct Driver {
    monitor: Arc<EventMonitor>,
    store: Arc<dyn EventStore>,
    status_addr: SocketAddr,
}

impl Driver {
    /// Create a new driver with the given configuration
    pub async fn new(opts: Opts) -> Result<Self> {
        info!(
            chain_type = %opts.chain.chain_type,
            chain_id = opts.chain.chain_id,
            rpc_url = %opts.chain.rpc_url,
            "Initializing driver"
        );
        opts.monitor.validate()?;

        let contracts = load_contracts(&opts.monitor.contracts_file)?;
        if contracts.is_empty() {
            return Err(IndexerError::Fatal(format!(
                "no enabled contracts in {}",
                opts.monitor.contracts_file.display()
            ))
            .into());
        }

        let chain: Arc<dyn ChainClient> =
            Arc::new(RpcChainClient::new(opts.chain.rpc_url.clone()));
        let head = verify_rpc_health(chain.as_ref(), RPC_HEALTH_TIMEOUT).await?;
        info!(head, "RPC health check passed");

        let registry = Arc::new(ContractRegistry::new());
        register_contracts(&registry, &contracts)?;
        let resolved =
            registry.resolve_deploy_blocks(chain.as_ref(), opts.monitor.deploy_lookback).await;
        info!(contracts = registry.len(), resolved, "Contract registry ready");

        let (store, writer): (Arc<dyn EventStore>, Option<ClickhouseWriter>) = if opts.dry_run {
            info!("DRY-RUN MODE: events are kept in memory and ledger writes are skipped");
            (Arc::new(MemoryEventStore::new()), None)
        } else {
            let writer = ClickhouseWriter::new(
                opts.clickhouse.url.clone(),
                opts.clickhouse.db.clone(),
                opts.clickhouse.username.clone(),
                opts.clickhouse.password.clone(),
            );
            info!("Running database migrations...");
            writer.init_db(opts.reset_db).await?;
            info!("Database migrations completed");
            (Arc::new(writer.clone()), Some(writer))
        };

        let processors = Arc::new(ProcessorRegistry::new());
        register_crowdfunding(&processors, writer);
        info!(handlers = processors.len(), "Registered event processors");

        let config = MonitorConfig {
            poll_interval: opts.monitor.poll_interval(),
            batch_size: opts.monitor.batch_size,
            backoff: BackoffPolicy::new(
                Duration::from_secs(opts.monitor.backoff_base_secs),
                Duration::from_secs(opts.monitor.backoff_max_secs),
            ),
        };
        let monitor =
            Arc::new(EventMonitor::new(chain, registry, Arc::clone(&store), processors, config));

        Ok(Self { monitor, store, status_addr: opts.status_addr })
    }

    /// The event monitor driven by this driver.
    pub const fn monitor(&self) -> &Arc<EventMonitor> {
        &self.monitor
    }

    /// Serve the status endpoints and run the monitor until `stop` is set.
    ///
    /// The status server lives as long as the monitor: it is stopped as soon as the monitor
    /// exits, whether on `stop` or on a fatal error.
    pub async fn start(self, stop: watch::Receiver<bool>) -> Result<()> {
        let app = status::router(Arc::clone(&self.monitor), Arc::clone(&self.store));
        let (server_stop, server_stopped) = runtime::shutdown::stop_channel();
        let server = tokio::spawn(runtime::health::serve(self.status_addr, app, server_stopped));

        let result = self.monitor.run(stop).await;
        if let Err(e) = &result {
            error!(err = %e, "Event monitor failed");
        }
        server_stop.send_replace(true);

        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(err = %e, "Status server failed"),
            Err(e) => warn!(err = %e, "Status server task failed"),
        }
        result.map_err(Into::into)
    }
}

/// Check that the chain head can be read within `timeout`. Returns the head.
///
/// Transport failures are retried with a short exponential backoff; throttling is not.
pub async fn verify_rpc_health(
    chain: &dyn ChainClient,
    timeout: Duration,
) -> Result<u64, IndexerError> {
    let check = retry_with_backoff_if(|| chain.head_block_number(), |e| !e.is_throttled());

    match tokio::time::timeout(timeout, check).await {
        Ok(Ok(head)) => Ok(head),
        Ok(Err(e)) => Err(IndexerError::Fatal(format!("RPC health check failed: {e}"))),
        Err(_) => Err(IndexerError::Fatal(format!(
            "RPC health check timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

/// Register every configured contract, reading its ABI file.
///
/// A contract that cannot be registered aborts startup.
pub fn register_contracts(registry: &ContractRegistry, contracts: &[ContractConfig]) -> Result<()> {
    for contract in contracts {
        let abi_source = read_abi(&contract.abi_path)
            .wrap_err_with(|| format!("failed to load ABI for contract {}", contract.name))?;
        registry
            .register(&contract.name, &contract.address, &abi_source, contract.deploy_block)
            .map_err(IndexerError::from)?;
    }
    Ok(())
}

fn read_abi(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("cannot read {}", path.display()))
}
