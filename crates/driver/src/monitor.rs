//! Batch scheduler: polls the chain head, scans new blocks in bounded batches and fans each
//! batch out to one task per contract.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use alloy::primitives::Address;
use chainio::{ChainClient, LogFetcher, RawLog};
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use futures::FutureExt;
use primitives::{BackoffPolicy, BackoffState};
use processor::ProcessorRegistry;
use registry::{ContractHandle, ContractRegistry};
use storage::{EventRecord, EventStore};
use tokio::{sync::watch, task::JoinSet, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    checkpoint::{BlockRange, batches, resume_block},
    error::IndexerError,
    status::{BackoffStatus, ChainHealth, StatusSnapshot},
};

/// Scan loop settings.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Time between two scan cycles
    pub poll_interval: Duration,
    /// Maximum blocks per log query
    pub batch_size: u64,
    /// Throttling delays
    pub backoff: BackoffPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 500,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// What one scan cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A backoff window is open; nothing was scanned.
    BackingOff,
    /// The head is below the resume block.
    UpToDate,
    /// Blocks `[from, to]` were scanned. `to` is below the head when a stop was requested.
    Scanned {
        /// First scanned block
        from: u64,
        /// Last scanned block
        to: u64,
        /// Logs persisted during the cycle
        events: usize,
    },
}

#[derive(Debug)]
struct MonitorState {
    resume_block: u64,
    backoff: BackoffState,
    chain_health: ChainHealth,
}

/// Where one log ended up after ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ingested {
    /// Persisted and handled by its processor
    Processed,
    /// Persisted, left for the repair path
    Unprocessed,
}

/// Per-contract results of one batch.
#[derive(Debug, Default, Clone, Copy)]
struct GroupStats {
    persisted: usize,
    processed: usize,
    failed: usize,
}

/// Scans the chain for events of the registered contracts.
#[derive(Debug)]
pub struct EventMonitor {
    chain: Arc<dyn ChainClient>,
    fetcher: LogFetcher,
    contracts: Arc<ContractRegistry>,
    store: Arc<dyn EventStore>,
    processors: Arc<ProcessorRegistry>,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
}

impl EventMonitor {
    /// Create a monitor. Call [`EventMonitor::resolve_checkpoint`] (or [`EventMonitor::run`])
    /// before scanning.
    pub fn new(
        chain: Arc<dyn ChainClient>,
        contracts: Arc<ContractRegistry>,
        store: Arc<dyn EventStore>,
        processors: Arc<ProcessorRegistry>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            fetcher: LogFetcher::new(Arc::clone(&chain)),
            chain,
            contracts,
            store,
            processors,
            config,
            state: Mutex::new(MonitorState {
                resume_block: 0,
                backoff: BackoffState::new(config.backoff),
                chain_health: ChainHealth::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next block the scan starts from.
    pub fn resume_block(&self) -> u64 {
        self.state().resume_block
    }

    /// Current status report.
    pub fn status(&self) -> StatusSnapshot {
        let now = Utc::now();
        let state = self.state();
        StatusSnapshot {
            resume_block: state.resume_block,
            contract_count: self.contracts.len(),
            backoff: BackoffStatus::from_state(&state.backoff, now),
            chain_health: state.chain_health.clone(),
        }
    }

    /// Compute the resume block from the store, the registry and the chain head.
    ///
    /// Fails when no contract is registered or the head or the store cannot be read.
    pub async fn resolve_checkpoint(&self) -> Result<u64, IndexerError> {
        if self.contracts.is_empty() {
            return Err(IndexerError::Fatal("no contracts registered".to_owned()));
        }

        let head = self.read_head(Utc::now()).await.map_err(|e| {
            IndexerError::Fatal(format!("cannot read chain head at startup: {e}"))
        })?;
        let max_persisted = self.store.max_block_number().await.map_err(|e| {
            IndexerError::Fatal(format!("cannot read last persisted block: {e:#}"))
        })?;
        let min_deploy = self.contracts.min_deploy_block();

        let resume = resume_block(max_persisted, min_deploy, head);
        self.state().resume_block = resume;
        info!(resume_block = resume, ?max_persisted, ?min_deploy, head, "Resolved checkpoint");
        Ok(resume)
    }

    /// Resolve the checkpoint, then scan on every tick until `stop` is set.
    ///
    /// A stop request lets the running batch finish; the loop exits before the next one.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) -> Result<(), IndexerError> {
        self.resolve_checkpoint().await?;

        let batch_stop = stop.clone();
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            contracts = self.contracts.len(),
            "Starting event monitor"
        );

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        warn!("Stop sender dropped, stopping event monitor");
                        break;
                    }
                }
                _ = interval.tick() => {
                    match self.scan_once(&batch_stop).await {
                        Ok(ScanOutcome::Scanned { from, to, events }) => {
                            info!(from, to, events, "Scan cycle completed");
                        }
                        Ok(outcome) => debug!(?outcome, "Scan cycle skipped"),
                        Err(IndexerError::Fatal(msg)) => return Err(IndexerError::Fatal(msg)),
                        Err(e) => warn!(err = %e, "Scan cycle failed"),
                    }
                }
            }
        }

        info!(resume_block = self.resume_block(), "Event monitor stopped");
        Ok(())
    }

    /// Run one scan cycle now.
    pub async fn scan_once(
        &self,
        stop: &watch::Receiver<bool>,
    ) -> Result<ScanOutcome, IndexerError> {
        self.scan_once_at(Utc::now(), stop).await
    }

    /// Run one scan cycle as of `now`, which drives the backoff window.
    pub(crate) async fn scan_once_at(
        &self,
        now: DateTime<Utc>,
        stop: &watch::Receiver<bool>,
    ) -> Result<ScanOutcome, IndexerError> {
        let remaining = self.state().backoff.remaining(now);
        if let Some(left) = remaining {
            debug!(remaining_secs = left.as_secs(), "Backoff window open, not scanning");
            return Ok(ScanOutcome::BackingOff);
        }

        match self.scan(now, stop).await {
            Err(IndexerError::Throttled(msg)) => {
                let mut state = self.state();
                let delay = state.backoff.record_throttle(now);
                warn!(
                    retry_count = state.backoff.retry_count(),
                    delay_secs = delay.as_secs(),
                    resume_block = state.resume_block,
                    err = %msg,
                    "Upstream throttled, backing off"
                );
                Err(IndexerError::Throttled(msg))
            }
            Ok(outcome) => {
                let mut state = self.state();
                if state.backoff.retry_count() > 0 {
                    info!(retry_count = state.backoff.retry_count(), "Throttling cleared");
                }
                state.backoff.reset();
                Ok(outcome)
            }
            Err(e) => Err(e),
        }
    }

    async fn read_head(&self, now: DateTime<Utc>) -> Result<u64, IndexerError> {
        match self.chain.head_block_number().await {
            Ok(head) => {
                self.state().chain_health.record_head(head, now);
                Ok(head)
            }
            Err(e) => {
                self.state().chain_health.record_error(e.to_string(), now);
                Err(e.into())
            }
        }
    }

    async fn scan(
        &self,
        now: DateTime<Utc>,
        stop: &watch::Receiver<bool>,
    ) -> Result<ScanOutcome, IndexerError> {
        let head = self.read_head(now).await?;
        let from = self.resume_block();
        if head < from {
            debug!(head, resume_block = from, "Head below resume block");
            return Ok(ScanOutcome::UpToDate);
        }

        let mut last = None;
        let mut events = 0;
        for range in batches(from, head, self.config.batch_size) {
            if *stop.borrow() {
                info!(resume_block = range.from, "Stop requested, ending scan between batches");
                break;
            }

            events += self.scan_batch(range).await?;
            self.advance(range.next());
            last = Some(range.to);
        }

        Ok(match last {
            Some(to) => ScanOutcome::Scanned { from, to, events },
            None => ScanOutcome::UpToDate,
        })
    }

    fn advance(&self, next: u64) {
        let mut state = self.state();
        if next > state.resume_block {
            state.resume_block = next;
        }
    }

    /// Fetch and process one batch. Returns the number of persisted events.
    ///
    /// Fails with [`IndexerError::Transient`] when a log of the batch could not be stored, so
    /// the caller keeps the checkpoint and the batch is scanned again on the next cycle.
    async fn scan_batch(&self, range: BlockRange) -> Result<usize, IndexerError> {
        let eligible: HashMap<Address, Arc<ContractHandle>> = self
            .contracts
            .all()
            .into_iter()
            .filter(|handle| handle.is_eligible(range.to))
            .map(|handle| (handle.address(), handle))
            .collect();
        if eligible.is_empty() {
            debug!(from = range.from, to = range.to, "No eligible contracts in batch");
            return Ok(0);
        }

        let addresses: BTreeSet<Address> = eligible.keys().copied().collect();
        let logs = match self.fetcher.fetch(&addresses, range.from, range.to).await {
            Ok(logs) => logs,
            Err(e) if e.is_throttled() => return Err(e.into()),
            Err(e) => {
                warn!(
                    from = range.from,
                    to = range.to,
                    err = %e,
                    "Combined log query failed, querying contracts one by one"
                );
                self.fetch_individually(&addresses, range).await?
            }
        };
        if logs.is_empty() {
            debug!(from = range.from, to = range.to, "No logs in batch");
            return Ok(0);
        }

        let mut groups: BTreeMap<Address, Vec<RawLog>> = BTreeMap::new();
        for log in logs {
            groups.entry(log.address).or_default().push(log);
        }

        let mut tasks = JoinSet::new();
        for (address, logs) in groups {
            let Some(handle) = eligible.get(&address).cloned() else { continue };
            let store = Arc::clone(&self.store);
            let processors = Arc::clone(&self.processors);
            tasks.spawn(process_group(handle, logs, store, processors));
        }
        let workers = tasks.len();

        let mut total = GroupStats::default();
        let mut incomplete = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(stats)) => {
                    total.persisted += stats.persisted;
                    total.processed += stats.processed;
                    total.failed += stats.failed;
                }
                Ok(Err(e)) => incomplete.push(e.to_string()),
                Err(e) => {
                    error!(err = %e, "Contract worker panicked");
                    incomplete.push(format!("contract worker panicked: {e}"));
                }
            }
        }

        if !incomplete.is_empty() {
            warn!(
                from = range.from,
                to = range.to,
                failed_contracts = incomplete.len(),
                "Batch incomplete, checkpoint kept"
            );
            return Err(IndexerError::Transient(format!(
                "batch [{}, {}] incomplete: {}",
                range.from,
                range.to,
                incomplete.join("; ")
            )));
        }

        info!(
            from = range.from,
            to = range.to,
            workers,
            persisted = total.persisted,
            processed = total.processed,
            failed = total.failed,
            "Processed batch"
        );
        Ok(total.persisted)
    }

    async fn fetch_individually(
        &self,
        addresses: &BTreeSet<Address>,
        range: BlockRange,
    ) -> Result<Vec<RawLog>, IndexerError> {
        let mut logs = Vec::new();
        for (address, result) in self.fetcher.fetch_each(addresses, range.from, range.to).await {
            match result {
                Ok(found) => logs.extend(found),
                Err(e) if e.is_throttled() => return Err(e.into()),
                Err(e) => warn!(
                    %address,
                    from = range.from,
                    to = range.to,
                    err = %e,
                    "Skipping contract for this batch"
                ),
            }
        }
        Ok(logs)
    }
}

/// Decode, persist and dispatch the logs of one contract in chain order.
///
/// Stops at the first log that cannot be stored; the rest of the group is left for the retry.
async fn process_group(
    handle: Arc<ContractHandle>,
    mut logs: Vec<RawLog>,
    store: Arc<dyn EventStore>,
    processors: Arc<ProcessorRegistry>,
) -> Result<GroupStats, IndexerError> {
    logs.sort_by_key(|log| (log.block_number, log.log_index));

    let mut stats = GroupStats::default();
    for log in &logs {
        match ingest(&handle, log, store.as_ref(), &processors).await {
            Ok(Ingested::Processed) => {
                stats.persisted += 1;
                stats.processed += 1;
            }
            Ok(Ingested::Unprocessed) => {
                stats.persisted += 1;
                stats.failed += 1;
            }
            Err(e) => {
                error!(
                    contract = handle.name(),
                    tx_hash = %log.tx_hash,
                    log_index = log.log_index,
                    err = %e,
                    "Failed to persist event"
                );
                return Err(IndexerError::Transient(format!("{}: {e:#}", handle.name())));
            }
        }
    }
    Ok(stats)
}

/// Persist one log and run its processor.
///
/// Errors only when the store fails. A failing or panicking processor leaves the record
/// unprocessed.
async fn ingest(
    handle: &ContractHandle,
    log: &RawLog,
    store: &dyn EventStore,
    processors: &ProcessorRegistry,
) -> Result<Ingested> {
    let event = handle.decode(log);
    let record = store
        .upsert(EventRecord::from_decoded(&event, handle.address()))
        .await
        .wrap_err("failed to upsert event")?;

    let dispatched = AssertUnwindSafe(processors.dispatch(&record, &event)).catch_unwind().await;
    let failure = match dispatched {
        Ok(Ok(outcome)) => {
            store.mark_processed(&record.key()).await.wrap_err("failed to mark event processed")?;
            debug!(
                event = event.name(),
                block_number = log.block_number,
                log_index = log.log_index,
                ?outcome,
                "Event processed"
            );
            return Ok(Ingested::Processed);
        }
        Ok(Err(e)) => format!("{e:#}"),
        Err(panic) => panic_message(panic.as_ref()),
    };

    warn!(
        contract = handle.name(),
        event = event.name(),
        tx_hash = %log.tx_hash,
        log_index = log.log_index,
        err = %failure,
        "Processor failed, event left unprocessed"
    );
    Ok(Ingested::Unprocessed)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let msg = panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic");
    format!("processor panicked: {msg}")
}
