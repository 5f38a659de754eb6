//! Operational status of the event monitor and its HTTP routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
};
use chrono::{DateTime, Utc};
use primitives::BackoffState;
use serde::{Deserialize, Serialize};
use storage::{EventCountRow, EventRecord, EventStore};
use tracing::error;

use crate::monitor::EventMonitor;

const DEFAULT_UNPROCESSED_LIMIT: u64 = 100;
const MAX_UNPROCESSED_LIMIT: u64 = 1000;

/// Point-in-time report of the scan loop. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Next block the scan starts from
    pub resume_block: u64,
    /// Registered contracts
    pub contract_count: usize,
    /// Throttling state
    pub backoff: BackoffStatus,
    /// Last observed chain reachability
    pub chain_health: ChainHealth,
}

/// Serializable view of [`BackoffState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffStatus {
    /// Consecutive throttled cycles
    pub retry_count: u32,
    /// Length of the current backoff window
    pub current_delay_secs: u64,
    /// When the last throttled cycle happened
    pub last_retry_at: Option<DateTime<Utc>>,
    /// Whether scanning is currently suppressed
    pub active: bool,
}

impl BackoffStatus {
    /// Capture `state` as of `now`.
    pub fn from_state(state: &BackoffState, now: DateTime<Utc>) -> Self {
        Self {
            retry_count: state.retry_count(),
            current_delay_secs: state.current_delay().as_secs(),
            last_retry_at: state.last_retry_at(),
            active: state.is_active(now),
        }
    }
}

/// Result of the most recent head lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHealth {
    /// Whether the last lookup succeeded
    pub healthy: bool,
    /// Head seen by the last successful lookup
    pub head_block: Option<u64>,
    /// Error of the last failed lookup
    pub last_error: Option<String>,
    /// When the chain was last checked
    pub checked_at: Option<DateTime<Utc>>,
}

impl ChainHealth {
    pub(crate) fn record_head(&mut self, head: u64, now: DateTime<Utc>) {
        self.healthy = true;
        self.head_block = Some(head);
        self.last_error = None;
        self.checked_at = Some(now);
    }

    pub(crate) fn record_error(&mut self, err: String, now: DateTime<Utc>) {
        self.healthy = false;
        self.last_error = Some(err);
        self.checked_at = Some(now);
    }
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<u64>,
}

#[derive(Debug, Clone)]
struct StatusState {
    monitor: Arc<EventMonitor>,
    store: Arc<dyn EventStore>,
}

/// Routes exposing the monitor status and event store statistics.
pub fn router(monitor: Arc<EventMonitor>, store: Arc<dyn EventStore>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/events/unprocessed", get(unprocessed))
        .route("/events/stats", get(stats))
        .with_state(StatusState { monitor, store })
}

async fn status(State(state): State<StatusState>) -> Json<StatusSnapshot> {
    Json(state.monitor.status())
}

async fn unprocessed(
    State(state): State<StatusState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<EventRecordView>>, StatusCode> {
    let limit = params.limit.unwrap_or(DEFAULT_UNPROCESSED_LIMIT).min(MAX_UNPROCESSED_LIMIT);
    match state.store.unprocessed(limit).await {
        Ok(records) => Ok(Json(records.iter().map(EventRecordView::from).collect())),
        Err(e) => {
            error!(err = %e, "Failed to read unprocessed events");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn stats(State(state): State<StatusState>) -> Result<Json<Vec<EventCountRow>>, StatusCode> {
    state.store.event_counts().await.map(Json).map_err(|e| {
        error!(err = %e, "Failed to read event counts");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// JSON view of an [`EventRecord`] with hex-encoded identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecordView {
    /// Transaction hash, `0x`-prefixed
    pub tx_hash: String,
    /// Log index
    pub log_index: u64,
    /// Block number
    pub block_number: u64,
    /// Contract address, `0x`-prefixed
    pub contract_address: String,
    /// Contract name
    pub contract_name: String,
    /// Event name
    pub event_name: String,
    /// Decoded fields
    pub fields: serde_json::Value,
    /// Processor status
    pub processed: bool,
}

impl From<&EventRecord> for EventRecordView {
    fn from(record: &EventRecord) -> Self {
        Self {
            tx_hash: format!("0x{}", record.tx_hash.to_hex()),
            log_index: record.log_index,
            block_number: record.block_number,
            contract_address: alloy::primitives::Address::from(record.contract_address)
                .to_checksum(None),
            contract_name: record.contract_name.clone(),
            event_name: record.event_name.clone(),
            fields: serde_json::from_str(&record.fields).unwrap_or(serde_json::Value::Null),
            processed: record.processed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use alloy::primitives::{Address, Bytes};
    use async_trait::async_trait;
    use chainio::{ChainClient, ChainError, RawLog};
    use primitives::BackoffPolicy;
    use processor::ProcessorRegistry;
    use registry::ContractRegistry;
    use runtime::{health::serve_listener, shutdown::stop_channel};
    use storage::{AddressBytes, HashBytes, MemoryEventStore};
    use tokio::net::TcpListener;

    use crate::monitor::MonitorConfig;

    #[derive(Debug)]
    struct StaticHead(u64);

    #[async_trait]
    impl ChainClient for StaticHead {
        async fn head_block_number(&self) -> Result<u64, ChainError> {
            Ok(self.0)
        }

        async fn filter_logs(
            &self,
            _: &[Address],
            _: u64,
            _: u64,
        ) -> Result<Vec<RawLog>, ChainError> {
            Ok(Vec::new())
        }

        async fn code_at(&self, _: Address, _: u64) -> Result<Bytes, ChainError> {
            Ok(Bytes::new())
        }
    }

    fn record(log_index: u64, event_name: &str) -> EventRecord {
        EventRecord {
            tx_hash: HashBytes([0x42; 32]),
            log_index,
            block_number: 650,
            contract_address: AddressBytes([0xaa; 20]),
            contract_name: "Crowdfunding".into(),
            event_name: event_name.into(),
            fields: r#"{"projectId":"7"}"#.into(),
            processed: false,
            version: 0,
        }
    }

    #[test]
    fn backoff_status_reports_active_window() {
        let mut state = BackoffState::new(BackoffPolicy::new(
            Duration::from_secs(60),
            Duration::from_secs(600),
        ));
        let now = Utc::now();
        state.record_throttle(now);

        let status = BackoffStatus::from_state(&state, now);
        assert_eq!(status.retry_count, 1);
        assert_eq!(status.current_delay_secs, 60);
        assert!(status.active);

        let later = BackoffStatus::from_state(&state, now + chrono::TimeDelta::seconds(61));
        assert!(!later.active);
    }

    #[test]
    fn chain_health_tracks_last_lookup() {
        let mut health = ChainHealth::default();
        let now = Utc::now();
        health.record_error("connection refused".into(), now);
        assert!(!health.healthy);

        health.record_head(700, now);
        assert!(health.healthy);
        assert_eq!(health.head_block, Some(700));
        assert_eq!(health.last_error, None);
    }

    #[tokio::test]
    async fn routes_serve_status_and_store_views() {
        let registry = Arc::new(ContractRegistry::new());
        registry
            .register(
                "Crowdfunding",
                "0x00000000000000000000000000000000000000aa",
                include_str!("../../../abi/Crowdfunding.json"),
                100,
            )
            .unwrap();

        let store = Arc::new(MemoryEventStore::new());
        store.upsert(record(0, "ContributionMade")).await.unwrap();
        let done = store.upsert(record(1, "ContributionMade")).await.unwrap();
        store.mark_processed(&done.key()).await.unwrap();
        store.upsert(record(2, "ProjectCreated")).await.unwrap();

        let monitor = Arc::new(EventMonitor::new(
            Arc::new(StaticHead(700)),
            registry,
            Arc::clone(&store) as Arc<dyn EventStore>,
            Arc::new(ProcessorRegistry::new()),
            MonitorConfig::default(),
        ));
        monitor.resolve_checkpoint().await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = stop_channel();
        let app = router(Arc::clone(&monitor), store as Arc<dyn EventStore>);
        let server = tokio::spawn(serve_listener(listener, app, rx));

        let status: StatusSnapshot = reqwest::get(format!("http://{addr}/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status.resume_block, 650);
        assert_eq!(status.contract_count, 1);
        assert!(status.chain_health.healthy);
        assert_eq!(status.chain_health.head_block, Some(700));
        assert!(!status.backoff.active);

        let pending: Vec<EventRecordView> =
            reqwest::get(format!("http://{addr}/events/unprocessed?limit=1"))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
        assert_eq!(pending.len(), 1);
        assert!(!pending[0].processed);
        assert_eq!(pending[0].fields["projectId"], "7");

        let mut counts: Vec<EventCountRow> = reqwest::get(format!("http://{addr}/events/stats"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        counts.sort_by(|a, b| a.event_name.cmp(&b.event_name));
        assert_eq!(
            counts,
            [
                EventCountRow { event_name: "ContributionMade".into(), total: 2, processed: 1 },
                EventCountRow { event_name: "ProjectCreated".into(), total: 1, processed: 0 },
            ]
        );

        tx.send_replace(true);
        server.await.unwrap().unwrap();
    }

    #[test]
    fn record_view_decodes_fields() {
        let record = EventRecord {
            tx_hash: HashBytes([0x42; 32]),
            log_index: 3,
            block_number: 650,
            contract_address: AddressBytes([0xaa; 20]),
            contract_name: "Crowdfunding".into(),
            event_name: "ContributionMade".into(),
            fields: r#"{"projectId":"7"}"#.into(),
            processed: false,
            version: 1,
        };

        let view = EventRecordView::from(&record);
        assert_eq!(view.tx_hash, format!("0x{}", "42".repeat(32)));
        assert_eq!(view.fields["projectId"], "7");
    }
}
