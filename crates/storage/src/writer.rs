//! `ClickHouse` writer for fundscope
//! Handles database initialization, event persistence and ledger inserts

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use clickhouse::{Client, Row, query::Query, sql::Identifier};
use derive_more::Debug;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use url::Url;

use crate::{
    models::{
        ContributionRow, EventCountRow, EventKey, EventRecord, ProjectCreatedRow,
        ProjectStatusRow, RefundRow,
    },
    schema::{TABLE_SCHEMAS, TABLES, TableSchema},
    store::{EventStore, VersionClock},
};

const EVENT_COLUMNS: &str = "tx_hash, log_index, block_number, contract_address, contract_name, \
                             event_name, fields, processed, version";

/// `ClickHouse` client for fundscope (migrations, events and ledger tables)
#[derive(Clone, Debug)]
pub struct ClickhouseWriter {
    /// Base client
    #[debug(skip)]
    base: Client,
    /// Database name
    db_name: String,
    /// Row versions for the `events` table
    #[debug(skip)]
    clock: Arc<VersionClock>,
}

impl ClickhouseWriter {
    /// Create a new `ClickHouse` writer client
    pub fn new(url: Url, db_name: String, username: String, password: String) -> Self {
        let client = Client::default().with_url(url).with_user(username).with_password(password);

        Self { base: client, db_name, clock: Default::default() }
    }

    /// Database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    fn table(&self, name: &str) -> String {
        format!("{}.{}", self.db_name, name)
    }

    /// Create a table with the given schema
    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let query = format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (
                {}
            ) ENGINE = {}
            ORDER BY ({})",
            self.db_name, schema.name, schema.columns, schema.engine, schema.order_by
        );

        self.base
            .query(&query)
            .execute()
            .await
            .wrap_err_with(|| format!("Failed to create {} table", schema.name))
    }

    /// Drop a table if it exists
    async fn drop_table(&self, table_name: &str) -> Result<()> {
        self.base
            .query(&format!("DROP TABLE IF EXISTS {}.{}", self.db_name, table_name))
            .execute()
            .await
            .wrap_err_with(|| format!("Failed to drop {} table", table_name))
    }

    /// Initialize database and optionally reset
    pub async fn init_db(&self, reset: bool) -> Result<()> {
        self.base
            .query(&format!("CREATE DATABASE IF NOT EXISTS {}", self.db_name))
            .execute()
            .await
            .wrap_err_with(|| format!("Failed to create database {}", self.db_name))?;

        if reset {
            for table in TABLES {
                self.drop_table(table).await?;
            }
            info!(db_name = %self.db_name, "Database reset complete");
        }

        for schema in TABLE_SCHEMAS {
            self.create_table(schema).await?;
        }
        Ok(())
    }

    async fn insert_row<T>(&self, table: &str, row: &T) -> Result<()>
    where
        T: Row + Serialize,
    {
        let mut insert = self.base.insert(&self.table(table))?;
        insert.write(row).await?;
        insert.end().await.wrap_err_with(|| format!("Failed to insert into {table}"))
    }

    async fn fetch<R>(&self, sql: &str, query: Query) -> Result<Vec<R>>
    where
        R: Row + for<'b> Deserialize<'b>,
    {
        let start = Instant::now();
        let result = query.fetch_all::<R>().await;

        let duration_ms = start.elapsed().as_millis();
        match &result {
            Ok(rows) => {
                debug!(query = sql, duration_ms, rows = rows.len(), "ClickHouse query executed")
            }
            Err(e) => error!(query = sql, duration_ms, error = %e, "ClickHouse query failed"),
        }
        Ok(result?)
    }

    /// Insert a `ProjectCreated` ledger row
    pub async fn insert_project_created(&self, row: &ProjectCreatedRow) -> Result<()> {
        self.insert_row("projects_created", row).await
    }

    /// Insert a project status change ledger row
    pub async fn insert_project_status(&self, row: &ProjectStatusRow) -> Result<()> {
        self.insert_row("project_status_changes", row).await
    }

    /// Insert a contribution ledger row
    pub async fn insert_contribution(&self, row: &ContributionRow) -> Result<()> {
        self.insert_row("contributions", row).await
    }

    /// Insert a refund ledger row
    pub async fn insert_refund(&self, row: &RefundRow) -> Result<()> {
        self.insert_row("refunds", row).await
    }
}

#[async_trait]
impl EventStore for ClickhouseWriter {
    async fn upsert(&self, mut record: EventRecord) -> Result<EventRecord> {
        record.processed = false;
        record.version = self.clock.next();
        self.insert_row("events", &record).await?;
        Ok(record)
    }

    async fn mark_processed(&self, key: &EventKey) -> Result<()> {
        let sql = format!(
            "INSERT INTO ?.events ({EVENT_COLUMNS})
             SELECT tx_hash, log_index, block_number, contract_address, contract_name,
                    event_name, fields, true, ?
             FROM ?.events FINAL
             WHERE tx_hash = unhex(?) AND log_index = ?"
        );

        self.base
            .query(&sql)
            .bind(Identifier(&self.db_name))
            .bind(self.clock.next())
            .bind(Identifier(&self.db_name))
            .bind(key.tx_hash.to_hex())
            .bind(key.log_index)
            .execute()
            .await
            .wrap_err_with(|| {
                format!("Failed to mark event {}:{} processed", key.tx_hash.to_hex(), key.log_index)
            })
    }

    async fn max_block_number(&self) -> Result<Option<u64>> {
        #[derive(Row, Deserialize)]
        struct MaxBlock {
            block_number: u64,
        }

        let sql = "SELECT max(block_number) AS block_number FROM ?.events";
        let rows = self
            .fetch::<MaxBlock>(sql, self.base.query(sql).bind(Identifier(&self.db_name)))
            .await
            .context("fetching max block number failed")?;

        Ok(rows.into_iter().next().map(|row| row.block_number).filter(|block| *block > 0))
    }

    async fn unprocessed(&self, limit: u64) -> Result<Vec<EventRecord>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM ?.events FINAL
             WHERE processed = false
             ORDER BY block_number, log_index
             LIMIT ?"
        );
        let query = self.base.query(&sql).bind(Identifier(&self.db_name)).bind(limit);
        self.fetch::<EventRecord>(&sql, query)
            .await
            .context("fetching unprocessed events failed")
    }

    async fn event_counts(&self) -> Result<Vec<EventCountRow>> {
        let sql = "SELECT event_name, count() AS total, countIf(processed) AS processed
                   FROM ?.events FINAL
                   GROUP BY event_name
                   ORDER BY event_name";
        self.fetch::<EventCountRow>(sql, self.base.query(sql).bind(Identifier(&self.db_name)))
            .await
            .context("fetching event counts failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clickhouse::test::{Mock, handlers};

    use crate::types::{AddressBytes, HashBytes};

    #[derive(Row, Serialize)]
    struct MaxBlock {
        block_number: u64,
    }

    fn writer(mock: &Mock) -> ClickhouseWriter {
        ClickhouseWriter::new(
            Url::parse(mock.url()).unwrap(),
            "fundscope".to_owned(),
            "user".to_owned(),
            "pass".to_owned(),
        )
    }

    fn record() -> EventRecord {
        EventRecord {
            tx_hash: HashBytes([0x42; 32]),
            log_index: 3,
            block_number: 650,
            contract_address: AddressBytes([0xaa; 20]),
            contract_name: "Crowdfunding".to_owned(),
            event_name: "ContributionMade".to_owned(),
            fields: r#"{"projectId":"7"}"#.to_owned(),
            processed: true,
            version: 0,
        }
    }

    #[tokio::test]
    async fn init_db_creates_replacing_tables() {
        let mock = Mock::new();
        let database = mock.add(handlers::record_ddl());
        let mut tables = Vec::new();
        for _ in TABLE_SCHEMAS {
            tables.push(mock.add(handlers::record_ddl()));
        }

        writer(&mock).init_db(false).await.unwrap();

        assert!(database.query().await.contains("CREATE DATABASE IF NOT EXISTS fundscope"));
        let events = tables.remove(0).query().await;
        assert!(events.contains("fundscope.events"));
        assert!(events.contains("ReplacingMergeTree(version)"));
        assert!(events.contains("ORDER BY (tx_hash, log_index)"));
    }

    #[tokio::test]
    async fn upsert_writes_unprocessed_row_with_version() {
        let mock = Mock::new();
        let recorder = mock.add(handlers::record::<EventRecord>());

        let stored = writer(&mock).upsert(record()).await.unwrap();

        let rows: Vec<EventRecord> = recorder.collect().await;
        assert_eq!(rows, vec![stored.clone()]);
        assert!(!stored.processed);
        assert!(stored.version > 0);
    }

    #[tokio::test]
    async fn mark_processed_reinserts_latest_row() {
        let mock = Mock::new();
        let ctl = mock.add(handlers::record_ddl());

        let key = record().key();
        writer(&mock).mark_processed(&key).await.unwrap();

        let query = ctl.query().await;
        assert!(query.starts_with("INSERT INTO"), "{query}");
        assert!(query.contains("fundscope"));
        assert!(query.contains("FINAL"));
        assert!(query.contains(&format!("unhex('{}')", "42".repeat(32))));
        assert!(query.contains("log_index = 3"));
    }

    #[tokio::test]
    async fn max_block_number_of_empty_table_is_none() {
        let mock = Mock::new();
        mock.add(handlers::provide(vec![MaxBlock { block_number: 0 }]));
        assert_eq!(writer(&mock).max_block_number().await.unwrap(), None);
    }

    #[tokio::test]
    async fn max_block_number_returns_highest_block() {
        let mock = Mock::new();
        mock.add(handlers::provide(vec![MaxBlock { block_number: 650 }]));
        assert_eq!(writer(&mock).max_block_number().await.unwrap(), Some(650));
    }

    #[tokio::test]
    async fn event_counts_are_read_back() {
        let mock = Mock::new();
        let expected =
            vec![EventCountRow { event_name: "ContributionMade".into(), total: 2, processed: 1 }];
        mock.add(handlers::provide(expected.clone()));

        assert_eq!(writer(&mock).event_counts().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn ledger_rows_go_to_their_table() {
        let mock = Mock::new();
        let recorder = mock.add(handlers::record::<ContributionRow>());
        let row = ContributionRow {
            project_id: 7,
            contributor: AddressBytes([0xc0; 20]),
            amount: 1_000_000_000_000_000_000,
            tx_hash: HashBytes([0x42; 32]),
            log_index: 3,
            block_number: 650,
        };

        writer(&mock).insert_contribution(&row).await.unwrap();

        let rows: Vec<ContributionRow> = recorder.collect().await;
        assert_eq!(rows, vec![row]);
    }
}
