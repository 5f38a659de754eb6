//! Schema definitions for ClickHouse tables

/// Table schema definition
#[derive(Debug)]
pub struct TableSchema {
    /// Table name
    pub name: &'static str,
    /// Column definitions
    pub columns: &'static str,
    /// Table engine
    pub engine: &'static str,
    /// Sorting key; doubles as the deduplication key for `ReplacingMergeTree`
    pub order_by: &'static str,
}

/// Names of all tables
pub const TABLES: &[&str] =
    &["events", "projects_created", "project_status_changes", "contributions", "refunds"];

/// Schema definitions for tables
pub const TABLE_SCHEMAS: &[TableSchema] = &[
    TableSchema {
        name: "events",
        columns: "tx_hash FixedString(32),
                 log_index UInt64,
                 block_number UInt64,
                 contract_address FixedString(20),
                 contract_name String,
                 event_name LowCardinality(String),
                 fields String,
                 processed Bool,
                 version UInt64,
                 inserted_at DateTime64(3) DEFAULT now64()",
        engine: "ReplacingMergeTree(version)",
        order_by: "tx_hash, log_index",
    },
    TableSchema {
        name: "projects_created",
        columns: "project_id UInt64,
                 title String,
                 target_amount UInt128,
                 creator FixedString(20),
                 tx_hash FixedString(32),
                 log_index UInt64,
                 block_number UInt64,
                 inserted_at DateTime64(3) DEFAULT now64()",
        engine: "ReplacingMergeTree()",
        order_by: "tx_hash, log_index",
    },
    TableSchema {
        name: "project_status_changes",
        columns: "project_id UInt64,
                 status UInt8,
                 status_name LowCardinality(String),
                 tx_hash FixedString(32),
                 log_index UInt64,
                 block_number UInt64,
                 inserted_at DateTime64(3) DEFAULT now64()",
        engine: "ReplacingMergeTree()",
        order_by: "tx_hash, log_index",
    },
    TableSchema {
        name: "contributions",
        columns: "project_id UInt64,
                 contributor FixedString(20),
                 amount UInt128,
                 tx_hash FixedString(32),
                 log_index UInt64,
                 block_number UInt64,
                 inserted_at DateTime64(3) DEFAULT now64()",
        engine: "ReplacingMergeTree()",
        order_by: "tx_hash, log_index",
    },
    TableSchema {
        name: "refunds",
        columns: "project_id UInt64,
                 refundee FixedString(20),
                 amount UInt128,
                 reason String,
                 tx_hash FixedString(32),
                 log_index UInt64,
                 block_number UInt64,
                 inserted_at DateTime64(3) DEFAULT now64()",
        engine: "ReplacingMergeTree()",
        order_by: "tx_hash, log_index",
    },
];
