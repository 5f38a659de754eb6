//! Ledger processors for the crowdfunding contract events

use std::{fmt, sync::Arc};

use alloy::primitives::Address;
use async_trait::async_trait;
use decoder::{DecodedEvent, FieldValue};
use eyre::{OptionExt, Result, bail, eyre};
use storage::{
    ClickhouseWriter, ContributionRow, EventRecord, ProjectCreatedRow, ProjectStatusRow, RefundRow,
};
use tracing::info;

use crate::{EventProcessor, ProcessorRegistry};

const PROJECT_CREATED: &str = "ProjectCreated";
const PROJECT_STATUS_CHANGED: &str = "ProjectStatusChanged";
const CONTRIBUTION_MADE: &str = "ContributionMade";
const REFUND_PROCESSED: &str = "RefundProcessed";

/// Lifecycle state of a crowdfunding project as emitted on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectStatus {
    /// Created, not yet open for contributions
    Pending,
    /// Accepting contributions
    Active,
    /// Goal reached
    Success,
    /// Deadline passed without reaching the goal
    Failed,
    /// Withdrawn by the creator
    Cancelled,
}

impl TryFrom<u8> for ProjectStatus {
    type Error = eyre::Report;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::Pending,
            1 => Self::Active,
            2 => Self::Success,
            3 => Self::Failed,
            4 => Self::Cancelled,
            other => bail!("unknown project status {other}"),
        })
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Active => "Active",
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Writes crowdfunding events to their ledger tables.
///
/// Without a writer (dry run) events are only logged.
#[derive(Debug, Clone)]
pub struct CrowdfundingProcessor {
    writer: Option<ClickhouseWriter>,
}

impl CrowdfundingProcessor {
    /// Create a processor; `None` disables database writes.
    pub const fn new(writer: Option<ClickhouseWriter>) -> Self {
        Self { writer }
    }
}

/// Register a [`CrowdfundingProcessor`] for every crowdfunding event name.
pub fn register_crowdfunding(registry: &ProcessorRegistry, writer: Option<ClickhouseWriter>) {
    let processor: Arc<dyn EventProcessor> = Arc::new(CrowdfundingProcessor::new(writer));
    for name in [PROJECT_CREATED, PROJECT_STATUS_CHANGED, CONTRIBUTION_MADE, REFUND_PROCESSED] {
        registry.register(name, Arc::clone(&processor));
    }
}

#[async_trait]
impl EventProcessor for CrowdfundingProcessor {
    async fn process(&self, record: &EventRecord, event: &DecodedEvent) -> Result<()> {
        let tx_hash = record.tx_hash;
        let log_index = record.log_index;
        let block_number = record.block_number;

        match event.name() {
            PROJECT_CREATED => {
                let row = ProjectCreatedRow {
                    project_id: u64_field(event, "projectId")?,
                    title: string_field(event, "title")?,
                    target_amount: u128_field(event, "targetAmount")?,
                    creator: address_field(event, "creator")?.into(),
                    tx_hash,
                    log_index,
                    block_number,
                };
                let Some(writer) = &self.writer else {
                    info!(
                        project_id = row.project_id,
                        title = %row.title,
                        "Dry run: project created"
                    );
                    return Ok(());
                };
                writer.insert_project_created(&row).await?;
                info!(project_id = row.project_id, block_number, "Recorded project creation");
            }
            PROJECT_STATUS_CHANGED => {
                let project_id = u64_field(event, "projectId")?;
                let raw = field(event, "status")?
                    .as_u64()
                    .and_then(|status| u8::try_from(status).ok())
                    .ok_or_eyre("field status is not a small unsigned integer")?;
                let status = ProjectStatus::try_from(raw)?;
                let Some(writer) = &self.writer else {
                    info!(project_id, %status, "Dry run: project status changed");
                    return Ok(());
                };
                let row = ProjectStatusRow {
                    project_id,
                    status: raw,
                    status_name: status.to_string(),
                    tx_hash,
                    log_index,
                    block_number,
                };
                writer.insert_project_status(&row).await?;
                info!(project_id, %status, block_number, "Recorded project status change");
            }
            CONTRIBUTION_MADE => {
                let row = ContributionRow {
                    project_id: u64_field(event, "projectId")?,
                    contributor: address_field(event, "contributor")?.into(),
                    amount: u128_field(event, "amount")?,
                    tx_hash,
                    log_index,
                    block_number,
                };
                let Some(writer) = &self.writer else {
                    info!(
                        project_id = row.project_id,
                        amount = row.amount,
                        "Dry run: contribution"
                    );
                    return Ok(());
                };
                writer.insert_contribution(&row).await?;
                info!(
                    project_id = row.project_id,
                    amount = row.amount,
                    block_number,
                    "Recorded contribution"
                );
            }
            REFUND_PROCESSED => {
                let row = RefundRow {
                    project_id: u64_field(event, "projectId")?,
                    refundee: address_field(event, "refundee")?.into(),
                    amount: u128_field(event, "amount")?,
                    reason: string_field(event, "reason")?,
                    tx_hash,
                    log_index,
                    block_number,
                };
                let Some(writer) = &self.writer else {
                    info!(project_id = row.project_id, amount = row.amount, "Dry run: refund");
                    return Ok(());
                };
                writer.insert_refund(&row).await?;
                info!(
                    project_id = row.project_id,
                    amount = row.amount,
                    block_number,
                    "Recorded refund"
                );
            }
            other => bail!("crowdfunding processor cannot handle {other}"),
        }
        Ok(())
    }
}

fn field<'a>(event: &'a DecodedEvent, name: &str) -> Result<&'a FieldValue> {
    event.field(name).ok_or_else(|| eyre!("{} is missing field {name}", event.name()))
}

fn u64_field(event: &DecodedEvent, name: &str) -> Result<u64> {
    field(event, name)?.as_u64().ok_or_else(|| eyre!("field {name} is not a u64"))
}

fn u128_field(event: &DecodedEvent, name: &str) -> Result<u128> {
    field(event, name)?
        .as_u256()
        .and_then(|value| u128::try_from(value).ok())
        .ok_or_else(|| eyre!("field {name} is not a u128"))
}

fn address_field(event: &DecodedEvent, name: &str) -> Result<Address> {
    field(event, name)?.as_address().ok_or_else(|| eyre!("field {name} is not an address"))
}

fn string_field(event: &DecodedEvent, name: &str) -> Result<String> {
    field(event, name)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| eyre!("field {name} is not a string"))
}
