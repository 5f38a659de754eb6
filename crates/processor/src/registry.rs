use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use decoder::DecodedEvent;
use eyre::Result;
use storage::EventRecord;
use tracing::debug;

/// Handler for one or more event names.
#[async_trait]
pub trait EventProcessor: Send + Sync + std::fmt::Debug {
    /// Apply a persisted event. An error leaves the record unprocessed.
    async fn process(&self, record: &EventRecord, event: &DecodedEvent) -> Result<()>;
}

/// Outcome of [`ProcessorRegistry::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A processor ran and succeeded.
    Handled,
    /// No processor is registered for the event name.
    Skipped,
}

type Handlers = Arc<HashMap<String, Arc<dyn EventProcessor>>>;

/// Maps event names to processors.
///
/// Registration replaces the whole map; dispatch works on a snapshot.
#[derive(Debug, Default)]
pub struct ProcessorRegistry {
    handlers: RwLock<Handlers>,
}

impl ProcessorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route events named `event_name` to `handler`, replacing any previous handler.
    pub fn register(&self, event_name: &str, handler: Arc<dyn EventProcessor>) {
        let mut guard = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = HashMap::clone(&guard);
        next.insert(event_name.to_owned(), handler);
        *guard = Arc::new(next);
    }

    /// Whether a processor is registered for `event_name`.
    pub fn contains(&self, event_name: &str) -> bool {
        self.snapshot().contains_key(event_name)
    }

    /// Number of registered event names.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn snapshot(&self) -> Handlers {
        Arc::clone(&self.handlers.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Run the processor registered for the event's name.
    pub async fn dispatch(&self, record: &EventRecord, event: &DecodedEvent) -> Result<Dispatch> {
        let Some(handler) = self.snapshot().get(event.name()).cloned() else {
            debug!(
                event = event.name(),
                contract = %event.contract_name,
                "No processor registered, skipping"
            );
            return Ok(Dispatch::Skipped);
        };

        handler.process(record, event).await?;
        Ok(Dispatch::Handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use alloy::primitives::{Address, B256};
    use decoder::EventKind;
    use eyre::bail;

    #[derive(Debug, Default)]
    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EventProcessor for Counting {
        async fn process(&self, _: &EventRecord, _: &DecodedEvent) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("processor failed");
            }
            Ok(())
        }
    }

    fn event(name: &str) -> DecodedEvent {
        DecodedEvent {
            contract_name: "Crowdfunding".to_owned(),
            kind: EventKind::Known(name.to_owned()),
            fields: Vec::new(),
            tx_hash: B256::ZERO,
            block_number: 1,
            log_index: 0,
        }
    }

    #[tokio::test]
    async fn dispatch_routes_by_event_name() {
        let registry = ProcessorRegistry::new();
        let handler = Arc::new(Counting::default());
        registry.register("ContributionMade", Arc::clone(&handler) as Arc<dyn EventProcessor>);

        let event = event("ContributionMade");
        let record = EventRecord::from_decoded(&event, Address::ZERO);

        assert_eq!(registry.dispatch(&record, &event).await.unwrap(), Dispatch::Handled);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unmatched_event_is_skipped() {
        let registry = ProcessorRegistry::new();
        let event = event("Unknown");
        let record = EventRecord::from_decoded(&event, Address::ZERO);

        assert_eq!(registry.dispatch(&record, &event).await.unwrap(), Dispatch::Skipped);
    }

    #[tokio::test]
    async fn processor_errors_are_returned() {
        let registry = ProcessorRegistry::new();
        registry
            .register("RefundProcessed", Arc::new(Counting { fail: true, ..Default::default() }));

        let event = event("RefundProcessed");
        let record = EventRecord::from_decoded(&event, Address::ZERO);

        assert!(registry.dispatch(&record, &event).await.is_err());
    }

    #[test]
    fn register_replaces_existing_handler() {
        let registry = ProcessorRegistry::new();
        registry.register("A", Arc::new(Counting::default()));
        registry.register("A", Arc::new(Counting::default()));
        registry.register("B", Arc::new(Counting::default()));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("A"));
        assert!(!registry.contains("C"));
    }
}
