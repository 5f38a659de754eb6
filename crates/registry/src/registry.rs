use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

use alloy::primitives::Address;
use chainio::ChainClient;
use futures::future::join_all;
use tracing::{info, warn};

use crate::{ContractHandle, RegistryError, parse_abi, probe::find_deploy_block};

type Snapshot = Arc<BTreeMap<String, Arc<ContractHandle>>>;

/// Contracts monitored on one chain.
///
/// The map is swapped as a whole on every change, so readers holding a snapshot never see a
/// partially updated set.
#[derive(Debug, Default)]
pub struct ContractRegistry {
    contracts: RwLock<Snapshot>,
}

impl ContractRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.contracts.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Register a contract from its configured address and ABI document.
    pub fn register(
        &self,
        name: &str,
        address: &str,
        abi_source: &str,
        deploy_block: u64,
    ) -> Result<Arc<ContractHandle>, RegistryError> {
        let parsed: Address = address.parse().map_err(|_| RegistryError::InvalidAddress {
            name: name.to_owned(),
            address: address.to_owned(),
        })?;
        let abi = parse_abi(abi_source).map_err(|err| RegistryError::InvalidAbi {
            name: name.to_owned(),
            reason: err.to_string(),
        })?;

        let handle = Arc::new(ContractHandle::new(name.to_owned(), parsed, abi, deploy_block));

        let mut guard = self.contracts.write().unwrap_or_else(PoisonError::into_inner);
        if guard.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_owned()));
        }
        if guard.values().any(|existing| existing.address() == parsed) {
            return Err(RegistryError::Duplicate(address.to_owned()));
        }
        let mut next = BTreeMap::clone(&guard);
        next.insert(name.to_owned(), Arc::clone(&handle));
        *guard = Arc::new(next);
        drop(guard);

        info!(
            contract = name,
            address = %parsed,
            deploy_block,
            events = handle.abi().events().count(),
            "Registered contract"
        );
        Ok(handle)
    }

    /// Look up a contract by name.
    pub fn by_name(&self, name: &str) -> Result<Arc<ContractHandle>, RegistryError> {
        self.snapshot().get(name).cloned().ok_or_else(|| RegistryError::NotFound(name.to_owned()))
    }

    /// Look up a contract by address.
    pub fn by_address(&self, address: Address) -> Option<Arc<ContractHandle>> {
        self.snapshot().values().find(|handle| handle.address() == address).cloned()
    }

    /// Copy of all registered contracts, ordered by name.
    pub fn all(&self) -> Vec<Arc<ContractHandle>> {
        self.snapshot().values().cloned().collect()
    }

    /// Number of registered contracts.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether no contract is registered.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Smallest known deployment block, ignoring contracts whose block is unknown.
    pub fn min_deploy_block(&self) -> Option<u64> {
        self.snapshot().values().map(|handle| handle.deploy_block()).filter(|b| *b > 0).min()
    }

    /// Probe the deployment block of every contract that does not know it yet.
    ///
    /// Probes run concurrently. Failures are logged and leave the block at 0. Returns how many
    /// contracts were resolved.
    pub async fn resolve_deploy_blocks(&self, chain: &dyn ChainClient, lookback: u64) -> usize {
        let pending: Vec<_> =
            self.all().into_iter().filter(|handle| handle.deploy_block() == 0).collect();
        if pending.is_empty() {
            return 0;
        }

        let head = match chain.head_block_number().await {
            Ok(head) => head,
            Err(err) => {
                warn!(err = %err, "Cannot read head, deployment blocks stay unknown");
                return 0;
            }
        };

        let probes = pending.iter().map(|handle| async move {
            match find_deploy_block(chain, handle.address(), head, lookback).await {
                Ok(Some(block)) => {
                    handle.set_deploy_block(block);
                    info!(
                        contract = handle.name(),
                        deploy_block = block,
                        "Resolved deployment block"
                    );
                    true
                }
                Ok(None) => {
                    warn!(
                        contract = handle.name(),
                        head,
                        lookback,
                        "Deployment block not found in lookback window"
                    );
                    false
                }
                Err(err) => {
                    warn!(contract = handle.name(), err = %err, "Deployment block probe failed");
                    false
                }
            }
        });

        join_all(probes).await.into_iter().filter(|resolved| *resolved).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy::primitives::Bytes;
    use async_trait::async_trait;
    use chainio::{ChainError, RawLog};

    const ABI: &str = include_str!("../../../abi/Crowdfunding.json");
    const ADDR_A: &str = "0x00000000000000000000000000000000000000aa";
    const ADDR_B: &str = "0x00000000000000000000000000000000000000bb";

    #[derive(Debug)]
    struct Chain {
        head: u64,
        deployed_at: u64,
    }

    #[async_trait]
    impl ChainClient for Chain {
        async fn head_block_number(&self) -> Result<u64, ChainError> {
            Ok(self.head)
        }

        async fn filter_logs(
            &self,
            _: &[Address],
            _: u64,
            _: u64,
        ) -> Result<Vec<RawLog>, ChainError> {
            Ok(Vec::new())
        }

        async fn code_at(&self, _: Address, block_number: u64) -> Result<Bytes, ChainError> {
            if block_number >= self.deployed_at {
                Ok(Bytes::from_static(&[0x60]))
            } else {
                Ok(Bytes::new())
            }
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = ContractRegistry::new();
        let handle = registry.register("Crowdfunding", ADDR_A, ABI, 100).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.by_name("Crowdfunding").unwrap().address(), handle.address());
        assert!(registry.by_address(handle.address()).is_some());
        assert!(matches!(registry.by_name("Other"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let registry = ContractRegistry::new();
        assert!(matches!(
            registry.register("A", "0x1234", ABI, 0),
            Err(RegistryError::InvalidAddress { .. })
        ));
        assert!(matches!(
            registry.register("A", ADDR_A, "{}", 0),
            Err(RegistryError::InvalidAbi { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicates_are_rejected() {
        let registry = ContractRegistry::new();
        registry.register("A", ADDR_A, ABI, 0).unwrap();
        assert!(matches!(registry.register("A", ADDR_B, ABI, 0), Err(RegistryError::Duplicate(_))));
        assert!(matches!(registry.register("B", ADDR_A, ABI, 0), Err(RegistryError::Duplicate(_))));
    }

    #[test]
    fn snapshots_are_not_affected_by_later_registrations() {
        let registry = ContractRegistry::new();
        registry.register("A", ADDR_A, ABI, 0).unwrap();
        let before = registry.all();

        registry.register("B", ADDR_B, ABI, 0).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(registry.all().len(), 2);
    }

    #[test]
    fn min_deploy_block_ignores_unknown() {
        let registry = ContractRegistry::new();
        assert_eq!(registry.min_deploy_block(), None);

        registry.register("A", ADDR_A, ABI, 0).unwrap();
        assert_eq!(registry.min_deploy_block(), None);

        registry.register("B", ADDR_B, ABI, 250).unwrap();
        assert_eq!(registry.min_deploy_block(), Some(250));
    }

    #[tokio::test]
    async fn resolves_only_unknown_deploy_blocks() {
        let registry = ContractRegistry::new();
        registry.register("A", ADDR_A, ABI, 0).unwrap();
        registry.register("B", ADDR_B, ABI, 42).unwrap();

        let resolved =
            registry.resolve_deploy_blocks(&Chain { head: 700, deployed_at: 400 }, 1000).await;

        assert_eq!(resolved, 1);
        assert_eq!(registry.by_name("A").unwrap().deploy_block(), 400);
        assert_eq!(registry.by_name("B").unwrap().deploy_block(), 42);
    }
}
