//! fakes for handler tests
use std::time::Duration;

use async_trait::async_trait;
use cidr_core::{
    handler::NodeClient,
    node::{Endpoint, Node},
};
use endpoint_store::{EndpointStore, MemoryStore};
use ipnet::IpNet;
use parking_lot::Mutex;
use subnet_pool::{MemoryPool, PoolError, SubnetAllocator};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ClientError {
    #[error("conflict updating node {0}")]
    Conflict(String),
}

#[derive(Debug, Error)]
#[error("backend unavailable")]
pub(crate) struct Unavailable;

/// accepts every update and remembers it
#[derive(Debug, Default)]
pub(crate) struct RecordingClient {
    updates: Mutex<Vec<Node>>,
}

impl RecordingClient {
    pub(crate) fn updates(&self) -> Vec<Node> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl NodeClient for RecordingClient {
    type Error = ClientError;

    async fn update(&self, node: &Node) -> Result<(), Self::Error> {
        self.updates.lock().push(node.clone());
        Ok(())
    }
}

/// rejects every update
#[derive(Debug)]
pub(crate) struct FailingClient;

#[async_trait]
impl NodeClient for FailingClient {
    type Error = ClientError;

    async fn update(&self, node: &Node) -> Result<(), Self::Error> {
        Err(ClientError::Conflict(node.name.clone()))
    }
}

/// takes this long to accept an update
#[derive(Debug)]
pub(crate) struct SlowClient(pub(crate) Duration);

#[async_trait]
impl NodeClient for SlowClient {
    type Error = ClientError;

    async fn update(&self, _node: &Node) -> Result<(), Self::Error> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }
}

/// a pool whose reclaim always fails
#[derive(Debug)]
pub(crate) struct UnreclaimablePool(MemoryPool);

impl UnreclaimablePool {
    pub(crate) fn new() -> Self {
        Self(MemoryPool::new("10.0.0.0/16".parse().unwrap(), 24).unwrap())
    }
}

#[async_trait]
impl SubnetAllocator for UnreclaimablePool {
    type Error = PoolError;

    fn contains(&self, subnet: &IpNet) -> bool {
        self.0.contains(subnet)
    }

    async fn free_block(&self, hint: &str) -> Result<Option<IpNet>, Self::Error> {
        self.0.free_block(hint).await
    }

    async fn reclaim(&self, subnet: &IpNet) -> Result<bool, Self::Error> {
        Err(PoolError::OutOfPool(*subnet))
    }

    async fn record(&self, subnet: &IpNet, owner: &str) -> Result<(), Self::Error> {
        self.0.record(subnet, owner).await
    }
}

/// a pool whose backend is down, only `contains` works
#[derive(Debug)]
pub(crate) struct BrokenPool(MemoryPool);

impl BrokenPool {
    pub(crate) fn new() -> Self {
        Self(MemoryPool::new("10.0.0.0/16".parse().unwrap(), 24).unwrap())
    }
}

#[async_trait]
impl SubnetAllocator for BrokenPool {
    type Error = Unavailable;

    fn contains(&self, subnet: &IpNet) -> bool {
        self.0.contains(subnet)
    }

    async fn free_block(&self, _hint: &str) -> Result<Option<IpNet>, Self::Error> {
        Err(Unavailable)
    }

    async fn reclaim(&self, _subnet: &IpNet) -> Result<bool, Self::Error> {
        Err(Unavailable)
    }

    async fn record(&self, _subnet: &IpNet, _owner: &str) -> Result<(), Self::Error> {
        Err(Unavailable)
    }
}

/// store operations a [`FailingStore`] rejects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreOp {
    Save,
    Get,
    Delete,
}

/// in-memory store that rejects one kind of operation
#[derive(Debug)]
pub(crate) struct FailingStore {
    inner: MemoryStore,
    fails: StoreOp,
}

impl FailingStore {
    pub(crate) fn new(fails: StoreOp) -> Self {
        Self {
            inner: MemoryStore::new(),
            fails,
        }
    }

    /// the backing store, bypassing failures
    pub(crate) fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self, op: StoreOp) -> Result<(), Unavailable> {
        if self.fails == op {
            Err(Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EndpointStore for FailingStore {
    type Error = Unavailable;

    async fn save(&self, endpoint: Endpoint) -> Result<(), Self::Error> {
        self.check(StoreOp::Save)?;
        self.inner.save(endpoint).await.map_err(|never| match never {})
    }

    async fn get(&self, name: &str) -> Result<Option<Endpoint>, Self::Error> {
        self.check(StoreOp::Get)?;
        self.inner.get(name).await.map_err(|never| match never {})
    }

    async fn delete(&self, name: &str) -> Result<(), Self::Error> {
        self.check(StoreOp::Delete)?;
        self.inner.delete(name).await.map_err(|never| match never {})
    }
}
