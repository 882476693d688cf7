//! # endpoint-store
//!
//! Record of the endpoint currently believed to belong to each node, keyed by
//! node name. Handlers reconcile the pool against this record, independent of
//! whether a node update went through.
#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use async_trait::async_trait;
use cidr_core::node::Endpoint;
use parking_lot::RwLock;
use tracing::trace;

#[async_trait]
pub trait EndpointStore: Send + Sync + 'static {
    // send/sync/static required for async trait bounds
    type Error: std::error::Error + Send + Sync + 'static;

    /// insert or overwrite the entry for `endpoint.name`
    async fn save(&self, endpoint: Endpoint) -> Result<(), Self::Error>;
    async fn get(&self, name: &str) -> Result<Option<Endpoint>, Self::Error>;
    /// remove the entry, missing entries are ignored
    async fn delete(&self, name: &str) -> Result<(), Self::Error>;
}

/// In-memory store. Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, Endpoint>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// all stored endpoints, sorted by name
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut all = self.inner.read().values().cloned().collect::<Vec<_>>();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

#[async_trait]
impl EndpointStore for MemoryStore {
    type Error = Infallible;

    async fn save(&self, endpoint: Endpoint) -> Result<(), Self::Error> {
        trace!(name = %endpoint.name, subnets = ?endpoint.subnets, "saving endpoint");
        self.inner.write().insert(endpoint.name.clone(), endpoint);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Endpoint>, Self::Error> {
        Ok(self.inner.read().get(name).cloned())
    }

    async fn delete(&self, name: &str) -> Result<(), Self::Error> {
        self.inner.write().remove(name);
        Ok(())
    }
}
