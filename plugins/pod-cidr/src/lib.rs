#![warn(
    missing_debug_implementations,
    // missing_docs, // we shall remove thee, someday!
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]
#![allow(clippy::cognitive_complexity)]

//! # pod-cidr
//!
//! The two subnet strategies. [`Allocatable`] owns node subnets: it hands out
//! blocks from the pool, records them on the node and releases them when the
//! node goes away. [`Raw`] is used when subnets are managed elsewhere and only
//! mirrors endpoints into the store.
//!
//! [`Handler`] picks one of them from config, once, at setup.

use cidr_core::{metrics, prelude::*};
use config::{CidrConfig, Strategy};
use endpoint_store::EndpointStore;
use subnet_pool::{MemoryPool, SubnetAllocator};

mod allocatable;
mod raw;
#[cfg(test)]
mod testing;

pub use allocatable::Allocatable;
pub use raw::Raw;

/// strategy selected for a cluster
#[derive(Debug)]
pub enum Handler<A, S, C> {
    Allocatable(Allocatable<A, S, C>),
    Raw(Raw<S>),
}

impl<S, C> Handler<MemoryPool, S, C>
where
    S: EndpointStore,
    C: NodeClient,
{
    /// build the strategy `cfg` asks for over an in-memory pool
    pub fn from_config(cfg: &CidrConfig, store: Arc<S>, client: Arc<C>) -> anyhow::Result<Self> {
        Self::from_config_with(cfg, store, client, |pool, block_prefix| {
            MemoryPool::new(pool, block_prefix).context("unable to build subnet pool")
        })
    }
}

impl<A, S, C> Handler<A, S, C>
where
    A: SubnetAllocator,
    S: EndpointStore,
    C: NodeClient,
{
    /// Build the strategy `cfg` asks for. `build_pool` gets the configured pool
    /// and block prefix and is only called in allocating mode.
    pub fn from_config_with<F>(
        cfg: &CidrConfig,
        store: Arc<S>,
        client: Arc<C>,
        build_pool: F,
    ) -> anyhow::Result<Self>
    where
        F: FnOnce(IpNet, u8) -> anyhow::Result<A>,
    {
        Ok(match cfg.strategy() {
            Strategy::Allocating { pool, block_prefix } => {
                let allocator = build_pool(pool, block_prefix)?;
                info!(%pool, block_prefix, "managing node subnets");
                let handler =
                    Allocatable::new(Arc::new(allocator), store, client, cfg.projection().clone());
                Handler::Allocatable(match cfg.persist_timeout() {
                    Some(timeout) => handler.with_persist_timeout(timeout),
                    None => handler,
                })
            }
            Strategy::Raw => {
                info!("node subnets managed externally, tracking endpoints only");
                Handler::Raw(Raw::new(store, cfg.projection().clone()))
            }
        })
    }

    /// rebuild pool state from nodes that already carry a subnet. Nothing to do
    /// for [`Raw`].
    pub async fn restore(&self, nodes: &[Node]) -> CidrResult<usize> {
        match self {
            Handler::Allocatable(handler) => handler.restore(nodes).await,
            Handler::Raw(_) => Ok(0),
        }
    }

    /// the pool, if this cluster allocates
    pub fn pool(&self) -> Option<&A> {
        match self {
            Handler::Allocatable(handler) => Some(handler.allocator()),
            Handler::Raw(_) => None,
        }
    }
}

#[async_trait]
impl<A, S, C> PodCidrHandler for Handler<A, S, C>
where
    A: SubnetAllocator,
    S: EndpointStore,
    C: NodeClient,
{
    async fn apply(&self, node: Node) -> CidrResult<()> {
        match self {
            Handler::Allocatable(handler) => handler.apply(node).await,
            Handler::Raw(handler) => handler.apply(node).await,
        }
    }

    async fn undo(&self, node_name: &str) -> CidrResult<()> {
        match self {
            Handler::Allocatable(handler) => handler.undo(node_name).await,
            Handler::Raw(handler) => handler.undo(node_name).await,
        }
    }
}

pub(crate) async fn save_endpoint<S: EndpointStore>(store: &S, endpoint: Endpoint) -> CidrResult<()> {
    let name = endpoint.name.clone();
    store.save(endpoint).await.map_err(|err| {
        error!(node = %name, ?err, "failed to save endpoint");
        CidrError::store(err)
    })?;
    metrics::ENDPOINT_SAVES.inc();
    Ok(())
}
