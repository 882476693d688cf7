use std::{collections::HashMap, fmt, time::Duration};

use cidr_core::{metrics, prelude::*};
use endpoint_store::EndpointStore;
use parking_lot::Mutex;
use subnet_pool::SubnetAllocator;

use crate::save_endpoint;

/// Allocates one block per node from the pool, records it in the node's
/// annotations and mirrors the node into the endpoint store.
pub struct Allocatable<A, S, C> {
    allocator: Arc<A>,
    store: Arc<S>,
    client: Arc<C>,
    projection: EndpointProjection,
    persist_timeout: Option<Duration>,
    /// nodes whose claimed block `restore` found held by another node
    conflicts: Mutex<HashMap<String, IpNet>>,
}

impl<A, S, C> fmt::Debug for Allocatable<A, S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocatable")
            .field("projection", &self.projection)
            .field("persist_timeout", &self.persist_timeout)
            .field("conflicts", &self.conflicts.lock().len())
            .finish()
    }
}

impl<A, S, C> Allocatable<A, S, C>
where
    A: SubnetAllocator,
    S: EndpointStore,
    C: NodeClient,
{
    pub fn new(
        allocator: Arc<A>,
        store: Arc<S>,
        client: Arc<C>,
        projection: EndpointProjection,
    ) -> Self {
        Self {
            allocator,
            store,
            client,
            projection,
            persist_timeout: None,
            conflicts: Mutex::new(HashMap::new()),
        }
    }

    /// node updates running longer than `timeout` are treated as failed
    pub fn with_persist_timeout(mut self, timeout: Duration) -> Self {
        self.persist_timeout = Some(timeout);
        self
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// A claim is valid when it is non-empty and every entry parses and is one
    /// of the pool's blocks.
    fn is_valid_claim(&self, subnets: &[String]) -> bool {
        !subnets.is_empty()
            && subnets.iter().all(|cidr| match parse_subnet(cidr) {
                Some(subnet) => self.allocator.contains(&subnet),
                None => false,
            })
    }

    /// block of `node`'s claim that `restore` gave to another node, if any
    fn conflicting_block(&self, node: &str, subnets: &[String]) -> Option<IpNet> {
        let held = self.conflicts.lock().get(node).copied()?;
        subnets
            .iter()
            .filter_map(|cidr| parse_subnet(cidr))
            .any(|subnet| subnet == held)
            .then_some(held)
    }

    async fn allocate(&self, mut node: Node) -> CidrResult<()> {
        debug!("node needs subnet allocation");
        let subnet = match self.allocator.free_block(&node.name).await {
            Ok(Some(subnet)) => subnet,
            Ok(None) => {
                metrics::SUBNET_ALLOCATION_FAILURES.inc();
                error!("no free subnet block left in pool");
                return Err(CidrError::AllocatorExhausted { node: node.name });
            }
            Err(err) => {
                metrics::SUBNET_ALLOCATION_FAILURES.inc();
                error!(?err, "failed to allocate subnet for node");
                return Err(CidrError::allocator(err));
            }
        };
        metrics::SUBNET_ALLOCATIONS.inc();
        debug!(%subnet, "subnet allocated to node");
        let reservation = Reservation::new(Arc::clone(&self.allocator), subnet);

        // one subnet per node, any previous (invalid) value is replaced
        node.set_annotation(self.projection.subnets_key(), subnet.to_string());

        if let Err(err) = self.persist(&node).await {
            metrics::NODE_PERSIST_FAILURES.inc();
            error!(%subnet, ?err, "failed to record node subnet allocation");
            reservation.rollback().await;
            return Err(CidrError::Persistence {
                node: node.name,
                subnet,
                source: err,
            });
        }
        reservation.commit();
        info!(%subnet, "subnet recorded on node");

        save_endpoint(self.store.as_ref(), self.projection.project(&node)).await
    }

    async fn persist(&self, node: &Node) -> anyhow::Result<()> {
        let update = self.client.update(node);
        match self.persist_timeout {
            Some(timeout) => tokio::time::timeout(timeout, update)
                .await
                .map_err(|_| anyhow::anyhow!("node update timed out after {timeout:?}"))?
                .map_err(anyhow::Error::new),
            None => update.await.map_err(anyhow::Error::new),
        }
    }

    /// Record the subnets of nodes that already hold a valid claim, and store
    /// their endpoints. Used after a restart, before any `apply`. Nodes with an
    /// invalid claim are left for `apply`. A block claimed by two nodes is only
    /// restored for the first one seen; the others are remembered and get a
    /// new block on their next `apply`.
    /// Returns the number of nodes restored.
    #[instrument(level = "debug", skip_all)]
    pub async fn restore(&self, nodes: &[Node]) -> CidrResult<usize> {
        let mut restored = 0;
        'nodes: for node in nodes {
            let endpoint = self.projection.project(node);
            if !self.is_valid_claim(&endpoint.subnets) {
                trace!(node = %node.name, subnets = ?endpoint.subnets, "no valid claim to restore");
                continue;
            }
            let mut recorded = Vec::with_capacity(endpoint.subnets.len());
            for subnet in endpoint.subnets.iter().filter_map(|cidr| parse_subnet(cidr)) {
                if let Err(err) = self.allocator.record(&subnet, &node.name).await {
                    warn!(node = %node.name, %subnet, ?err, "unable to restore subnet, skipping node");
                    self.conflicts.lock().insert(node.name.clone(), subnet);
                    // the node will be moved to a new block, don't keep half its claim
                    for subnet in recorded {
                        reclaim(self.allocator.as_ref(), subnet).await;
                    }
                    continue 'nodes;
                }
                recorded.push(subnet);
            }
            save_endpoint(self.store.as_ref(), endpoint).await?;
            restored += 1;
        }
        info!(restored, total = nodes.len(), "restored node subnets");
        Ok(restored)
    }
}

#[async_trait]
impl<A, S, C> PodCidrHandler for Allocatable<A, S, C>
where
    A: SubnetAllocator,
    S: EndpointStore,
    C: NodeClient,
{
    #[instrument(level = "debug", skip_all, fields(node = %node.name))]
    async fn apply(&self, node: Node) -> CidrResult<()> {
        let current = self.projection.project(&node);

        if !self.is_valid_claim(&current.subnets) {
            self.allocate(node).await
        } else if let Some(held) = self.conflicting_block(&node.name, &current.subnets) {
            debug!(subnet = %held, "claimed block belongs to another node");
            self.allocate(node).await
        } else {
            trace!(subnets = ?current.subnets, "node holds a valid claim");
            save_endpoint(self.store.as_ref(), current).await
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn undo(&self, node_name: &str) -> CidrResult<()> {
        self.conflicts.lock().remove(node_name);
        let Some(endpoint) = self.store.get(node_name).await.map_err(CidrError::store)? else {
            trace!("no endpoint stored for node");
            return Ok(());
        };
        // delete first so the store never points at a block that was already freed
        self.store
            .delete(node_name)
            .await
            .map_err(CidrError::store)?;
        debug!(?endpoint, "endpoint deleted from store");

        for cidr in &endpoint.subnets {
            match parse_subnet(cidr) {
                Some(subnet) => reclaim(self.allocator.as_ref(), subnet).await,
                None => warn!(subnet = %cidr, "invalid subnet, skip reclaiming it"),
            }
        }
        Ok(())
    }
}

/// parse a CIDR, dropping any host bits
fn parse_subnet(cidr: &str) -> Option<IpNet> {
    cidr.parse::<IpNet>().ok().map(|net| net.trunc())
}

/// best-effort, failures are logged and not retried
async fn reclaim<A: SubnetAllocator>(allocator: &A, subnet: IpNet) {
    match allocator.reclaim(&subnet).await {
        Ok(true) => {
            metrics::SUBNET_RECLAIMS.inc();
            debug!(%subnet, "subnet is reclaimed");
        }
        Ok(false) => debug!(%subnet, "subnet was not allocated, nothing to reclaim"),
        Err(err) => warn!(%subnet, ?err, "failed to reclaim subnet, block is leaked"),
    }
}

/// A block taken from the pool for a node update that hasn't landed yet.
/// Exactly one of `commit`/`rollback` ends it; if neither runs because the
/// `apply` future was dropped, the block is reclaimed on the current runtime.
struct Reservation<A: SubnetAllocator> {
    allocator: Arc<A>,
    subnet: IpNet,
    armed: bool,
}

impl<A: SubnetAllocator> Reservation<A> {
    fn new(allocator: Arc<A>, subnet: IpNet) -> Self {
        Self {
            allocator,
            subnet,
            armed: true,
        }
    }

    /// the node update landed, the block stays allocated
    fn commit(mut self) {
        self.armed = false;
    }

    /// hand the block back
    async fn rollback(mut self) {
        reclaim(self.allocator.as_ref(), self.subnet).await;
        self.armed = false;
    }
}

impl<A: SubnetAllocator> Drop for Reservation<A> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let subnet = self.subnet;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(%subnet, "node update abandoned, reclaiming subnet");
                let allocator = Arc::clone(&self.allocator);
                handle.spawn(async move { reclaim(allocator.as_ref(), subnet).await });
            }
            Err(_) => error!(%subnet, "node update abandoned outside a runtime, subnet is leaked"),
        }
    }
}
