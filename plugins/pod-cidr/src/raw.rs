use std::fmt;

use cidr_core::prelude::*;
use endpoint_store::EndpointStore;

use crate::save_endpoint;

/// Node subnets are owned by something else; mirror nodes into the store and
/// never touch a pool.
pub struct Raw<S> {
    store: Arc<S>,
    projection: EndpointProjection,
}

impl<S> fmt::Debug for Raw<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raw")
            .field("projection", &self.projection)
            .finish()
    }
}

impl<S: EndpointStore> Raw<S> {
    pub fn new(store: Arc<S>, projection: EndpointProjection) -> Self {
        Self { store, projection }
    }
}

#[async_trait]
impl<S: EndpointStore> PodCidrHandler for Raw<S> {
    #[instrument(level = "debug", skip_all, fields(node = %node.name))]
    async fn apply(&self, node: Node) -> CidrResult<()> {
        save_endpoint(self.store.as_ref(), self.projection.project(&node)).await
    }

    async fn undo(&self, _node_name: &str) -> CidrResult<()> {
        Ok(())
    }
}
