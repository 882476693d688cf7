//! The capability both subnet strategies implement, and the node persistence
//! seam they write through.
use async_trait::async_trait;

use crate::{error::CidrResult, node::Node};

/// Reconcile subnet state for a node. Called by an external loop with at most
/// one call in flight per node name; calls for different nodes may run
/// concurrently.
#[async_trait]
pub trait PodCidrHandler: Send + Sync + 'static {
    /// ensure `node` holds a valid subnet and its endpoint is stored
    ///
    /// CANCEL-SAFETY: dropping the returned future must not leak a block
    /// obtained during this call.
    async fn apply(&self, node: Node) -> CidrResult<()>;

    /// release whatever the node held. Removing an unknown node is a no-op.
    async fn undo(&self, node_name: &str) -> CidrResult<()>;
}

/// Writes a node's metadata back to the authoritative cluster state
#[async_trait]
pub trait NodeClient: Send + Sync + 'static {
    // send/sync/static required for async trait bounds
    /// client error, e.g. conflict, timeout or transport failure
    type Error: std::error::Error + Send + Sync + 'static;

    /// persist the node's annotations
    async fn update(&self, node: &Node) -> Result<(), Self::Error>;
}
