//! Errors a [`PodCidrHandler`] reports back to its caller.
//!
//! An invalid subnet claim on a node is not an error: it is handled by
//! allocating a new block. Everything here is safe to retry from scratch.
//!
//! [`PodCidrHandler`]: crate::handler::PodCidrHandler
use ipnet::IpNet;
use thiserror::Error;

/// Error returned from `apply`/`undo`
#[derive(Debug, Error)]
pub enum CidrError {
    /// The pool has no free block left. The node was not modified.
    #[error("no free subnet block available for node {node}")]
    AllocatorExhausted {
        /// node that asked for a block
        node: String,
    },
    /// Recording the subnet on the node failed, timed out or was cancelled.
    /// The block obtained for it has already been handed back to the pool.
    #[error("failed to record subnet {subnet} on node {node}")]
    Persistence {
        /// node being updated
        node: String,
        /// block that was being recorded
        subnet: IpNet,
        /// underlying client error
        #[source]
        source: anyhow::Error,
    },
    /// The allocator itself failed (not exhaustion)
    #[error("subnet allocator error")]
    Allocator(#[source] anyhow::Error),
    /// The endpoint store failed
    #[error("endpoint store error")]
    Store(#[source] anyhow::Error),
}

impl CidrError {
    /// wrap an allocator backend error
    pub fn allocator<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CidrError::Allocator(anyhow::Error::new(err))
    }

    /// wrap an endpoint store backend error
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CidrError::Store(anyhow::Error::new(err))
    }

    /// true if the pool ran out of blocks
    pub fn is_exhausted(&self) -> bool {
        matches!(self, CidrError::AllocatorExhausted { .. })
    }

    /// true if the node update failed
    pub fn is_persistence(&self) -> bool {
        matches!(self, CidrError::Persistence { .. })
    }
}

/// Shorthand result alias for handler operations
pub type CidrResult<T> = Result<T, CidrError>;
