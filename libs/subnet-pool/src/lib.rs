//! # subnet-pool
//!
//! `subnet-pool` defines a trait `SubnetAllocator` that hands out fixed-size
//! blocks carved from a single pool CIDR, takes them back, and answers whether
//! a given network is one of its blocks.
//!
//! Implementations are shared between concurrent node reconciliations, so every
//! method must be atomic with respect to the others.
//!
//! [`SubnetAllocator`]: crate::SubnetAllocator
#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

use async_trait::async_trait;
use ipnet::IpNet;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryPool;

#[async_trait]
pub trait SubnetAllocator: Send + Sync + 'static {
    // send/sync/static required for async trait bounds
    type Error: std::error::Error + Send + Sync + 'static;

    /// is `subnet` exactly one of this pool's blocks
    fn contains(&self, subnet: &IpNet) -> bool;

    /// take a free block. `hint` is the name of the node asking, implementations
    /// may use it to hand back the same block a node held before.
    /// Returns
    ///     Ok(None) if the pool is exhausted
    ///     Ok(Some(block)) block is now allocated
    async fn free_block(&self, hint: &str) -> Result<Option<IpNet>, Self::Error>;

    /// return a block to the pool. A block that isn't allocated is ignored.
    /// Returns
    ///     Ok(true) the block was allocated and is free again
    ///     Ok(false) nothing to do
    async fn reclaim(&self, subnet: &IpNet) -> Result<bool, Self::Error>;

    /// mark a block that is already assigned to `owner` as allocated, used to
    /// rebuild pool state from existing node records
    async fn record(&self, subnet: &IpNet, owner: &str) -> Result<(), Self::Error>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("block prefix /{prefix} is not valid for pool {pool}")]
    InvalidPrefix { pool: IpNet, prefix: u8 },
    #[error("{0} is not a block of this pool")]
    OutOfPool(IpNet),
    #[error("block {subnet} is already allocated to {owner}")]
    Conflict { subnet: IpNet, owner: String },
}

/// number of `prefix` sized blocks in `pool`, saturating at `u128::MAX`
pub fn block_count(pool: &IpNet, prefix: u8) -> u128 {
    let bits = prefix.saturating_sub(pool.prefix_len()) as u32;
    1u128.checked_shl(bits).unwrap_or(u128::MAX)
}

/// true if `subnet` is a `prefix` sized, aligned block within `pool`
pub fn is_block_of(pool: &IpNet, prefix: u8, subnet: &IpNet) -> bool {
    subnet.prefix_len() == prefix && subnet.addr() == subnet.network() && pool.contains(subnet)
}
