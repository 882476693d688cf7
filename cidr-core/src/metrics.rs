#![allow(missing_docs)] // lazy_static doesn't play nicely with docstrings

//! # metrics
//!
//! subnet lifecycle counters
use lazy_static::lazy_static;
use prometheus::{IntCounter, TextEncoder, register_int_counter};

lazy_static! {
    /// blocks handed out by the allocator
    pub static ref SUBNET_ALLOCATIONS: IntCounter =
        register_int_counter!("subnet_allocations", "blocks allocated to nodes").unwrap();
    /// blocks returned to the pool
    pub static ref SUBNET_RECLAIMS: IntCounter =
        register_int_counter!("subnet_reclaims", "blocks returned to the pool").unwrap();
    /// allocation attempts that failed, including exhaustion
    pub static ref SUBNET_ALLOCATION_FAILURES: IntCounter = register_int_counter!(
        "subnet_allocation_failures",
        "failed attempts to get a free block"
    )
    .unwrap();
    /// node updates that failed after a block was allocated
    pub static ref NODE_PERSIST_FAILURES: IntCounter = register_int_counter!(
        "node_persist_failures",
        "node annotation updates that failed"
    )
    .unwrap();
    /// endpoints written to the store
    pub static ref ENDPOINT_SAVES: IntCounter =
        register_int_counter!("endpoint_saves", "endpoints written to the store").unwrap();
}

/// Render every registered metric in the prometheus text format. Counters
/// register on first use, so they are touched here to show up even at zero.
pub fn gather_text() -> anyhow::Result<String> {
    for counter in [
        &*SUBNET_ALLOCATIONS,
        &*SUBNET_RECLAIMS,
        &*SUBNET_ALLOCATION_FAILURES,
        &*NODE_PERSIST_FAILURES,
        &*ENDPOINT_SAVES,
    ] {
        counter.inc_by(0);
    }
    let encoder = TextEncoder::new();
    let mut buf = String::new();
    encoder.encode_utf8(&prometheus::gather(), &mut buf)?;
    Ok(buf)
}
