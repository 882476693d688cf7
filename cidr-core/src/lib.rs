//! # cidr-core
//!
//! Shared pieces for per-node subnet management: the node and endpoint model,
//! the [`PodCidrHandler`] capability both strategies implement, the
//! [`NodeClient`] used to persist node annotations, and the error taxonomy
//! handlers report to their caller.
//!
//! [`PodCidrHandler`]: crate::handler::PodCidrHandler
//! [`NodeClient`]: crate::handler::NodeClient
#![warn(
    missing_debug_implementations,
    missing_docs,
    missing_copy_implementations,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![allow(clippy::cognitive_complexity)]
#![deny(rustdoc::broken_intra_doc_links)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
pub use anyhow;
pub use async_trait::async_trait;
pub use ipnet;
pub use tokio;
pub use tracing;

pub mod config;
pub mod env;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod node;
pub mod prelude;
