//! cidr-core prelude

pub use crate::{
    anyhow::{self, Context},
    async_trait,
    error::{CidrError, CidrResult},
    handler::{NodeClient, PodCidrHandler},
    ipnet::IpNet,
    node::{Endpoint, EndpointProjection, Node},
    tokio,
    tracing::{self, debug, error, info, instrument, trace, warn},
};

pub use std::sync::Arc;
