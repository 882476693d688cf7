use std::{path::Path, time::Duration};

use anyhow::{Context, Result, bail};
use ipnet::IpNet;
use tracing::debug;

use cidr_core::node::EndpointProjection;

pub mod wire;

/// validated subnet management config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrConfig {
    cluster: String,
    strategy: Strategy,
    projection: EndpointProjection,
    persist_timeout: Option<Duration>,
}

/// strategy selected for the cluster, with whatever it needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// hand out `/block_prefix` blocks from `pool`
    Allocating { pool: IpNet, block_prefix: u8 },
    /// subnets are managed elsewhere, only mirror endpoints
    Raw,
}

impl TryFrom<wire::Config> for CidrConfig {
    type Error = anyhow::Error;

    fn try_from(cfg: wire::Config) -> Result<Self> {
        if cfg.cluster.trim().is_empty() {
            bail!("cluster name must not be empty");
        }
        let strategy = match (cfg.mode, cfg.pool) {
            (wire::Mode::Allocating, Some(wire::Pool { cidr, block_prefix })) => {
                if block_prefix < cidr.prefix_len() || block_prefix > cidr.max_prefix_len() {
                    bail!(
                        "block_prefix /{} must be between /{} and /{} for pool {}",
                        block_prefix,
                        cidr.prefix_len(),
                        cidr.max_prefix_len(),
                        cidr
                    );
                }
                if cidr.addr() != cidr.network() {
                    bail!("pool {} has host bits set, did you mean {}?", cidr, cidr.trunc());
                }
                Strategy::Allocating {
                    pool: cidr,
                    block_prefix,
                }
            }
            (wire::Mode::Allocating, None) => bail!("allocating mode requires a pool"),
            (wire::Mode::Raw, pool) => {
                if pool.is_some() {
                    debug!("raw mode ignores the configured pool");
                }
                Strategy::Raw
            }
        };
        if cfg.annotations.subnets == cfg.annotations.public_addresses {
            bail!("subnets and public_addresses annotation keys must differ");
        }

        Ok(Self {
            projection: EndpointProjection::new(cfg.cluster.clone())
                .with_keys(cfg.annotations.subnets, cfg.annotations.public_addresses),
            cluster: cfg.cluster,
            strategy,
            persist_timeout: cfg
                .persist_timeout
                .map(|secs| Duration::from_secs(secs.get() as u64)),
        })
    }
}

impl CidrConfig {
    /// read config from `path`, attempting JSON then YAML
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to find config at {}", &path.display()))?,
        )?;
        debug!(?config);
        Ok(config)
    }
    /// attempts to decode the config first as JSON, then YAML, finally erroring if neither work
    pub fn parse_str<S: AsRef<str>>(s: S) -> Result<Self> {
        let config = Self::new(s)?;
        debug!(?config);
        Ok(config)
    }
    /// Pass in the wire config format from yaml
    pub fn yaml<S: AsRef<str>>(input: S) -> Result<Self> {
        Self::try_from(serde_yaml::from_str::<wire::Config>(input.as_ref())?)
    }
    /// Pass in the wire config format from json
    pub fn json<S: AsRef<str>>(input: S) -> Result<Self> {
        Self::try_from(serde_json::from_str::<wire::Config>(input.as_ref())?)
    }

    fn new<S: AsRef<str>>(input: S) -> Result<Self> {
        match Self::json(input.as_ref()) {
            Ok(r) => Ok(r),
            Err(_err) => Self::yaml(input.as_ref()),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }
    pub fn projection(&self) -> &EndpointProjection {
        &self.projection
    }
    /// deadline for a single node update, if any
    pub fn persist_timeout(&self) -> Option<Duration> {
        self.persist_timeout
    }
}
