use std::num::NonZeroU32;

use anyhow::{Context, Result};
use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize, de};

use cidr_core::node::{DEFAULT_PUBLIC_ADDRESSES_KEY, DEFAULT_SUBNETS_KEY};

/// top-level config type
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    pub cluster: String,
    #[serde(default)]
    pub mode: Mode,
    pub pool: Option<Pool>,
    #[serde(default)]
    pub annotations: Annotations,
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub persist_timeout: Option<NonZeroU32>,
}

/// which strategy governs the cluster
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Allocating,
    #[serde(alias = "passthrough")]
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Pool {
    pub cidr: IpNet,
    pub block_prefix: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Annotations {
    #[serde(default = "default_subnets_key")]
    pub subnets: String,
    #[serde(default = "default_public_addresses_key")]
    pub public_addresses: String,
}

impl Default for Annotations {
    fn default() -> Self {
        Self {
            subnets: default_subnets_key(),
            public_addresses: default_public_addresses_key(),
        }
    }
}

pub fn default_subnets_key() -> String {
    DEFAULT_SUBNETS_KEY.to_owned()
}

pub fn default_public_addresses_key() -> String {
    DEFAULT_PUBLIC_ADDRESSES_KEY.to_owned()
}

/// Parse a duration string with optional time units
/// Accepts: "5", "5s", "2m", "1h"
/// If no unit is specified, assumes seconds
fn parse_duration(s: &str) -> Result<u32> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("empty duration string");
    }

    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    // split units
    let (num, unit) = s.split_at(end);
    let num = num.parse::<u32>().context("invalid number")?;

    let num_seconds = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        other => anyhow::bail!(
            "unknown time unit '{}', only 'h', 'm', or 's' are supported",
            other
        ),
    };

    num.checked_mul(num_seconds)
        .context("duration value overflow")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireDuration {
    Seconds(u64),
    String(String),
}

impl WireDuration {
    fn into_nonzero<E: de::Error>(self) -> Result<NonZeroU32, E> {
        match self {
            WireDuration::Seconds(val) => NonZeroU32::new(
                u32::try_from(val).map_err(|_| E::custom("duration value too large"))?,
            )
            .ok_or_else(|| E::custom("duration cannot be zero")),
            WireDuration::String(s) => NonZeroU32::new(parse_duration(&s).map_err(E::custom)?)
                .ok_or_else(|| E::custom("duration cannot be zero")),
        }
    }
}

fn deserialize_optional_duration<'de, D>(de: D) -> Result<Option<NonZeroU32>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<WireDuration>::deserialize(de)?
        .map(WireDuration::into_nonzero)
        .transpose()
}
