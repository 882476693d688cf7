use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use tokio::runtime::Builder;
use tracing::debug;

use cidr_core::config::{cli, trace};
use config::{CidrConfig, Strategy, wire};

mod plan;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[clap(author, version, about, long_about = None)]
/// Cli tool for checking subnet management config & dry-running reconciliation
pub struct Args {
    #[clap(flatten)]
    pub cfg: cli::Config,
    #[clap(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    /// parse & validate the config
    Check {
        /// print the parsed wire format or the internal config format
        #[clap(short = 'f', long, value_enum)]
        format: Option<Format>,
    },
    /// run every node in a JSON/YAML list through the configured strategy
    /// against an in-memory pool & store, and print the outcome as JSON
    Plan {
        /// path to the node list
        #[clap(short = 'n', long, value_parser)]
        nodes: PathBuf,
        /// also print the counters collected during the run to stderr, in the
        /// prometheus text format
        #[clap(long)]
        metrics: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Wire,
    Internal,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let trace_config = trace::Config::parse(&args.cfg.cidr_log)?;
    debug!(?args, ?trace_config);

    let path = &args.cfg.config_path;
    eprintln!("found config at path = {}", path.display());

    match &args.cmd {
        Cmd::Check { format } => check(path, *format),
        Cmd::Plan { nodes, metrics } => {
            let cfg = CidrConfig::parse(path)?;
            let nodes = parse_file(nodes).context("failed to parse node list")?;
            let rt = Builder::new_current_thread().enable_all().build()?;
            let report = rt.block_on(plan::run(&cfg, nodes))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if *metrics {
                eprint!("{}", cidr_core::metrics::gather_text()?);
            }
            Ok(())
        }
    }
}

fn check(path: &Path, format: Option<Format>) -> Result<()> {
    match format {
        Some(Format::Wire) => {
            let wire_cfg = parse_file::<wire::Config>(path)?;
            println!("printing wire format");
            println!("{wire_cfg:#?}");
        }
        Some(Format::Internal) => {
            let cfg = CidrConfig::parse(path)?;
            println!("parsed wire format into internal format, pretty printing");
            println!("{cfg:#?}");
        }
        None => {}
    }
    let cfg = CidrConfig::parse(path)?;
    match cfg.strategy() {
        Strategy::Allocating { pool, block_prefix } => println!(
            "config valid: allocating /{block_prefix} blocks from {pool} ({} blocks)",
            subnet_pool::block_count(&pool, block_prefix)
        ),
        Strategy::Raw => println!("config valid: raw mode, endpoints only"),
    }
    Ok(())
}

fn parse_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("failed to find {}", path.display()))?;

    Ok(match path.extension() {
        Some(ext) if ext == "json" => serde_json::from_str(&input)?,
        Some(ext) if ext == "yaml" || ext == "yml" => serde_yaml::from_str(&input)?,
        _ => match serde_json::from_str(&input) {
            Ok(r) => r,
            Err(_err) => {
                debug!("failed parsing from json, trying yaml");
                serde_yaml::from_str(&input)?
            }
        },
    })
}
