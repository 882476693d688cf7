use std::{collections::BTreeMap, convert::Infallible, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use cidr_core::{
    handler::{NodeClient, PodCidrHandler},
    node::{Endpoint, Node},
};
use config::CidrConfig;
use endpoint_store::MemoryStore;
use pod_cidr::Handler;

/// keeps the last update for every node instead of writing it anywhere
#[derive(Debug, Default)]
struct DryRunClient {
    updated: Mutex<BTreeMap<String, Node>>,
}

#[async_trait]
impl NodeClient for DryRunClient {
    type Error = Infallible;

    async fn update(&self, node: &Node) -> Result<(), Self::Error> {
        self.updated.lock().insert(node.name.clone(), node.clone());
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Report {
    /// nodes as they'd look afterwards, in input order
    pub(crate) nodes: Vec<Node>,
    pub(crate) endpoints: Vec<Endpoint>,
    pub(crate) errors: Vec<NodeError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) free_blocks: Option<u128>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NodeError {
    pub(crate) node: String,
    pub(crate) error: String,
}

/// restore from the nodes that already hold a subnet, then apply every node
pub(crate) async fn run(cfg: &CidrConfig, nodes: Vec<Node>) -> Result<Report> {
    let store = Arc::new(MemoryStore::new());
    let client = Arc::new(DryRunClient::default());
    let handler = Handler::from_config(cfg, Arc::clone(&store), Arc::clone(&client))?;

    handler.restore(&nodes).await?;

    let mut errors = Vec::new();
    for node in &nodes {
        if let Err(err) = handler.apply(node.clone()).await {
            warn!(node = %node.name, ?err, "node failed to apply");
            errors.push(NodeError {
                node: node.name.clone(),
                error: format!("{:#}", anyhow::Error::new(err)),
            });
        }
    }

    let updated = client.updated.lock();
    Ok(Report {
        nodes: nodes
            .iter()
            .map(|node| updated.get(&node.name).unwrap_or(node).clone())
            .collect(),
        endpoints: store.endpoints(),
        errors,
        free_blocks: handler.pool().map(|pool| pool.free_count()),
    })
}
