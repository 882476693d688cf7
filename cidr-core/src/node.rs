//! Node snapshots and the endpoint records derived from them
use std::{collections::BTreeMap, net::IpAddr};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// default annotation key holding the subnet(s) assigned to a node
pub static DEFAULT_SUBNETS_KEY: &str = "podcidr.io/subnets";
/// default annotation key holding a node's public addresses
pub static DEFAULT_PUBLIC_ADDRESSES_KEY: &str = "podcidr.io/public-addresses";

/// A snapshot of a cluster node. Only the annotation map is ever modified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// unique node name
    pub name: String,
    /// `None` when the node carries no annotations at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    /// internal addresses reported by the node
    #[serde(default)]
    pub internal_ips: Vec<IpAddr>,
}

impl Node {
    /// new node with no annotations
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// builder-style helper to set an annotation
    pub fn with_annotation<K: Into<String>, V: Into<String>>(mut self, key: K, val: V) -> Self {
        self.set_annotation(key, val);
        self
    }

    /// builder-style helper to add an internal address
    pub fn with_internal_ip(mut self, ip: IpAddr) -> Self {
        self.internal_ips.push(ip);
        self
    }

    /// get an annotation value
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|map| map.get(key))
            .map(String::as_str)
    }

    /// set an annotation, creating the map if absent
    pub fn set_annotation<K: Into<String>, V: Into<String>>(&mut self, key: K, val: V) {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), val.into());
    }
}

/// Networking identity of a node as tracked by the endpoint store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// cluster-qualified id
    pub id: String,
    /// node name, the store key
    pub name: String,
    /// addresses other sites reach this node on
    pub public_addresses: Vec<String>,
    /// subnet CIDRs believed to belong to this node, in annotation order
    pub subnets: Vec<String>,
    /// the node's own addresses as host networks
    pub node_subnets: Vec<String>,
}

/// Maps a node snapshot to the endpoint that represents it. Pure & total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointProjection {
    cluster: String,
    subnets_key: String,
    public_addresses_key: String,
}

impl EndpointProjection {
    /// projection using the default annotation keys
    pub fn new<S: Into<String>>(cluster: S) -> Self {
        Self {
            cluster: cluster.into(),
            subnets_key: DEFAULT_SUBNETS_KEY.to_owned(),
            public_addresses_key: DEFAULT_PUBLIC_ADDRESSES_KEY.to_owned(),
        }
    }

    /// override the annotation keys
    pub fn with_keys<S: Into<String>, P: Into<String>>(
        mut self,
        subnets_key: S,
        public_addresses_key: P,
    ) -> Self {
        self.subnets_key = subnets_key.into();
        self.public_addresses_key = public_addresses_key.into();
        self
    }

    /// annotation key subnets are read from and written to
    pub fn subnets_key(&self) -> &str {
        &self.subnets_key
    }

    /// cluster name used in endpoint ids
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// build the endpoint for `node`
    pub fn project(&self, node: &Node) -> Endpoint {
        let mut public_addresses = node
            .annotation(&self.public_addresses_key)
            .map(split_list)
            .unwrap_or_default();
        if public_addresses.is_empty() {
            public_addresses = node.internal_ips.iter().map(ToString::to_string).collect();
        }

        Endpoint {
            id: format!("{}.{}", self.cluster, node.name),
            name: node.name.clone(),
            public_addresses,
            subnets: node
                .annotation(&self.subnets_key)
                .map(split_list)
                .unwrap_or_default(),
            node_subnets: node
                .internal_ips
                .iter()
                .map(|ip| IpNet::from(*ip).to_string())
                .collect(),
        }
    }
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_empty_claim() {
        let proj = EndpointProjection::new("edge");
        let node = Node::new("n1").with_internal_ip("192.168.1.10".parse().unwrap());
        let ep = proj.project(&node);

        assert_eq!(ep.id, "edge.n1");
        assert_eq!(ep.name, "n1");
        assert!(ep.subnets.is_empty());
        assert_eq!(ep.public_addresses, vec!["192.168.1.10".to_owned()]);
        assert_eq!(ep.node_subnets, vec!["192.168.1.10/32".to_owned()]);
    }

    #[test]
    fn test_project_splits_annotations() {
        let proj = EndpointProjection::new("edge");
        let node = Node::new("n1")
            .with_annotation(DEFAULT_SUBNETS_KEY, "10.0.1.0/24, 10.0.2.0/24,")
            .with_annotation(DEFAULT_PUBLIC_ADDRESSES_KEY, "1.2.3.4")
            .with_internal_ip("192.168.1.10".parse().unwrap());
        let ep = proj.project(&node);

        assert_eq!(ep.subnets, vec!["10.0.1.0/24", "10.0.2.0/24"]);
        assert_eq!(ep.public_addresses, vec!["1.2.3.4"]);
    }

    #[test]
    fn test_project_custom_keys() {
        let proj = EndpointProjection::new("edge").with_keys("x/subnets", "x/public");
        let node = Node::new("n1").with_annotation("x/subnets", "10.0.1.0/24");
        assert_eq!(proj.project(&node).subnets, vec!["10.0.1.0/24"]);
        assert_eq!(proj.subnets_key(), "x/subnets");
    }

    #[test]
    fn test_set_annotation_creates_map() {
        let mut node = Node::new("n1");
        assert!(node.annotations.is_none());
        node.set_annotation(DEFAULT_SUBNETS_KEY, "10.0.5.0/24");
        assert_eq!(node.annotation(DEFAULT_SUBNETS_KEY), Some("10.0.5.0/24"));
    }

    #[test]
    fn test_node_json() {
        let node: Node = serde_json::from_str(
            r#"{"name": "n1", "internalIps": ["10.1.1.1"], "annotations": {"a": "b"}}"#,
        )
        .unwrap();
        assert_eq!(node.annotation("a"), Some("b"));
        assert_eq!(node.internal_ips.len(), 1);
    }
}
