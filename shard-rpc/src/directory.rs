//! Resolution of cluster node identifiers to dialable addresses.

use std::collections::HashMap;
use std::future::Future;

use anyhow::{Result, anyhow};

use crate::message::NodeId;

/// Address of a cluster member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub tcp_addr: String,
}

/// Looks up where a data node can be reached.
///
/// The client asks for a fresh answer on every call and never caches it.
pub trait NodeDirectory: Send + Sync + 'static {
    fn data_node(&self, id: NodeId) -> impl Future<Output = Result<NodeInfo>> + Send;
}

/// Fixed membership, typically built from command-line flags or a config file.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    nodes: HashMap<NodeId, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, id: NodeId, tcp_addr: impl Into<String>) -> Self {
        self.insert(id, tcp_addr);
        self
    }

    pub fn insert(&mut self, id: NodeId, tcp_addr: impl Into<String>) {
        self.nodes.insert(id, tcp_addr.into());
    }
}

impl NodeDirectory for StaticDirectory {
    async fn data_node(&self, id: NodeId) -> Result<NodeInfo> {
        let tcp_addr = self
            .nodes
            .get(&id)
            .ok_or_else(|| anyhow!("node not found: {id}"))?;
        Ok(NodeInfo {
            id,
            tcp_addr: tcp_addr.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_known_nodes_only() {
        let directory = StaticDirectory::new().with_node(3, "10.0.0.3:8088");

        let info = directory.data_node(3).await.expect("known node");
        assert_eq!(
            info,
            NodeInfo {
                id: 3,
                tcp_addr: "10.0.0.3:8088".into()
            }
        );

        let err = directory.data_node(4).await.unwrap_err();
        assert_eq!(err.to_string(), "node not found: 4");
    }
}
