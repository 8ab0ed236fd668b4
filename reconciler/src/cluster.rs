//! A logical view over every configured cache node.
//!
//! Nodes are independent and there is no routing function that says where a
//! key lives, so a key seen on one node during discovery may sit on another
//! by the time it is fetched or deleted. Fetch and delete therefore ask the
//! primary node first and then probe the remaining nodes in order.
use crate::cache::{CacheError, CacheNode, MemcachedNode};
use crate::config::Config;
use crate::metrics_defs::DISCOVERY_NODE_FAILED;
use shared::counter;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinSet;

type NodeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

pub struct ClusterView {
    // The first node is the primary
    nodes: Vec<Arc<dyn CacheNode>>,
}

impl ClusterView {
    pub fn new(nodes: Vec<Arc<dyn CacheNode>>) -> Self {
        ClusterView { nodes }
    }

    pub fn from_config(config: &Config) -> Self {
        let nodes = config
            .memcached_servers
            .iter()
            .map(|addr| {
                Arc::new(MemcachedNode::new(addr.as_str(), config.cache_timeout()))
                    as Arc<dyn CacheNode>
            })
            .collect();
        ClusterView::new(nodes)
    }

    /// Union of the keys of every node. A node that cannot be enumerated is
    /// logged and skipped; its keys will be picked up on a later pass.
    pub async fn discover_keys(&self) -> BTreeSet<String> {
        let mut join_set = JoinSet::new();
        for node in &self.nodes {
            let node = node.clone();
            join_set.spawn(async move {
                let result = node.enumerate_keys().await;
                (node, result)
            });
        }

        let mut keys = BTreeSet::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((node, Ok(node_keys))) => {
                    tracing::debug!(node = node.addr(), count = node_keys.len(), "Enumerated keys");
                    keys.extend(node_keys);
                }
                Ok((node, Err(e))) => {
                    counter!(DISCOVERY_NODE_FAILED).increment(1);
                    tracing::warn!(node = node.addr(), error = %e, "Error getting keys from node");
                }
                Err(e) => tracing::error!("Task panicked: {}", e),
            }
        }
        keys
    }

    pub async fn fetch(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        self.resolve(key, |node, key| node.get(key)).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.resolve(key, |node, key| node.delete(key)).await
    }

    /// Runs `op` against the primary node, then against every other node in
    /// configuration order, until one succeeds.
    ///
    /// Returns `NotFound` only when every node reported the key missing.
    /// Otherwise the last node failure is returned.
    async fn resolve<T, F>(&self, key: &str, op: F) -> Result<T, CacheError>
    where
        F: for<'a> Fn(&'a dyn CacheNode, &'a str) -> NodeFuture<'a, T>,
    {
        let mut last_error = None;

        for (index, node) in self.nodes.iter().enumerate() {
            match op(node.as_ref(), key).await {
                Ok(value) => {
                    if index > 0 {
                        tracing::info!(key, node = node.addr(), "Key resolved on fallback node");
                    }
                    return Ok(value);
                }
                Err(CacheError::NotFound) => {}
                Err(e) => {
                    tracing::warn!(key, node = node.addr(), error = %e, "Cache node error");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(CacheError::NotFound))
    }
}
