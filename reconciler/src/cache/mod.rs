//! Access to the individual nodes of the cache cluster.
//!
//! A node only needs to support enumerating its keys, fetching a value and
//! deleting a key. "Not found" must be reported as [`CacheError::NotFound`]
//! so callers can tell a miss apart from a broken node.
use async_trait::async_trait;
use std::io;
use std::time::Duration;

mod memcached;

pub use memcached::MemcachedNode;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("key not found")]
    NotFound,
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
}

impl CacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound)
    }
}

/// Internal storage grouping of a node (a memcached slab) and the number
/// of items it currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub id: u32,
    pub items: u64,
}

#[async_trait]
pub trait CacheNode: Send + Sync {
    /// Address used in logs.
    fn addr(&self) -> &str;

    async fn list_buckets(&self) -> Result<Vec<Bucket>, CacheError>;

    async fn list_keys(&self, bucket: u32) -> Result<Vec<String>, CacheError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Lists every key on the node. Buckets reporting no items are skipped.
    async fn enumerate_keys(&self) -> Result<Vec<String>, CacheError> {
        let mut keys = Vec::new();
        for bucket in self.list_buckets().await? {
            if bucket.items == 0 {
                continue;
            }
            keys.extend(self.list_keys(bucket.id).await?);
        }
        Ok(keys)
    }
}
