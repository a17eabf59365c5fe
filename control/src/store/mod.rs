pub mod etcd;
pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::types::{Member, MemberAddResponse};

pub use etcd::{EtcdConnector, EtcdStore};
pub use memory::{MemoryCluster, MemoryStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Etcd(#[from] etcd_client::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed value: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Key-value and membership operations consumed from the store.
///
/// Reads are linearizable; multi-key writes are not atomic.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// All entries whose key starts with `prefix`, in key order.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    /// Keys-only variant of [`CoordinationStore::get_prefix`].
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Add a voting member with the given peer URLs to the replication group.
    async fn member_add(&self, peer_urls: Vec<String>) -> Result<MemberAddResponse, StoreError>;

    async fn member_list(&self) -> Result<Vec<Member>, StoreError>;
}

/// Opens client connections to store endpoints.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &str,
        dial_timeout: Duration,
    ) -> Result<Arc<dyn CoordinationStore>, StoreError>;
}
