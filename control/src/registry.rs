use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ControlPlaneError, Result};
use crate::store::{CoordinationStore, StoreError};
use crate::types::{ClusterMetadata, NodeRecord, PeerList};

/// Root of every registry key. Under `<root><cluster>/`:
/// `metadata`, `nodes/<hostname>`, `peers`, `certs/{ca.crt,server.crt,server.key}`.
pub const ROOT_PREFIX: &str = "/controlplane/";
const ROOT_SEGMENT: &str = "controlplane";
const METADATA_SEGMENT: &str = "metadata";

pub fn cluster_prefix(cluster: &str) -> String {
    format!("{}{}/", ROOT_PREFIX, cluster)
}

pub fn metadata_key(cluster: &str) -> String {
    format!("{}{}", cluster_prefix(cluster), METADATA_SEGMENT)
}

pub fn nodes_prefix(cluster: &str) -> String {
    format!("{}nodes/", cluster_prefix(cluster))
}

pub fn node_key(cluster: &str, hostname: &str) -> String {
    format!("{}{}", nodes_prefix(cluster), hostname)
}

pub fn peers_key(cluster: &str) -> String {
    format!("{}peers", cluster_prefix(cluster))
}

/// The three certificate entries, in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertEntry {
    CaCert,
    ServerCert,
    ServerKey,
}

impl CertEntry {
    pub const ALL: [CertEntry; 3] = [CertEntry::CaCert, CertEntry::ServerCert, CertEntry::ServerKey];

    pub fn file_name(&self) -> &'static str {
        match self {
            CertEntry::CaCert => "ca.crt",
            CertEntry::ServerCert => "server.crt",
            CertEntry::ServerKey => "server.key",
        }
    }
}

pub fn cert_key(cluster: &str, entry: CertEntry) -> String {
    format!("{}certs/{}", cluster_prefix(cluster), entry.file_name())
}

/// Cluster name encoded in a metadata key, if `key` is one.
///
/// Only `/controlplane/<name>/metadata` qualifies; a node whose hostname
/// happens to be `metadata` does not.
pub fn cluster_name_from_key(key: &str) -> Option<&str> {
    let mut parts = key.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(""), Some(ROOT_SEGMENT), Some(name), Some(METADATA_SEGMENT), None)
            if !name.is_empty() =>
        {
            Some(name)
        }
        _ => None,
    }
}

/// First cluster name found among `keys`.
pub fn discover_cluster_name<'a, I>(keys: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    keys.into_iter()
        .find_map(cluster_name_from_key)
        .map(str::to_string)
}

/// Typed reads and writes over the registry key space.
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn CoordinationStore>,
}

impl Registry {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    /// Find the name of the cluster this store belongs to.
    pub async fn discover_cluster(&self) -> Result<String> {
        let keys = self
            .store
            .keys_with_prefix(ROOT_PREFIX)
            .await
            .map_err(|e| {
                ControlPlaneError::Discovery(format!("failed to scan {}: {}", ROOT_PREFIX, e))
            })?;

        debug!("Scanned {} registry keys", keys.len());

        discover_cluster_name(keys.iter().map(String::as_str)).ok_or_else(|| {
            ControlPlaneError::Discovery("peer has no cluster metadata".to_string())
        })
    }

    pub async fn put_metadata(&self, metadata: &ClusterMetadata) -> Result<()> {
        self.put_json(&metadata_key(&metadata.name), metadata).await
    }

    pub async fn get_metadata(&self, cluster: &str) -> Result<Option<ClusterMetadata>> {
        self.get_json(&metadata_key(cluster)).await
    }

    /// Write (and overwrite) the record for `node.hostname`.
    pub async fn put_node(&self, cluster: &str, node: &NodeRecord) -> Result<()> {
        self.put_json(&node_key(cluster, &node.hostname), node).await
    }

    pub async fn get_node(&self, cluster: &str, hostname: &str) -> Result<Option<NodeRecord>> {
        self.get_json(&node_key(cluster, hostname)).await
    }

    /// All decodable node records; malformed entries are skipped.
    pub async fn list_nodes(&self, cluster: &str) -> Result<Vec<NodeRecord>> {
        let prefix = nodes_prefix(cluster);
        let entries = self
            .store
            .get_prefix(&prefix)
            .await
            .map_err(|e| ControlPlaneError::persistence(&prefix, e))?;

        let mut nodes = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match serde_json::from_slice::<NodeRecord>(&value) {
                Ok(node) => nodes.push(node),
                Err(e) => warn!("Failed to decode node record {}: {}", key, e),
            }
        }
        Ok(nodes)
    }

    /// Peer list of the cluster. Missing or malformed reads as empty.
    pub async fn get_peers(&self, cluster: &str) -> Result<PeerList> {
        let key = peers_key(cluster);
        let Some(raw) = self.get_bytes(&key).await? else {
            return Ok(PeerList::new());
        };

        match serde_json::from_slice(&raw) {
            Ok(peers) => Ok(peers),
            Err(e) => {
                warn!("Ignoring malformed peer list at {}: {}", key, e);
                Ok(PeerList::new())
            }
        }
    }

    pub async fn put_peers(&self, cluster: &str, peers: &PeerList) -> Result<()> {
        self.put_json(&peers_key(cluster), peers).await
    }

    pub async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.store
            .get(key)
            .await
            .map_err(|e| ControlPlaneError::persistence(key, e))
    }

    pub async fn put_bytes(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.store
            .put(key, value)
            .await
            .map_err(|e| ControlPlaneError::persistence(key, e))
    }

    async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| ControlPlaneError::persistence(key, StoreError::Decode(e)))?;
        self.put_bytes(key, bytes).await
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_bytes(key).await? {
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| ControlPlaneError::persistence(key, StoreError::Decode(e))),
            None => Ok(None),
        }
    }
}
