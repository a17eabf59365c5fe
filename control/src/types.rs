use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Registry Documents
// ============================================================================

/// Identity of a cluster, written once by the founding node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetadata {
    pub name: String,
    pub region: String,
}

/// One record per cluster member, keyed by hostname.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub hostname: String,
    pub ip: String,
    /// aws, gcp, baremetal
    pub provider: String,
    /// Region or zone for cloud hosts, "unknown" otherwise
    pub location: String,
    /// Cloud instance ID, empty when not known
    pub node_id: String,
    pub os_name: String,
    pub os_version: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Advisory list of peer IPs. Not deduplicated and not authoritative.
pub type PeerList = Vec<String>;

// ============================================================================
// Membership
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: u64,
    /// Empty for a member that was added but has not started yet
    pub name: String,
    pub peer_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberAddResponse {
    pub member_id: u64,
    pub members: Vec<Member>,
}

// ============================================================================
// TLS Material
// ============================================================================

/// PEM-encoded root authority and server identity for a cluster.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsBundle {
    pub ca_cert: Vec<u8>,
    pub ca_key: Vec<u8>,
    pub server_cert: Vec<u8>,
    pub server_key: Vec<u8>,
}

impl std::fmt::Debug for TlsBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsBundle")
            .field("ca_cert", &self.ca_cert.len())
            .field("server_cert", &self.server_cert.len())
            .finish_non_exhaustive()
    }
}

/// The three certificate entries kept in the registry.
///
/// The root key stays with the founding node and is not persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredCertificates {
    pub ca_cert: Vec<u8>,
    pub server_cert: Vec<u8>,
    pub server_key: Vec<u8>,
}

impl From<&TlsBundle> for StoredCertificates {
    fn from(bundle: &TlsBundle) -> Self {
        Self {
            ca_cert: bundle.ca_cert.clone(),
            server_cert: bundle.server_cert.clone(),
            server_key: bundle.server_key.clone(),
        }
    }
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
