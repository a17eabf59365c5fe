use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::error::{ControlPlaneError, Result};
use crate::metadata::{MetadataDetector, NodeMetadata};
use crate::types::NodeRecord;

/// Address used only to pick the outbound interface; nothing is sent.
const OUTBOUND_PROBE_ADDR: &str = "8.8.8.8:80";

pub const ROLE_LABEL: &str = "role";
pub const CONTROL_PLANE_ROLE: &str = "control-plane";

/// Local facts a workflow needs about the machine it runs on.
#[async_trait]
pub trait HostProbe: Send + Sync {
    fn hostname(&self) -> Result<String>;

    /// IP of the interface that routes to the outside world.
    async fn outbound_ip(&self) -> Result<String>;

    async fn detect_metadata(&self) -> NodeMetadata;
}

/// The machine this process runs on.
#[derive(Debug, Clone)]
pub struct LocalHost {
    detector: MetadataDetector,
}

impl LocalHost {
    pub fn new(detector: MetadataDetector) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl HostProbe for LocalHost {
    fn hostname(&self) -> Result<String> {
        let name = hostname::get()
            .map_err(|e| ControlPlaneError::HostIdentity(format!("hostname: {}", e)))?;
        Ok(name.to_string_lossy().to_string())
    }

    async fn outbound_ip(&self) -> Result<String> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| ControlPlaneError::HostIdentity(format!("bind probe socket: {}", e)))?;
        socket
            .connect(OUTBOUND_PROBE_ADDR)
            .await
            .map_err(|e| ControlPlaneError::HostIdentity(format!("no outbound route: {}", e)))?;
        let addr = socket
            .local_addr()
            .map_err(|e| ControlPlaneError::HostIdentity(format!("local address: {}", e)))?;
        Ok(addr.ip().to_string())
    }

    async fn detect_metadata(&self) -> NodeMetadata {
        self.detector.detect().await
    }
}

/// A host with fixed answers, for tests and dry runs.
#[derive(Debug, Clone)]
pub struct StaticHost {
    pub hostname: String,
    pub ip: String,
    pub metadata: NodeMetadata,
}

impl StaticHost {
    pub fn new(hostname: &str, ip: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            ip: ip.to_string(),
            metadata: NodeMetadata::default(),
        }
    }
}

#[async_trait]
impl HostProbe for StaticHost {
    fn hostname(&self) -> Result<String> {
        Ok(self.hostname.clone())
    }

    async fn outbound_ip(&self) -> Result<String> {
        Ok(self.ip.clone())
    }

    async fn detect_metadata(&self) -> NodeMetadata {
        self.metadata.clone()
    }
}

/// Registry record for a control-plane node.
pub fn control_plane_record(hostname: &str, ip: &str, meta: NodeMetadata) -> NodeRecord {
    NodeRecord {
        hostname: hostname.to_string(),
        ip: ip.to_string(),
        provider: meta.provider,
        location: meta.location,
        node_id: meta.node_id,
        os_name: meta.os_name,
        os_version: meta.os_version,
        labels: [(ROLE_LABEL.to_string(), CONTROL_PLANE_ROLE.to_string())]
            .into_iter()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_plane_record_carries_role() {
        let record = control_plane_record("node-a", "10.0.0.1", NodeMetadata::default());
        assert_eq!(record.hostname, "node-a");
        assert_eq!(record.provider, "baremetal");
        assert_eq!(
            record.labels.get(ROLE_LABEL).map(String::as_str),
            Some(CONTROL_PLANE_ROLE)
        );
    }

    #[test]
    fn test_local_hostname_is_not_empty() {
        let host = LocalHost::new(MetadataDetector::new().unwrap());
        assert!(!host.hostname().unwrap().is_empty());
    }
}
