use std::path::PathBuf;
use std::time::Duration;

use crate::embedded::{ClusterState, InstanceSpec};
use crate::error::{ControlPlaneError, Result};

pub const DEFAULT_DATA_DIR: &str = "/var/lib/controlplane/etcd";
pub const DEFAULT_CLIENT_PORT: u16 = 2379;
pub const DEFAULT_PEER_PORT: u16 = 2380;
pub const DEFAULT_STATUS_PORT: u16 = 8080;
pub const DEFAULT_PEER_LISTEN_HOST: &str = "0.0.0.0";
pub const DEFAULT_ETCD_BINARY: &str = "etcd";

/// How the local store instance listens and where it keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub data_dir: PathBuf,
    pub client_port: u16,
    pub peer_port: u16,
    pub peer_listen_host: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            client_port: DEFAULT_CLIENT_PORT,
            peer_port: DEFAULT_PEER_PORT,
            peer_listen_host: DEFAULT_PEER_LISTEN_HOST.to_string(),
        }
    }
}

impl StoreSettings {
    /// Client URL used by this process to talk to its own instance.
    pub fn local_client_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.client_port)
    }

    pub fn client_url(&self, host: &str) -> String {
        format!("http://{}", host_port(host, self.client_port))
    }

    pub fn peer_url(&self, host: &str) -> String {
        format!("http://{}", host_port(host, self.peer_port))
    }

    /// Describe a local instance named `name` advertising on `advertise`.
    pub fn instance_spec(
        &self,
        name: &str,
        advertise: &str,
        initial_cluster: String,
        cluster_state: ClusterState,
    ) -> InstanceSpec {
        let mut listen_client_urls = vec![self.local_client_url()];
        let advertised_client = self.client_url(advertise);
        if !listen_client_urls.contains(&advertised_client) {
            listen_client_urls.push(advertised_client.clone());
        }

        InstanceSpec {
            name: name.to_string(),
            data_dir: self.data_dir.join(name),
            initial_cluster,
            cluster_state,
            listen_peer_url: self.peer_url(&self.peer_listen_host),
            advertise_peer_url: self.peer_url(advertise),
            listen_client_urls,
            advertise_client_url: advertised_client,
        }
    }
}

/// Bounds on every wait in the bootstrap and join paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub store_ready: Duration,
    pub peer_dial: Duration,
    pub local_dial: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            store_ready: Duration::from_secs(30),
            peer_dial: Duration::from_secs(5),
            local_dial: Duration::from_secs(3),
        }
    }
}

/// Inputs for founding a new cluster.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub name: String,
    pub region: String,
    pub advertise_address: String,
    pub store: StoreSettings,
    /// `host:port` to serve the status page on; `None` disables it
    pub status_listen: Option<String>,
    /// Issue and persist the cluster TLS bundle
    pub issue_certificates: bool,
    pub timeouts: Timeouts,
}

impl BootstrapConfig {
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        advertise_address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            advertise_address: advertise_address.into(),
            store: StoreSettings::default(),
            status_listen: None,
            issue_certificates: true,
            timeouts: Timeouts::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("name", &self.name)?;
        require("region", &self.region)?;
        require("advertise address", &self.advertise_address)?;
        if self.name.contains('/') {
            return Err(ControlPlaneError::Configuration(format!(
                "cluster name must not contain '/': {}",
                self.name
            )));
        }
        Ok(())
    }
}

/// Inputs for enrolling into an existing cluster.
#[derive(Debug, Clone)]
pub struct JoinConfig {
    pub peer_address: String,
    pub advertise_address: String,
    pub store: StoreSettings,
    pub status_listen: Option<String>,
    pub timeouts: Timeouts,
}

impl JoinConfig {
    pub fn new(peer_address: impl Into<String>, advertise_address: impl Into<String>) -> Self {
        Self {
            peer_address: peer_address.into(),
            advertise_address: advertise_address.into(),
            store: StoreSettings::default(),
            status_listen: None,
            timeouts: Timeouts::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("peer address", &self.peer_address)?;
        require("advertise address", &self.advertise_address)?;
        Ok(())
    }

    /// Client endpoint of the peer, with scheme and port filled in.
    pub fn peer_endpoint(&self) -> String {
        normalize_endpoint(&self.peer_address, self.store.client_port)
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ControlPlaneError::Configuration(format!(
            "{} is required",
            field
        )));
    }
    Ok(())
}

/// Turn `host`, `host:port` or a full URL into an `http://host:port` endpoint.
pub fn normalize_endpoint(address: &str, default_port: u16) -> String {
    let address = address.trim().trim_end_matches('/');
    let (scheme, rest) = match address.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", address),
    };

    let has_port = if let Some(bracketed) = rest.strip_prefix('[') {
        // [v6]:port
        bracketed.contains("]:")
    } else {
        rest.matches(':').count() == 1
    };

    if has_port {
        format!("{}://{}", scheme, rest)
    } else {
        format!("{}://{}", scheme, host_port(rest, default_port))
    }
}

/// `host:port`, with a bare IPv6 host put in brackets.
pub fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Status page address on the advertise host. Hostnames are resolved at bind time.
pub fn default_status_listen(advertise: &str, port: u16) -> String {
    host_port(advertise.trim(), port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_requires_every_field() {
        assert!(BootstrapConfig::new("east1", "us-east", "10.0.0.1")
            .validate()
            .is_ok());

        for cfg in [
            BootstrapConfig::new("", "us-east", "10.0.0.1"),
            BootstrapConfig::new("east1", "", "10.0.0.1"),
            BootstrapConfig::new("east1", "us-east", " "),
        ] {
            let err = cfg.validate().unwrap_err();
            assert!(matches!(err, ControlPlaneError::Configuration(_)));
        }
    }

    #[test]
    fn test_cluster_name_cannot_contain_separator() {
        let err = BootstrapConfig::new("east/1", "us-east", "10.0.0.1")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ControlPlaneError::Configuration(_)));
    }

    #[test]
    fn test_join_requires_peer_and_advertise() {
        assert!(JoinConfig::new("10.0.0.1:2379", "10.0.0.2").validate().is_ok());
        assert!(JoinConfig::new("", "10.0.0.2").validate().is_err());
        assert!(JoinConfig::new("10.0.0.1", "").validate().is_err());
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("10.0.0.1:2379", 2379), "http://10.0.0.1:2379");
        assert_eq!(normalize_endpoint("10.0.0.1", 2379), "http://10.0.0.1:2379");
        assert_eq!(
            normalize_endpoint("https://peer.example:4001/", 2379),
            "https://peer.example:4001"
        );
        assert_eq!(normalize_endpoint("fd00::1", 2379), "http://[fd00::1]:2379");
        assert_eq!(normalize_endpoint("[fd00::1]:2400", 2379), "http://[fd00::1]:2400");
    }

    #[test]
    fn test_instance_spec_urls() {
        let settings = StoreSettings {
            data_dir: PathBuf::from("/tmp/cp"),
            ..StoreSettings::default()
        };
        let spec = settings.instance_spec(
            "node-a",
            "10.0.0.1",
            "node-a=http://10.0.0.1:2380".to_string(),
            ClusterState::New,
        );

        assert_eq!(spec.data_dir, PathBuf::from("/tmp/cp/node-a"));
        assert_eq!(spec.listen_peer_url, "http://0.0.0.0:2380");
        assert_eq!(spec.advertise_peer_url, "http://10.0.0.1:2380");
        assert_eq!(
            spec.listen_client_urls,
            vec!["http://127.0.0.1:2379", "http://10.0.0.1:2379"]
        );
        assert_eq!(spec.advertise_client_url, "http://10.0.0.1:2379");
    }

    #[test]
    fn test_loopback_advertise_listens_once() {
        let spec = StoreSettings::default().instance_spec(
            "solo",
            "127.0.0.1",
            String::new(),
            ClusterState::New,
        );
        assert_eq!(spec.listen_client_urls, vec!["http://127.0.0.1:2379"]);
    }

    #[test]
    fn test_default_status_listen() {
        assert_eq!(default_status_listen("10.0.0.1", 8080), "10.0.0.1:8080");
        assert_eq!(default_status_listen("node-a.internal", 8080), "node-a.internal:8080");
        assert_eq!(default_status_listen("fd00::1", 8080), "[fd00::1]:8080");
    }

    #[test]
    fn test_ipv6_advertise_urls_are_bracketed() {
        let settings = StoreSettings::default();
        assert_eq!(settings.peer_url("fd00::2"), "http://[fd00::2]:2380");
        assert_eq!(settings.client_url("fd00::2"), "http://[fd00::2]:2379");

        let spec = settings.instance_spec(
            "node-b",
            "fd00::2",
            "node-b=http://[fd00::2]:2380".to_string(),
            ClusterState::New,
        );
        assert_eq!(spec.advertise_peer_url, "http://[fd00::2]:2380");
        assert_eq!(
            spec.listen_client_urls,
            vec!["http://127.0.0.1:2379", "http://[fd00::2]:2379"]
        );
    }
}
