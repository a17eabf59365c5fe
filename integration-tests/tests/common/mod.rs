use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use controlplane::config::{BootstrapConfig, JoinConfig};
use controlplane::embedded::Termination;
use controlplane::host::StaticHost;
use controlplane::registry::Registry;
use controlplane::store::{MemoryCluster, MemoryStore};
use controlplane::types::ClusterMetadata;
use controlplane::workflow::{self, Environment, RunningNode};

/// Find a free TCP port by binding to port 0
pub fn find_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to port 0");
    listener.local_addr().unwrap().port()
}

/// Wait for a TCP port to accept connections
pub async fn wait_for_port(port: u16, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if tokio::time::Instant::now() > deadline {
            panic!("Timed out waiting for port {} to be ready", port);
        }
        if tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port))
            .await
            .is_ok()
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Loopback status address on a fresh port
pub fn status_addr() -> String {
    format!("127.0.0.1:{}", find_free_port())
}

pub fn port_of(addr: &str) -> u16 {
    addr.rsplit(':').next().and_then(|p| p.parse().ok()).expect("address has a port")
}

/// A replication group shared by every node the test starts
pub struct TestCluster {
    pub cluster: Arc<MemoryCluster>,
    cancel: CancellationToken,
    serving: Vec<JoinHandle<Termination>>,
}

impl TestCluster {
    /// No members, no registry data
    pub fn new() -> Self {
        Self::from_cluster(MemoryCluster::new())
    }

    /// A running cluster `name` whose only member answers on `peer_ip:2379`
    pub async fn existing(name: &str, region: &str, peer_hostname: &str, peer_ip: &str) -> Self {
        let cluster = MemoryCluster::with_store(MemoryStore::with_member(
            peer_hostname,
            &format!("http://{}:2380", peer_ip),
        ));
        cluster.expose(&format!("http://{}:2379", peer_ip));

        let test = Self::from_cluster(cluster);
        test.registry()
            .put_metadata(&ClusterMetadata {
                name: name.to_string(),
                region: region.to_string(),
            })
            .await
            .expect("Failed to seed cluster metadata");
        test
    }

    fn from_cluster(cluster: MemoryCluster) -> Self {
        Self {
            cluster: Arc::new(cluster),
            cancel: CancellationToken::new(),
            serving: Vec::new(),
        }
    }

    /// Direct view of the shared key space
    pub fn registry(&self) -> Registry {
        Registry::new(self.cluster.store())
    }

    pub fn environment(&self, hostname: &str, ip: &str) -> Environment {
        Environment {
            launcher: self.cluster.clone(),
            connector: self.cluster.clone(),
            host: Arc::new(StaticHost::new(hostname, ip)),
        }
    }

    pub async fn bootstrap(
        &self,
        config: &BootstrapConfig,
        hostname: &str,
    ) -> controlplane::Result<RunningNode> {
        let env = self.environment(hostname, &config.advertise_address);
        workflow::bootstrap(config, &env).await
    }

    pub async fn join(&self, config: &JoinConfig, hostname: &str) -> controlplane::Result<RunningNode> {
        let env = self.environment(hostname, &config.advertise_address);
        workflow::join(config, &env).await
    }

    /// Keep `node` serving until [`TestCluster::shutdown`]
    pub fn serve(&mut self, node: RunningNode) {
        self.serving.push(tokio::spawn(node.serve(self.cancel.clone())));
    }

    /// Cancel every served node and collect how each one ended
    pub async fn shutdown(self) -> Vec<Termination> {
        self.cancel.cancel();
        let mut outcomes = Vec::new();
        for handle in self.serving {
            outcomes.push(handle.await.expect("serve task panicked"));
        }
        outcomes
    }
}

/// Bootstrap config that skips RSA generation unless a test wants it
pub fn bootstrap_config(name: &str, region: &str, ip: &str) -> BootstrapConfig {
    let mut config = BootstrapConfig::new(name, region, ip);
    config.issue_certificates = false;
    config
}
