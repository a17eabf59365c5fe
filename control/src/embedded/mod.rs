pub mod etcd;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{error, info};

use crate::error::{ControlPlaneError, Result};

pub use etcd::EtcdLauncher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    /// Form a brand-new replication group
    New,
    /// Join a group that already lists this member
    Existing,
}

impl ClusterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterState::New => "new",
            ClusterState::Existing => "existing",
        }
    }
}

/// Everything needed to start one store instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub name: String,
    pub data_dir: PathBuf,
    /// `name=peer_url,...` for every member including this one
    pub initial_cluster: String,
    pub cluster_state: ClusterState,
    pub listen_peer_url: String,
    pub advertise_peer_url: String,
    /// First entry is the loopback URL used for local clients
    pub listen_client_urls: Vec<String>,
    pub advertise_client_url: String,
}

#[async_trait]
pub trait StoreLauncher: Send + Sync {
    /// Spawn an instance. Returns once the process is started, not when it is ready.
    async fn launch(&self, spec: &InstanceSpec) -> Result<StoreInstance>;
}

/// How a wait on a running instance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The instance exited on its own
    Stopped,
    /// The caller cancelled the wait
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct StoreInstance {
    name: String,
    client_url: String,
    ready: CancellationToken,
    terminated: CancellationToken,
    shutdown: CancellationToken,
}

impl StoreInstance {
    pub fn new(name: &str, client_url: &str) -> Self {
        Self {
            name: name.to_string(),
            client_url: client_url.to_string(),
            ready: CancellationToken::new(),
            terminated: CancellationToken::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client_url(&self) -> &str {
        &self.client_url
    }

    pub fn mark_ready(&self) {
        self.ready.cancel();
    }

    pub fn mark_terminated(&self) {
        self.terminated.cancel();
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_cancelled()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.is_cancelled()
    }

    /// Ask the launcher's supervisor to stop the instance.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn shutdown_requested(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.cancelled()
    }

    /// Wait for readiness. On timeout the instance is stopped.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        tokio::select! {
            _ = self.ready.cancelled() => {
                info!("Store instance {} is ready", self.name);
                Ok(())
            }
            _ = self.terminated.cancelled() => {
                error!("Store instance {} exited before becoming ready", self.name);
                Err(ControlPlaneError::StoreStartup(format!(
                    "instance {} exited before becoming ready",
                    self.name
                )))
            }
            _ = tokio::time::sleep(timeout) => {
                error!("Store instance {} startup timeout", self.name);
                self.stop();
                Err(ControlPlaneError::StoreStartup(format!(
                    "instance {} not ready after {:?}",
                    self.name, timeout
                )))
            }
        }
    }

    /// Wait until the instance exits or `cancel` fires.
    pub async fn wait_terminated(&self, cancel: &CancellationToken) -> Termination {
        tokio::select! {
            _ = self.terminated.cancelled() => Termination::Stopped,
            _ = cancel.cancelled() => Termination::Cancelled,
        }
    }
}

/// Launch an instance and wait, bounded, for it to become ready.
pub async fn start_instance(
    launcher: &dyn StoreLauncher,
    spec: &InstanceSpec,
    ready_timeout: Duration,
) -> Result<StoreInstance> {
    info!(
        "Starting store instance: name={}, data_dir={:?}, initial_cluster={}, state={}, advertise_peer={}",
        spec.name,
        spec.data_dir,
        spec.initial_cluster,
        spec.cluster_state.as_str(),
        spec.advertise_peer_url
    );

    let instance = launcher.launch(spec).await?;
    instance.wait_ready(ready_timeout).await?;
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_ready_resolves_once_marked() {
        let instance = StoreInstance::new("node-a", "http://127.0.0.1:2379");
        let marker = instance.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            marker.mark_ready();
        });

        instance.wait_ready(Duration::from_secs(5)).await.unwrap();
        assert!(instance.is_ready());
    }

    #[tokio::test]
    async fn test_wait_ready_timeout_requests_shutdown() {
        let instance = StoreInstance::new("node-a", "http://127.0.0.1:2379");

        let err = instance
            .wait_ready(Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, ControlPlaneError::StoreStartup(_)));
        // The shutdown request must already be visible to the supervisor.
        tokio::time::timeout(Duration::from_millis(100), instance.shutdown_requested())
            .await
            .expect("timeout should request shutdown");
    }

    #[tokio::test]
    async fn test_early_exit_fails_startup() {
        let instance = StoreInstance::new("node-a", "http://127.0.0.1:2379");
        instance.mark_terminated();

        let err = instance
            .wait_ready(Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlPlaneError::StoreStartup(_)));
    }

    #[tokio::test]
    async fn test_wait_terminated_is_cancellable() {
        let instance = StoreInstance::new("node-a", "http://127.0.0.1:2379");
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(instance.wait_terminated(&cancel).await, Termination::Cancelled);

        instance.mark_terminated();
        let cancel = CancellationToken::new();
        assert_eq!(instance.wait_terminated(&cancel).await, Termination::Stopped);
    }
}
