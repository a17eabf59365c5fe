pub mod bootstrap;
pub mod join;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::embedded::{EtcdLauncher, StoreInstance, StoreLauncher, Termination};
use crate::error::{ControlPlaneError, Result};
use crate::host::{HostProbe, LocalHost};
use crate::metadata::MetadataDetector;
use crate::registry::Registry;
use crate::status::{self, StatusState};
use crate::store::{EtcdConnector, StoreConnector};

pub use bootstrap::bootstrap;
pub use join::join;

/// Collaborators a workflow drives.
#[derive(Clone)]
pub struct Environment {
    pub launcher: Arc<dyn StoreLauncher>,
    pub connector: Arc<dyn StoreConnector>,
    pub host: Arc<dyn HostProbe>,
}

impl Environment {
    /// etcd processes, etcd clients and the real host.
    pub fn production(etcd_binary: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            launcher: Arc::new(EtcdLauncher::new(etcd_binary)?),
            connector: Arc::new(EtcdConnector),
            host: Arc::new(LocalHost::new(MetadataDetector::new()?)),
        })
    }
}

/// A registered node whose local store instance is running.
pub struct RunningNode {
    cluster: String,
    hostname: String,
    instance: StoreInstance,
    registry: Registry,
    status: Option<JoinHandle<()>>,
    status_shutdown: CancellationToken,
}

impl RunningNode {
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn instance(&self) -> &StoreInstance {
        &self.instance
    }

    /// Registry backed by the local instance.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Wait until the store instance exits or `cancel` fires.
    ///
    /// On cancellation the instance is stopped before returning.
    pub async fn serve(mut self, cancel: CancellationToken) -> Termination {
        let outcome = self.instance.wait_terminated(&cancel).await;
        match outcome {
            Termination::Stopped => info!("Store instance stopped. Exiting node {}", self.hostname),
            Termination::Cancelled => {
                info!("Shutting down node {}", self.hostname);
                self.instance.stop();
                // Supervisor marks termination once the instance is gone
                let never = CancellationToken::new();
                let _ = tokio::time::timeout(
                    Duration::from_secs(10),
                    self.instance.wait_terminated(&never),
                )
                .await;
            }
        }

        self.status_shutdown.cancel();
        if let Some(handle) = self.status.take() {
            if let Err(e) = handle.await {
                warn!("Status server task failed: {}", e);
            }
        }
        outcome
    }
}

/// Connect to the freshly started local instance.
async fn connect_local(
    connector: &dyn StoreConnector,
    endpoint: &str,
    dial_timeout: Duration,
) -> Result<Registry> {
    let store = connector
        .connect(endpoint, dial_timeout)
        .await
        .map_err(|source| ControlPlaneError::StoreConnect {
            endpoint: endpoint.to_string(),
            source,
        })?;
    Ok(Registry::new(store))
}

async fn start_status(
    listen: Option<&str>,
    state: StatusState,
    shutdown: &CancellationToken,
) -> Result<Option<JoinHandle<()>>> {
    match listen {
        Some(addr) => Ok(Some(
            status::spawn(addr, Arc::new(state), shutdown.clone()).await?,
        )),
        None => Ok(None),
    }
}

/// Stop `instance` if `result` is an error.
fn stop_on_error<T>(instance: &StoreInstance, result: Result<T>) -> Result<T> {
    if result.is_err() {
        instance.stop();
    }
    result
}
