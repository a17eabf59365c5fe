use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::{InstanceSpec, StoreInstance, StoreLauncher};
use crate::error::{ControlPlaneError, Result};

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Deserialize)]
struct HealthStatus {
    health: String,
}

/// Runs an `etcd` server process per instance.
pub struct EtcdLauncher {
    binary: PathBuf,
    http: reqwest::Client,
}

impl EtcdLauncher {
    pub fn new(binary: impl Into<PathBuf>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()
            .map_err(|e| {
                ControlPlaneError::StoreStartup(format!("failed to create health client: {}", e))
            })?;

        Ok(Self {
            binary: binary.into(),
            http,
        })
    }
}

/// Command-line flags for an etcd server described by `spec`.
pub fn command_args(spec: &InstanceSpec) -> Vec<String> {
    vec![
        "--name".to_string(),
        spec.name.clone(),
        "--data-dir".to_string(),
        spec.data_dir.to_string_lossy().into_owned(),
        "--listen-peer-urls".to_string(),
        spec.listen_peer_url.clone(),
        "--initial-advertise-peer-urls".to_string(),
        spec.advertise_peer_url.clone(),
        "--listen-client-urls".to_string(),
        spec.listen_client_urls.join(","),
        "--advertise-client-urls".to_string(),
        spec.advertise_client_url.clone(),
        "--initial-cluster".to_string(),
        spec.initial_cluster.clone(),
        "--initial-cluster-state".to_string(),
        spec.cluster_state.as_str().to_string(),
        "--log-level".to_string(),
        "error".to_string(),
    ]
}

#[async_trait]
impl StoreLauncher for EtcdLauncher {
    async fn launch(&self, spec: &InstanceSpec) -> Result<StoreInstance> {
        let Some(local_url) = spec.listen_client_urls.first() else {
            return Err(ControlPlaneError::StoreStartup(
                "instance has no client URL".to_string(),
            ));
        };
        let health_url = format!("{}/health", local_url);

        tokio::fs::create_dir_all(&spec.data_dir)
            .await
            .map_err(|e| {
                ControlPlaneError::StoreStartup(format!(
                    "failed to create data directory {:?}: {}",
                    spec.data_dir, e
                ))
            })?;

        let mut child = Command::new(&self.binary)
            .args(command_args(spec))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ControlPlaneError::StoreStartup(format!(
                    "failed to spawn {:?}: {}",
                    self.binary, e
                ))
            })?;

        info!("Spawned etcd for {} (pid {:?})", spec.name, child.id());

        let instance = StoreInstance::new(&spec.name, &spec.advertise_client_url);

        // Supervisor: owns the child until it exits or a stop is requested
        let supervised = instance.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => info!("etcd {} exited: {}", supervised.name(), status),
                    Err(e) => error!("Failed to wait on etcd {}: {}", supervised.name(), e),
                },
                _ = supervised.shutdown_requested() => {
                    info!("Stopping etcd {}", supervised.name());
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill etcd {}: {}", supervised.name(), e);
                    }
                }
            }
            supervised.mark_terminated();
        });

        let http = self.http.clone();
        let probed = instance.clone();
        tokio::spawn(async move {
            while !probed.is_terminated() {
                if is_healthy(&http, &health_url).await {
                    probed.mark_ready();
                    return;
                }
                tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
            }
        });

        Ok(instance)
    }
}

async fn is_healthy(http: &reqwest::Client, url: &str) -> bool {
    let resp = match http.get(url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            debug!("Health probe {} failed: {}", url, e);
            return false;
        }
    };

    match resp.json::<HealthStatus>().await {
        Ok(status) => status.health == "true",
        Err(e) => {
            debug!("Unreadable health response from {}: {}", url, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedded::ClusterState;

    fn spec() -> InstanceSpec {
        InstanceSpec {
            name: "node-b".to_string(),
            data_dir: PathBuf::from("/var/lib/controlplane/etcd/node-b"),
            initial_cluster: "node-a=http://10.0.0.1:2380,node-b=http://10.0.0.2:2380"
                .to_string(),
            cluster_state: ClusterState::Existing,
            listen_peer_url: "http://0.0.0.0:2380".to_string(),
            advertise_peer_url: "http://10.0.0.2:2380".to_string(),
            listen_client_urls: vec![
                "http://127.0.0.1:2379".to_string(),
                "http://10.0.0.2:2379".to_string(),
            ],
            advertise_client_url: "http://10.0.0.2:2379".to_string(),
        }
    }

    fn flag<'a>(args: &'a [String], name: &str) -> &'a str {
        let pos = args.iter().position(|a| a == name).unwrap();
        &args[pos + 1]
    }

    #[test]
    fn test_command_args() {
        let args = command_args(&spec());

        assert_eq!(flag(&args, "--name"), "node-b");
        assert_eq!(flag(&args, "--initial-cluster-state"), "existing");
        assert_eq!(
            flag(&args, "--listen-client-urls"),
            "http://127.0.0.1:2379,http://10.0.0.2:2379"
        );
        assert_eq!(
            flag(&args, "--initial-cluster"),
            "node-a=http://10.0.0.1:2380,node-b=http://10.0.0.2:2380"
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = spec();
        spec.data_dir = dir.path().join("node-b");

        let launcher = EtcdLauncher::new(dir.path().join("no-such-etcd")).unwrap();
        let err = launcher.launch(&spec).await.unwrap_err();

        assert!(matches!(err, ControlPlaneError::StoreStartup(_)));
        assert!(spec.data_dir.exists());
    }
}
