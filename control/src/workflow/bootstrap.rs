use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{connect_local, start_status, stop_on_error, Environment, RunningNode};
use crate::certs::{self, generate_tls_bundle};
use crate::config::BootstrapConfig;
use crate::embedded::{start_instance, ClusterState};
use crate::error::Result;
use crate::host::control_plane_record;
use crate::registry::Registry;
use crate::status::StatusState;
use crate::types::{ClusterMetadata, StoredCertificates};

/// Form a new single-member cluster and register this node as its founder.
///
/// Configuration is validated before anything is started. Any failure after
/// the store is up stops the instance; nothing is retried.
pub async fn bootstrap(config: &BootstrapConfig, env: &Environment) -> Result<RunningNode> {
    config.validate()?;

    info!(
        "Bootstrapping control plane: name={}, region={}, data_dir={:?}, advertise_address={}",
        config.name, config.region, config.store.data_dir, config.advertise_address
    );

    let hostname = env.host.hostname()?;
    let initial_cluster = format!(
        "{}={}",
        hostname,
        config.store.peer_url(&config.advertise_address)
    );
    let spec = config.store.instance_spec(
        &hostname,
        &config.advertise_address,
        initial_cluster,
        ClusterState::New,
    );

    let instance = start_instance(env.launcher.as_ref(), &spec, config.timeouts.store_ready).await?;

    let status_shutdown = CancellationToken::new();
    let result = register_founder(config, env, &hostname, &status_shutdown).await;
    let (registry, status) = stop_on_error(&instance, result)?;

    info!("Control plane {} initialized and node {} registered", config.name, hostname);

    Ok(RunningNode {
        cluster: config.name.clone(),
        hostname,
        instance,
        registry,
        status,
        status_shutdown,
    })
}

async fn register_founder(
    config: &BootstrapConfig,
    env: &Environment,
    hostname: &str,
    status_shutdown: &CancellationToken,
) -> Result<(Registry, Option<JoinHandle<()>>)> {
    let registry = connect_local(
        env.connector.as_ref(),
        &config.store.local_client_url(),
        config.timeouts.local_dial,
    )
    .await?;

    registry
        .put_metadata(&ClusterMetadata {
            name: config.name.clone(),
            region: config.region.clone(),
        })
        .await?;
    info!("Stored metadata for control plane {}", config.name);

    let meta = env.host.detect_metadata().await;
    let node = control_plane_record(hostname, &config.advertise_address, meta);
    registry.put_node(&config.name, &node).await?;
    info!(
        "Registered founding node: hostname={}, ip={}, provider={}",
        node.hostname, node.ip, node.provider
    );

    if config.issue_certificates {
        // RSA key generation is CPU bound
        let host = config.advertise_address.clone();
        let bundle = tokio::task::spawn_blocking(move || generate_tls_bundle(&host)).await??;
        certs::save(&registry, &config.name, &StoredCertificates::from(&bundle)).await?;
    }

    let status = start_status(
        config.status_listen.as_deref(),
        StatusState {
            registry: registry.clone(),
            cluster: config.name.clone(),
            hostname: hostname.to_string(),
            ip: config.advertise_address.clone(),
        },
        status_shutdown,
    )
    .await?;

    Ok((registry, status))
}
