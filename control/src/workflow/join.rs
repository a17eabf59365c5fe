use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{connect_local, start_status, stop_on_error, Environment, RunningNode};
use crate::config::JoinConfig;
use crate::embedded::{start_instance, ClusterState};
use crate::error::{ControlPlaneError, Result};
use crate::host::control_plane_record;
use crate::registry::{node_key, Registry};
use crate::status::StatusState;
use crate::types::{MemberAddResponse, PeerList};

/// Enroll this node into the cluster that `config.peer_address` belongs to.
///
/// The member is added to the replication group through the peer before the
/// local instance starts; a store that is not yet a member would be refused
/// by the group. If the local instance then fails to start, the member stays
/// registered and has to be removed by an operator.
pub async fn join(config: &JoinConfig, env: &Environment) -> Result<RunningNode> {
    config.validate()?;

    let peer_endpoint = config.peer_endpoint();
    info!(
        "Joining control plane via peer={}, data_dir={:?}, advertise_address={}",
        peer_endpoint, config.store.data_dir, config.advertise_address
    );

    // Step 1: connect to the peer
    let peer_store = env
        .connector
        .connect(&peer_endpoint, config.timeouts.peer_dial)
        .await
        .map_err(|source| ControlPlaneError::StoreConnect {
            endpoint: peer_endpoint.clone(),
            source,
        })?;
    let peer = Registry::new(peer_store);
    info!("Connected to peer={}", peer_endpoint);

    // Step 2: discover the cluster name
    let cluster = peer.discover_cluster().await?;
    match peer.get_metadata(&cluster).await? {
        Some(meta) => info!("Discovered control plane {} (region {})", meta.name, meta.region),
        None => info!("Discovered control plane {}", cluster),
    }

    // Step 3: current peer list
    let peers = peer.get_peers(&cluster).await?;

    // Step 4: local identity
    let hostname = env.host.hostname()?;
    let ip = env.host.outbound_ip().await?;
    info!("Local node info: hostname={}, ip={}", hostname, ip);

    // Step 5: membership change, strictly before local startup
    let peer_url = config.store.peer_url(&config.advertise_address);
    let added = peer
        .store()
        .member_add(vec![peer_url.clone()])
        .await
        .map_err(|e| {
            error!("Failed to add member {} to the cluster: {}", peer_url, e);
            ControlPlaneError::Membership(e)
        })?;
    info!("Added member {:x} with peer URL {}", added.member_id, peer_url);

    // Step 6: initial cluster for an "existing" start
    let initial_cluster = initial_cluster(&added, &hostname, &peer_url);
    info!("Built initial cluster string: {}", initial_cluster);

    // Step 7: start the local instance
    let spec = config.store.instance_spec(
        &hostname,
        &config.advertise_address,
        initial_cluster,
        ClusterState::Existing,
    );
    let instance = start_instance(env.launcher.as_ref(), &spec, config.timeouts.store_ready)
        .await
        .map_err(|e| {
            error!(
                "Member {:x} ({}) is part of the cluster but its store is not running; remove it manually",
                added.member_id, peer_url
            );
            e
        })?;
    info!("Store instance started and joined cluster {}", cluster);

    // Steps 8-10: register through the local instance
    let status_shutdown = CancellationToken::new();
    let result = register_member(config, env, &cluster, &hostname, &ip, peers, &status_shutdown).await;
    let (registry, status) = stop_on_error(&instance, result)?;

    info!("Node {} successfully joined control plane {}", hostname, cluster);

    Ok(RunningNode {
        cluster,
        hostname,
        instance,
        registry,
        status,
        status_shutdown,
    })
}

async fn register_member(
    config: &JoinConfig,
    env: &Environment,
    cluster: &str,
    hostname: &str,
    ip: &str,
    mut peers: PeerList,
    status_shutdown: &CancellationToken,
) -> Result<(Registry, Option<JoinHandle<()>>)> {
    let registry = connect_local(
        env.connector.as_ref(),
        &config.store.local_client_url(),
        config.timeouts.local_dial,
    )
    .await?;

    let meta = env.host.detect_metadata().await;
    let node = control_plane_record(hostname, ip, meta);
    registry.put_node(cluster, &node).await?;
    info!("Registered node: key={}, ip={}", node_key(cluster, hostname), ip);

    // Last writer wins; concurrent joins can drop each other's entries
    peers.push(ip.to_string());
    registry.put_peers(cluster, &peers).await?;
    info!("Updated peer list: cluster={}, peers={:?}", cluster, peers);

    let status = start_status(
        config.status_listen.as_deref(),
        StatusState {
            registry: registry.clone(),
            cluster: cluster.to_string(),
            hostname: hostname.to_string(),
            ip: ip.to_string(),
        },
        status_shutdown,
    )
    .await?;

    Ok((registry, status))
}

/// `name=url,...` for the existing members followed by this node.
///
/// The member just added has no name yet; it is replaced by `local_name`.
pub fn initial_cluster(added: &MemberAddResponse, local_name: &str, local_peer_url: &str) -> String {
    added
        .members
        .iter()
        .filter(|m| m.id != added.member_id)
        .flat_map(|m| m.peer_urls.iter().map(move |url| format!("{}={}", m.name, url)))
        .chain(std::iter::once(format!("{}={}", local_name, local_peer_url)))
        .collect::<Vec<_>>()
        .join(",")
}
