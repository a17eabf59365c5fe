use crate::common::{bootstrap_config, port_of, status_addr, wait_for_port, TestCluster};
use controlplane::certs;
use controlplane::embedded::Termination;
use controlplane::registry::{metadata_key, peers_key};
use controlplane::store::CoordinationStore;
use std::time::Duration;

#[tokio::test]
async fn test_bootstrap_east1() {
    let mut cluster = TestCluster::new();
    let mut config = bootstrap_config("east1", "us-east", "10.0.0.1");
    config.issue_certificates = true;

    let node = cluster.bootstrap(&config, "node-a").await.unwrap();
    assert_eq!(node.cluster(), "east1");

    let store = cluster.cluster.store();
    let metadata: serde_json::Value =
        serde_json::from_slice(&store.get(&metadata_key("east1")).await.unwrap().unwrap()).unwrap();
    assert_eq!(
        metadata,
        serde_json::json!({"name": "east1", "region": "us-east"})
    );

    let registry = cluster.registry();
    let record = registry.get_node("east1", "node-a").await.unwrap().unwrap();
    assert_eq!(record.ip, "10.0.0.1");
    assert_eq!(record.labels.get("role").map(String::as_str), Some("control-plane"));

    // The founder records no peers; joiners append themselves
    assert!(store.get(&peers_key("east1")).await.unwrap().is_none());

    let stored = certs::load(&registry, "east1").await.unwrap();
    assert!(!stored.ca_cert.is_empty());
    assert!(!stored.server_cert.is_empty());
    assert!(!stored.server_key.is_empty());

    let members = store.members().await;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].name, "node-a");
    assert_eq!(members[0].peer_urls, vec!["http://10.0.0.1:2380"]);

    cluster.serve(node);
    assert_eq!(cluster.shutdown().await, vec![Termination::Cancelled]);
}

#[tokio::test]
async fn test_status_page_lists_founder() {
    let mut cluster = TestCluster::new();
    let addr = status_addr();
    let mut config = bootstrap_config("east1", "us-east", "10.0.0.1");
    config.status_listen = Some(addr.clone());

    let node = cluster.bootstrap(&config, "node-a").await.unwrap();
    cluster.serve(node);
    wait_for_port(port_of(&addr), Duration::from_secs(5)).await;

    let health: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .expect("Failed to reach status page")
        .json()
        .await
        .expect("Failed to parse health response");
    assert_eq!(health["status"], "ok");

    let page = reqwest::get(format!("http://{}/", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("Control Plane: east1"));
    assert!(page.contains("<td>node-a</td><td>10.0.0.1</td>"));

    cluster.shutdown().await;

    // Listener is released on shutdown
    assert!(tokio::net::TcpStream::connect(addr.as_str()).await.is_err());
}

#[tokio::test]
async fn test_invalid_bootstrap_leaves_store_untouched() {
    let cluster = TestCluster::new();
    let config = bootstrap_config("", "us-east", "10.0.0.1");

    assert!(cluster.bootstrap(&config, "node-a").await.is_err());
    assert!(cluster.cluster.launches().is_empty());
    assert!(cluster
        .cluster
        .store()
        .keys_with_prefix("/controlplane/")
        .await
        .unwrap()
        .is_empty());
}
