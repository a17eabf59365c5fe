use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, GetOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{CoordinationStore, StoreConnector, StoreError};
use crate::types::{Member, MemberAddResponse};

/// Per-request deadline once a connection is established.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// etcd v3 client bound to a single endpoint.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Connect and confirm the endpoint answers a status request.
    pub async fn connect(endpoint: &str, dial_timeout: Duration) -> Result<Self, StoreError> {
        debug!("Connecting to etcd at {}", endpoint);

        let options = ConnectOptions::new()
            .with_connect_timeout(dial_timeout)
            .with_timeout(REQUEST_TIMEOUT);

        let mut client = tokio::time::timeout(dial_timeout, Client::connect([endpoint], Some(options)))
            .await
            .map_err(|_| StoreError::Timeout(dial_timeout))??;

        // The channel connects lazily; force a round-trip so dial failures show up here.
        tokio::time::timeout(dial_timeout, client.status())
            .await
            .map_err(|_| StoreError::Timeout(dial_timeout))??;

        Ok(Self { client })
    }
}

fn to_member(member: &etcd_client::Member) -> Member {
    Member {
        id: member.id(),
        name: member.name().to_string(),
        peer_urls: member.peer_urls().to_vec(),
    }
}

#[async_trait]
impl CoordinationStore for EtcdStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut client = self.client.clone();
        let resp = client.get(key, None).await?;
        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        client.put(key, value, None).await?;
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;

        Ok(resp
            .kvs()
            .iter()
            .map(|kv| {
                (
                    String::from_utf8_lossy(kv.key()).into_owned(),
                    kv.value().to_vec(),
                )
            })
            .collect())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix().with_keys_only()))
            .await?;

        Ok(resp
            .kvs()
            .iter()
            .map(|kv| String::from_utf8_lossy(kv.key()).into_owned())
            .collect())
    }

    async fn member_add(&self, peer_urls: Vec<String>) -> Result<MemberAddResponse, StoreError> {
        let mut client = self.client.clone();
        let resp = client.member_add(peer_urls, None).await?;

        let member_id = resp
            .member()
            .map(|m| m.id())
            .ok_or_else(|| StoreError::Rejected("member add returned no member".to_string()))?;

        Ok(MemberAddResponse {
            member_id,
            members: resp.member_list().iter().map(to_member).collect(),
        })
    }

    async fn member_list(&self) -> Result<Vec<Member>, StoreError> {
        let mut client = self.client.clone();
        let resp = client.member_list().await?;
        Ok(resp.members().iter().map(to_member).collect())
    }
}

/// Connector that dials real etcd endpoints.
#[derive(Debug, Clone, Default)]
pub struct EtcdConnector;

#[async_trait]
impl StoreConnector for EtcdConnector {
    async fn connect(
        &self,
        endpoint: &str,
        dial_timeout: Duration,
    ) -> Result<Arc<dyn CoordinationStore>, StoreError> {
        let store = EtcdStore::connect(endpoint, dial_timeout).await?;
        Ok(Arc::new(store))
    }
}
