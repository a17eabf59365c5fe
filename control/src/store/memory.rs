use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

use super::{CoordinationStore, StoreConnector, StoreError};
use crate::embedded::{InstanceSpec, StoreInstance, StoreLauncher};
use crate::error::Result;
use crate::types::{Member, MemberAddResponse};

#[derive(Default)]
struct MemoryState {
    entries: BTreeMap<String, Vec<u8>>,
    members: Vec<Member>,
    next_member_id: u64,
    reject_member_add: Option<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose replication group already holds one started member.
    pub fn with_member(name: &str, peer_url: &str) -> Self {
        let state = MemoryState {
            members: vec![Member {
                id: 1,
                name: name.to_string(),
                peer_urls: vec![peer_url.to_string()],
            }],
            next_member_id: 1,
            ..MemoryState::default()
        };
        Self {
            state: RwLock::new(state),
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.state.write().await.entries.remove(key).is_some()
    }

    /// Make every following `member_add` fail with `reason`.
    pub async fn reject_member_add(&self, reason: &str) {
        self.state.write().await.reject_member_add = Some(reason.to_string());
    }

    pub async fn members(&self) -> Vec<Member> {
        self.state.read().await.members.clone()
    }

    /// Give a started member its name, as etcd does when the new node first talks to the group.
    async fn name_member(&self, peer_url: &str, name: &str) {
        let mut state = self.state.write().await;
        for member in state.members.iter_mut() {
            if member.name.is_empty() && member.peer_urls.iter().any(|u| u == peer_url) {
                member.name = name.to_string();
            }
        }
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, StoreError> {
        Ok(self.state.read().await.entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> std::result::Result<(), StoreError> {
        self.state
            .write()
            .await
            .entries
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get_prefix(
        &self,
        prefix: &str,
    ) -> std::result::Result<Vec<(String, Vec<u8>)>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> std::result::Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn member_add(
        &self,
        peer_urls: Vec<String>,
    ) -> std::result::Result<MemberAddResponse, StoreError> {
        let mut state = self.state.write().await;
        if let Some(reason) = &state.reject_member_add {
            return Err(StoreError::Rejected(reason.clone()));
        }

        let duplicate = state
            .members
            .iter()
            .any(|m| m.peer_urls.iter().any(|u| peer_urls.contains(u)));
        if duplicate {
            return Err(StoreError::Rejected(format!(
                "peer URLs {:?} already belong to a member",
                peer_urls
            )));
        }

        state.next_member_id += 1;
        let member_id = state.next_member_id;
        state.members.push(Member {
            id: member_id,
            name: String::new(),
            peer_urls,
        });

        Ok(MemberAddResponse {
            member_id,
            members: state.members.clone(),
        })
    }

    async fn member_list(&self) -> std::result::Result<Vec<Member>, StoreError> {
        Ok(self.state.read().await.members.clone())
    }
}

/// A shared [`MemoryStore`] reachable through a set of endpoints.
///
/// Launching an instance exposes its client URLs; [`MemoryCluster::expose`]
/// marks a pre-existing peer as reachable.
pub struct MemoryCluster {
    store: Arc<MemoryStore>,
    endpoints: Mutex<HashSet<String>>,
    launches: Mutex<Vec<InstanceSpec>>,
    instances: Mutex<Vec<StoreInstance>>,
    stall_startup: AtomicBool,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        Self {
            store: Arc::new(store),
            endpoints: Mutex::new(HashSet::new()),
            launches: Mutex::new(Vec::new()),
            instances: Mutex::new(Vec::new()),
            stall_startup: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    pub fn expose(&self, endpoint: &str) {
        lock(&self.endpoints).insert(endpoint.to_string());
    }

    /// Instances launched from now on never report readiness.
    pub fn stall_startup(&self) {
        self.stall_startup.store(true, Ordering::SeqCst);
    }

    pub fn launches(&self) -> Vec<InstanceSpec> {
        lock(&self.launches).clone()
    }

    pub fn instances(&self) -> Vec<StoreInstance> {
        lock(&self.instances).clone()
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl StoreConnector for MemoryCluster {
    async fn connect(
        &self,
        endpoint: &str,
        _dial_timeout: Duration,
    ) -> std::result::Result<Arc<dyn CoordinationStore>, StoreError> {
        if lock(&self.endpoints).contains(endpoint) {
            Ok(self.store.clone())
        } else {
            Err(StoreError::Unavailable(format!(
                "no instance listening on {}",
                endpoint
            )))
        }
    }
}

#[async_trait]
impl StoreLauncher for MemoryCluster {
    async fn launch(&self, spec: &InstanceSpec) -> Result<StoreInstance> {
        lock(&self.launches).push(spec.clone());

        let instance = StoreInstance::new(&spec.name, &spec.advertise_client_url);
        lock(&self.instances).push(instance.clone());

        if self.stall_startup.load(Ordering::SeqCst) {
            let stalled = instance.clone();
            tokio::spawn(async move {
                stalled.shutdown_requested().await;
                stalled.mark_terminated();
            });
            return Ok(instance);
        }

        self.store
            .name_member(&spec.advertise_peer_url, &spec.name)
            .await;
        {
            let mut endpoints = lock(&self.endpoints);
            for url in &spec.listen_client_urls {
                endpoints.insert(url.clone());
            }
        }
        instance.mark_ready();

        let supervised = instance.clone();
        tokio::spawn(async move {
            supervised.shutdown_requested().await;
            supervised.mark_terminated();
        });

        Ok(instance)
    }
}
