// src/testing.rs

//! In-memory stand-ins for the remote collaborators.
//!
//! [`InMemoryResourceApi`] behaves like the resource API closely enough to drive
//! readiness waits and optimistic-concurrency paths: `create` assigns version
//! `"1"`, every `update` must carry the current version and bumps it.
//!
//! ```ignore
//! let api = InMemoryResourceApi::new();
//! api.insert(resource)?;
//! api.script_statuses(&key, vec![
//!     ResourceStatus::with_phase("Provisioning"),
//!     ResourceStatus::ready("10.0.0.1"),
//! ])?;
//! let endpoint = ReadinessPoller::new(&api, settings)?
//!     .wait_until_ready(&key, &CancellationToken::new())
//!     .await?;
//! ```

use crate::error::SpotError;
use crate::exchange::{ClientApp, ClientAppDirectory};
use crate::resource::{ApiError, NamespacedName, RemoteResource, ResourceApi, ResourceStatus};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Store {
    objects: HashMap<NamespacedName, RemoteResource>,
    scripts: HashMap<NamespacedName, VecDeque<ResourceStatus>>,
}

/// A [`ResourceApi`] backed by a map.
#[derive(Default)]
pub struct InMemoryResourceApi {
    store: Mutex<Store>,
    get_calls: AtomicUsize,
    fail_gets: AtomicBool,
}

impl InMemoryResourceApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> Result<MutexGuard<'_, Store>, ApiError> {
        self.store
            .lock()
            .map_err(|_| ApiError::Transport("in-memory store is poisoned".to_string()))
    }

    /// Stores `resource` as-is, replacing any existing object.
    pub fn insert(&self, resource: RemoteResource) -> Result<(), ApiError> {
        self.store()?.objects.insert(resource.key(), resource);
        Ok(())
    }

    /// Queues statuses returned by successive `get` calls for `key`.
    ///
    /// Each call consumes one entry; the last entry sticks.
    pub fn script_statuses(
        &self,
        key: &NamespacedName,
        statuses: Vec<ResourceStatus>,
    ) -> Result<(), ApiError> {
        self.store()?.scripts.insert(key.clone(), statuses.into());
        Ok(())
    }

    /// Makes every subsequent `get` fail with a transport error.
    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Number of `get` calls so far, including failed ones.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceApi for InMemoryResourceApi {
    async fn get(&self, key: &NamespacedName) -> Result<RemoteResource, ApiError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(ApiError::Transport(format!("connection refused fetching {key}")));
        }

        let mut store = self.store()?;
        let next_status = match store.scripts.get_mut(key) {
            Some(script) if script.len() > 1 => script.pop_front(),
            Some(script) => script.front().cloned(),
            None => None,
        };
        let object = store
            .objects
            .get_mut(key)
            .ok_or_else(|| ApiError::NotFound(key.to_string()))?;
        if let Some(status) = next_status {
            object.status = status;
        }
        Ok(object.clone())
    }

    async fn create(&self, resource: &RemoteResource) -> Result<RemoteResource, ApiError> {
        let key = resource.key();
        let mut store = self.store()?;
        if store.objects.contains_key(&key) {
            return Err(ApiError::AlreadyExists(key.to_string()));
        }
        let mut created = resource.clone();
        created.metadata.resource_version = Some("1".to_string());
        store.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(&self, resource: &RemoteResource) -> Result<RemoteResource, ApiError> {
        let key = resource.key();
        let mut store = self.store()?;
        let current = store
            .objects
            .get_mut(&key)
            .ok_or_else(|| ApiError::NotFound(key.to_string()))?;

        if current.metadata.resource_version != resource.metadata.resource_version {
            return Err(ApiError::Conflict {
                resource: key.to_string(),
                expected: resource.metadata.resource_version.clone(),
                actual: current.metadata.resource_version.clone(),
            });
        }

        let next_version = current
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        let mut updated = resource.clone();
        updated.metadata.resource_version = Some(next_version.to_string());
        *current = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, key: &NamespacedName) -> Result<(), ApiError> {
        let mut store = self.store()?;
        store.scripts.remove(key);
        store
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(key.to_string()))
    }

    async fn list(
        &self,
        kind: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<RemoteResource>, ApiError> {
        let store = self.store()?;
        let mut items: Vec<RemoteResource> = store
            .objects
            .values()
            .filter(|r| r.kind == kind)
            .filter(|r| namespace.map_or(true, |ns| r.metadata.namespace == ns))
            .cloned()
            .collect();
        items.sort_by_key(|r| r.key().to_string());
        Ok(items)
    }
}

/// A [`ClientAppDirectory`] returning a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticClientAppDirectory {
    apps: Vec<ClientApp>,
}

impl StaticClientAppDirectory {
    pub fn new(apps: Vec<ClientApp>) -> Self {
        Self { apps }
    }

    /// A directory holding one complete record.
    pub fn single(name: &str, client_id: &str, domain: &str) -> Self {
        Self::new(vec![ClientApp {
            name: Some(name.to_string()),
            client_id: Some(client_id.to_string()),
            domain: Some(domain.to_string()),
        }])
    }
}

#[async_trait]
impl ClientAppDirectory for StaticClientAppDirectory {
    async fn client_apps(&self) -> Result<Vec<ClientApp>, SpotError> {
        Ok(self.apps.clone())
    }
}
