//! In-memory object store with API-server-like write semantics.
//!
//! - every successful write bumps a store-wide revision
//! - updates carrying a stale `resource_version` are rejected
//! - deleting an object with finalizers only sets its deletion marker
//! - the object disappears once a write leaves a deleting object without finalizers

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use super::error::{Result, StoreError};
use super::ObjectStore;
use crate::object::{MetadataError, Object};

struct Inner<T> {
    objects: HashMap<String, T>,
    revision: u64,
    updates: u64,
}

impl<T> Inner<T> {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

/// Object store held entirely in memory.
pub struct MemoryStore<T> {
    inner: RwLock<Inner<T>>,
}

fn malformed(e: MetadataError) -> StoreError {
    StoreError::Internal(format!("malformed object: {}", e))
}

impl<T: Object> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                objects: HashMap::new(),
                revision: 0,
                updates: 0,
            }),
        }
    }

    /// Insert a new object, assigning its first revision.
    pub async fn create(&self, mut obj: T) -> Result<T> {
        let mut inner = self.inner.write().await;
        let name = crate::object::accessor(&obj).map_err(malformed)?.name.clone();
        if inner.objects.contains_key(&name) {
            return Err(StoreError::Conflict(format!("{} already exists", name)));
        }

        let revision = inner.next_revision();
        obj.metadata_mut().map_err(malformed)?.resource_version = revision;
        inner.objects.insert(name.clone(), obj.clone());
        debug!("Created {} at revision {}", name, revision);
        Ok(obj)
    }

    pub async fn get(&self, name: &str) -> Option<T> {
        self.inner.read().await.objects.get(name).cloned()
    }

    /// Names of all stored objects, sorted.
    pub async fn names(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut names: Vec<String> = inner.objects.keys().cloned().collect();
        names.sort();
        names
    }

    /// All stored objects, sorted by name.
    pub async fn list(&self) -> Vec<T> {
        let inner = self.inner.read().await;
        let mut names: Vec<&String> = inner.objects.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|n| inner.objects.get(n).cloned())
            .collect()
    }

    /// Request deletion of `name`.
    ///
    /// Objects without finalizers are removed at once; the rest get a
    /// deletion marker and stay until their finalizers are cleared.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .objects
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let meta = stored.metadata().map_err(malformed)?;

        if meta.finalizers.is_empty() {
            inner.objects.remove(name);
            debug!("Deleted {}", name);
            return Ok(());
        }
        if meta.is_deleting() {
            return Ok(());
        }

        let revision = inner.next_revision();
        let obj = inner
            .objects
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let meta = obj.metadata_mut().map_err(malformed)?;
        meta.deletion_timestamp = Some(Utc::now());
        meta.resource_version = revision;
        debug!(
            "Marked {} for deletion, waiting on finalizers {:?}",
            name, meta.finalizers
        );
        Ok(())
    }

    /// Number of successful `update` calls so far.
    pub async fn updates(&self) -> u64 {
        self.inner.read().await.updates
    }
}

impl<T: Object> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Object> ObjectStore<T> for MemoryStore<T> {
    async fn update(&self, name: &str, mut obj: T) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .objects
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let stored_meta = stored.metadata().map_err(malformed)?;
        let current = stored_meta.resource_version;
        let deletion_timestamp = stored_meta.deletion_timestamp;

        let meta = obj.metadata_mut().map_err(malformed)?;
        if meta.name != name {
            return Err(StoreError::Conflict(format!(
                "object name {} does not match {}",
                meta.name, name
            )));
        }
        if meta.resource_version != current {
            return Err(StoreError::VersionMismatch {
                expected: current,
                actual: meta.resource_version,
            });
        }

        let revision = inner.next_revision();
        inner.updates += 1;

        let meta = obj.metadata_mut().map_err(malformed)?;
        meta.resource_version = revision;
        // The deletion marker is owned by the store.
        meta.deletion_timestamp = deletion_timestamp;

        if meta.is_deleting() && meta.finalizers.is_empty() {
            inner.objects.remove(name);
            debug!("Finalizers cleared, removed {}", name);
        } else {
            inner.objects.insert(name.to_string(), obj);
            debug!("Updated {} to revision {}", name, revision);
        }
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Resource;

    type Vm = Resource<u32>;

    #[tokio::test]
    async fn create_assigns_revision_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let vm = store.create(Vm::new("vm-1", 2)).await.unwrap();
        assert_eq!(vm.metadata.resource_version, 1);

        let err = store.create(Vm::new("vm-1", 4)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_checks_revision() {
        let store = MemoryStore::new();
        let vm = store.create(Vm::new("vm-1", 2)).await.unwrap();

        let mut fresh = vm.clone();
        fresh.spec = 8;
        let revision = store.update("vm-1", fresh).await.unwrap();
        assert_eq!(revision, 2);
        assert_eq!(store.get("vm-1").await.unwrap().spec, 8);

        let err = store.update("vm-1", vm).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::VersionMismatch {
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(store.updates().await, 1);
    }

    #[tokio::test]
    async fn update_missing_object_is_not_found() {
        let store: MemoryStore<Vm> = MemoryStore::new();
        let err = store.update("ghost", Vm::new("ghost", 0)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_without_finalizers_removes() {
        let store = MemoryStore::new();
        store.create(Vm::new("vm-1", 2)).await.unwrap();
        store.delete("vm-1").await.unwrap();
        assert!(store.get("vm-1").await.is_none());
    }

    #[tokio::test]
    async fn delete_waits_for_finalizers() {
        let store = MemoryStore::new();
        let mut vm = Vm::new("vm-1", 2);
        vm.metadata.finalizers = vec!["a".into(), "b".into()];
        store.create(vm).await.unwrap();

        store.delete("vm-1").await.unwrap();
        let mut vm = store.get("vm-1").await.unwrap();
        assert!(vm.metadata.is_deleting());

        // Clients cannot clear the deletion marker.
        vm.metadata.deletion_timestamp = None;
        vm.metadata.remove_finalizer("a");
        store.update("vm-1", vm).await.unwrap();
        let mut vm = store.get("vm-1").await.unwrap();
        assert!(vm.metadata.is_deleting());
        assert_eq!(vm.metadata.finalizers, vec!["b"]);

        vm.metadata.remove_finalizer("b");
        store.update("vm-1", vm).await.unwrap();
        assert!(store.get("vm-1").await.is_none());
        assert!(store.names().await.is_empty());
    }

    #[tokio::test]
    async fn list_is_sorted_by_name() {
        let store = MemoryStore::new();
        for name in ["c", "a", "b"] {
            store.create(Vm::new(name, 1)).await.unwrap();
        }
        let names: Vec<String> = store
            .list()
            .await
            .into_iter()
            .map(|vm| vm.metadata.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(store.names().await, names);
    }
}
