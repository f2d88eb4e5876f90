//! Object store abstraction consumed by the lifecycle adapter.

mod error;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::object::Object;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;

/// Write side of an object store.
///
/// The adapter only ever replaces a whole object by identity; reads are the
/// caller's business.
#[async_trait]
pub trait ObjectStore<T: Object>: Send + Sync {
    /// Replace the stored object `name` with `obj`, returning the new revision.
    ///
    /// Stale writes must fail with [`StoreError::VersionMismatch`] or
    /// [`StoreError::Conflict`]; a vanished object with [`StoreError::NotFound`].
    async fn update(&self, name: &str, obj: T) -> Result<u64>;
}

#[async_trait]
impl<T: Object, S: ObjectStore<T> + ?Sized> ObjectStore<T> for Arc<S> {
    async fn update(&self, name: &str, obj: T) -> Result<u64> {
        (**self).update(name, obj).await
    }
}
