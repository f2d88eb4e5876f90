//! Domain-side contract driven by the lifecycle adapter.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::object::Object;

/// Handler for the three lifecycle events of a managed object.
///
/// Each method may be called again for the same object after a failure, so
/// implementations must be safe to repeat.
#[async_trait]
pub trait LifecycleHandler<T: Object>: Send + Sync {
    /// First sighting of a live object.
    ///
    /// `obj` already carries the adapter's finalizer and initialization
    /// marker. Edits made here are persisted together with them.
    async fn initialize(&self, obj: &mut T) -> Result<()>;

    /// Cleanup before the object goes away.
    ///
    /// `obj` has the adapter's finalizer removed already. Edits made here are
    /// persisted together with the removal.
    async fn finalize(&self, obj: &mut T) -> Result<()>;

    /// Any later change to a live, initialized object.
    async fn updated(&self, obj: T) -> Result<()>;
}

#[async_trait]
impl<T: Object, H: LifecycleHandler<T> + ?Sized> LifecycleHandler<T> for Arc<H> {
    async fn initialize(&self, obj: &mut T) -> Result<()> {
        (**self).initialize(obj).await
    }

    async fn finalize(&self, obj: &mut T) -> Result<()> {
        (**self).finalize(obj).await
    }

    async fn updated(&self, obj: T) -> Result<()> {
        (**self).updated(obj).await
    }
}
