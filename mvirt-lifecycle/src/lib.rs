//! mvirt-lifecycle: finalizer and initialization-marker protocol for managed objects.
//!
//! A [`LifecycleAdapter`] wraps a domain [`LifecycleHandler`] and turns the
//! generic "reconcile this key" call into exactly-once `initialize`, guarded
//! `finalize` on deletion and `updated` for every other change.

pub mod adapter;
pub mod error;
pub mod handler;
pub mod object;
pub mod store;

pub use adapter::{INITIALIZED_LABEL_PREFIX, LifecycleAdapter};
pub use error::{LifecycleError, Phase, Result};
pub use handler::LifecycleHandler;
pub use object::{DynamicObject, MetadataError, Object, ObjectMeta, Resource};
pub use store::{MemoryStore, ObjectStore, StoreError};
