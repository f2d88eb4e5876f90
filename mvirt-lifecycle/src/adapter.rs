//! Lifecycle adapter - runs the finalize / initialize / updated protocol
//! around a [`LifecycleHandler`].
//!
//! Protocol state lives on the object itself: the adapter's name doubles as
//! its finalizer token, and a label derived from the name records that
//! `initialize` already ran. Each reconcile looks at one snapshot, calls at
//! most one handler method and performs at most one store write.

use std::marker::PhantomData;

use tracing::{debug, info};

use crate::error::{LifecycleError, Phase, Result};
use crate::handler::LifecycleHandler;
use crate::object::{self, Object, ObjectMeta};
use crate::store::ObjectStore;

/// Label key prefix for the initialization marker.
pub const INITIALIZED_LABEL_PREFIX: &str = "io.cattle.lifecycle.initialized";

/// Outcome of a protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Phase had nothing to do, move on to the next one.
    Continue,
    /// Phase acted (or found nothing left to do); the reconcile is over.
    Done,
}

/// Drives a [`LifecycleHandler`] for objects of type `T`.
pub struct LifecycleAdapter<T, H, S> {
    name: String,
    handler: H,
    store: S,
    _object: PhantomData<fn() -> T>,
}

impl<T, H, S> LifecycleAdapter<T, H, S>
where
    T: Object,
    H: LifecycleHandler<T>,
    S: ObjectStore<T>,
{
    /// `name` is both the finalizer token and the marker label suffix, so it
    /// must stay stable across restarts.
    pub fn new(name: impl Into<String>, handler: H, store: S) -> Self {
        Self {
            name: name.into(),
            handler,
            store,
            _object: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label key marking objects this adapter has initialized.
    pub fn initialized_label(&self) -> String {
        format!("{}.{}", INITIALIZED_LABEL_PREFIX, self.name)
    }

    /// Reconcile one object.
    ///
    /// `obj` is `None` when the key no longer exists in the store.
    pub async fn reconcile(&self, key: &str, obj: Option<&T>) -> Result<()> {
        let Some(obj) = obj else {
            debug!("{}: {} is gone, nothing to do", self.name, key);
            return Ok(());
        };

        let meta = object::accessor(obj)?;

        if self.finalize(key, meta, obj).await? == Step::Done {
            return Ok(());
        }

        if self.initialize(key, meta, obj).await? == Step::Done {
            return Ok(());
        }

        debug!("{}: updated {}", self.name, key);
        self.handler
            .updated(obj.clone())
            .await
            .map_err(|source| LifecycleError::Handler {
                phase: Phase::Updated,
                name: meta.name.clone(),
                source,
            })
    }

    async fn finalize(&self, key: &str, meta: &ObjectMeta, obj: &T) -> Result<Step> {
        if !meta.is_deleting() {
            return Ok(Step::Continue);
        }

        if !meta.has_finalizer(&self.name) {
            debug!(
                "{}: {} is deleting, finalizer already released",
                self.name, key
            );
            return Ok(Step::Done);
        }

        info!("{}: finalizing {} ({})", self.name, meta.name, key);
        let mut copy = obj.clone();
        object::accessor_mut(&mut copy)?.remove_finalizer(&self.name);

        self.handler
            .finalize(&mut copy)
            .await
            .map_err(|source| LifecycleError::Handler {
                phase: Phase::Finalize,
                name: meta.name.clone(),
                source,
            })?;

        self.commit(copy).await?;
        Ok(Step::Done)
    }

    async fn initialize(&self, key: &str, meta: &ObjectMeta, obj: &T) -> Result<Step> {
        let label = self.initialized_label();
        if meta.label(&label) == Some("true") {
            return Ok(Step::Continue);
        }

        info!("{}: initializing {} ({})", self.name, meta.name, key);
        let mut copy = obj.clone();
        {
            let meta = object::accessor_mut(&mut copy)?;
            meta.add_finalizer(&self.name);
            meta.labels_mut().insert(label, "true".to_string());
        }

        self.handler
            .initialize(&mut copy)
            .await
            .map_err(|source| LifecycleError::Handler {
                phase: Phase::Initialize,
                name: meta.name.clone(),
                source,
            })?;

        self.commit(copy).await?;
        Ok(Step::Done)
    }

    /// Persist an edited copy under the name it carries after the handler ran.
    async fn commit(&self, copy: T) -> Result<()> {
        let name = object::accessor(&copy)?.name.clone();
        match self.store.update(&name, copy).await {
            Ok(revision) => {
                debug!("{}: stored {} at revision {}", self.name, name, revision);
                Ok(())
            }
            Err(source) => Err(LifecycleError::Store { name, source }),
        }
    }
}
