//! Managed objects and their generic metadata.
//!
//! The lifecycle protocol only ever looks at the generic part of an object:
//! the deletion marker, the finalizer list and the labels. Everything else is
//! opaque and travels along untouched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the metadata accessor when an object is malformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    /// Object carries no metadata block at all.
    #[error("object has no metadata")]
    Missing,

    /// Metadata is present but the object has no identity.
    #[error("object metadata has an empty name")]
    EmptyName,
}

/// Generic metadata shared by every managed object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    /// Store revision, checked on update.
    #[serde(default)]
    pub resource_version: u64,
    /// Set by the store once deletion was requested; `None` means live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, token: &str) -> bool {
        self.finalizers.iter().any(|f| f == token)
    }

    /// Append `token` unless it is already present.
    pub fn add_finalizer(&mut self, token: &str) {
        if !self.has_finalizer(token) {
            self.finalizers.push(token.to_string());
        }
    }

    /// Remove every occurrence of `token`, keeping the order of the rest.
    pub fn remove_finalizer(&mut self, token: &str) {
        self.finalizers.retain(|f| f != token);
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }

    /// Label map, created empty if the object had none.
    pub fn labels_mut(&mut self) -> &mut HashMap<String, String> {
        self.labels.get_or_insert_with(HashMap::new)
    }
}

/// A value the lifecycle adapter can manage.
///
/// `Clone` must produce a deep copy: the adapter edits clones and relies on
/// the caller's value staying untouched.
pub trait Object: Clone + Send + Sync + 'static {
    fn metadata(&self) -> Result<&ObjectMeta, MetadataError>;

    fn metadata_mut(&mut self) -> Result<&mut ObjectMeta, MetadataError>;
}

/// Metadata of `obj`, rejecting objects without an identity.
pub fn accessor<T: Object>(obj: &T) -> Result<&ObjectMeta, MetadataError> {
    let meta = obj.metadata()?;
    if meta.name.is_empty() {
        return Err(MetadataError::EmptyName);
    }
    Ok(meta)
}

/// Mutable counterpart of [`accessor`].
pub fn accessor_mut<T: Object>(obj: &mut T) -> Result<&mut ObjectMeta, MetadataError> {
    let meta = obj.metadata_mut()?;
    if meta.name.is_empty() {
        return Err(MetadataError::EmptyName);
    }
    Ok(meta)
}

/// Typed resource: generic metadata plus a domain spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource<S> {
    pub metadata: ObjectMeta,
    pub spec: S,
}

impl<S> Resource<S> {
    pub fn new(name: impl Into<String>, spec: S) -> Self {
        Self {
            metadata: ObjectMeta::new(name),
            spec,
        }
    }
}

impl<S> Object for Resource<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn metadata(&self) -> Result<&ObjectMeta, MetadataError> {
        Ok(&self.metadata)
    }

    fn metadata_mut(&mut self) -> Result<&mut ObjectMeta, MetadataError> {
        Ok(&mut self.metadata)
    }
}

/// Untyped object as decoded from the wire; metadata may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Object for DynamicObject {
    fn metadata(&self) -> Result<&ObjectMeta, MetadataError> {
        self.metadata.as_ref().ok_or(MetadataError::Missing)
    }

    fn metadata_mut(&mut self) -> Result<&mut ObjectMeta, MetadataError> {
        self.metadata.as_mut().ok_or(MetadataError::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalizer_add_is_idempotent() {
        let mut meta = ObjectMeta::new("vm-1");
        meta.add_finalizer("a");
        meta.add_finalizer("b");
        meta.add_finalizer("a");
        assert_eq!(meta.finalizers, vec!["a", "b"]);
    }

    #[test]
    fn finalizer_remove_keeps_order() {
        let mut meta = ObjectMeta::new("vm-1");
        meta.finalizers = vec!["a".into(), "x".into(), "b".into(), "c".into()];
        meta.remove_finalizer("x");
        assert_eq!(meta.finalizers, vec!["a", "b", "c"]);
        assert!(!meta.has_finalizer("x"));
    }

    #[test]
    fn labels_mut_creates_map() {
        let mut meta = ObjectMeta::new("vm-1");
        assert!(meta.labels.is_none());
        assert_eq!(meta.label("k"), None);

        meta.labels_mut().insert("k".into(), "v".into());
        assert_eq!(meta.label("k"), Some("v"));
    }

    #[test]
    fn accessor_rejects_malformed_objects() {
        let missing = DynamicObject::default();
        assert_eq!(accessor(&missing), Err(MetadataError::Missing));

        let unnamed = Resource::new("", ());
        assert_eq!(accessor(&unnamed), Err(MetadataError::EmptyName));

        let named = Resource::new("vm-1", ());
        assert_eq!(accessor(&named).map(|m| m.name.as_str()), Ok("vm-1"));
    }

    #[test]
    fn dynamic_object_json_layout() {
        let json = serde_json::json!({
            "metadata": {
                "name": "net-1",
                "resourceVersion": 3,
                "finalizers": ["other"],
                "labels": {"tier": "edge"}
            },
            "spec": {"cidr": "10.0.0.0/24"}
        });
        let obj: DynamicObject = serde_json::from_value(json).unwrap();
        let meta = accessor(&obj).unwrap();
        assert_eq!(meta.resource_version, 3);
        assert_eq!(meta.finalizers, vec!["other"]);
        assert_eq!(meta.label("tier"), Some("edge"));
        assert!(!meta.is_deleting());
        assert_eq!(obj.data["spec"]["cidr"], "10.0.0.0/24");
    }
}
