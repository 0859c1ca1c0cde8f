//! Object Stores
//!
//! The backing-store capability set the planner reads from and the executor
//! writes to, with a Kubernetes API implementation and an in-memory one.

mod kubernetes;
mod memory;
pub mod patch;

pub use kubernetes::KubeStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::model::{ClientOption, ObjectKind};
use kube::api::DynamicObject;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Store Traits
// =============================================================================

/// Read access to stored objects
#[async_trait]
pub trait ObjectReader: Send + Sync {
    /// Get one object; fails with `ResourceNotFound` when absent
    async fn get(
        &self,
        kind: &ObjectKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject>;

    /// List objects of `kind` carrying every label in `labels`
    async fn list(
        &self,
        kind: &ObjectKind,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>>;
}

/// Mutating access to stored objects
#[async_trait]
pub trait ObjectWriter: Send + Sync {
    /// Fails with `ResourceExists` when the object is already stored
    async fn create(&self, obj: &DynamicObject, opt: Option<&ClientOption>)
        -> Result<DynamicObject>;

    /// Replace metadata and spec; fails with `ResourceConflict` on a stale
    /// resourceVersion and `ResourceNotFound` when absent
    async fn update(&self, obj: &DynamicObject, opt: Option<&ClientOption>)
        -> Result<DynamicObject>;

    /// Merge-patch the difference between `base` and `obj`
    async fn patch(
        &self,
        obj: &DynamicObject,
        base: &DynamicObject,
        opt: Option<&ClientOption>,
    ) -> Result<DynamicObject>;

    async fn delete(&self, obj: &DynamicObject, opt: Option<&ClientOption>) -> Result<()>;

    /// Replace the status subresource
    async fn update_status(
        &self,
        obj: &DynamicObject,
        opt: Option<&ClientOption>,
    ) -> Result<DynamicObject>;
}

/// Full read/write store
pub trait ObjectStore: ObjectReader + ObjectWriter {}

impl<T: ObjectReader + ObjectWriter + ?Sized> ObjectStore for T {}

/// Type alias for a shared store
pub type SharedObjectStore = Arc<dyn ObjectStore>;

#[async_trait]
impl<S: ObjectReader + ?Sized> ObjectReader for Arc<S> {
    async fn get(
        &self,
        kind: &ObjectKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        (**self).get(kind, namespace, name).await
    }

    async fn list(
        &self,
        kind: &ObjectKind,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>> {
        (**self).list(kind, namespace, labels).await
    }
}

/// Label selector string, e.g. `a=1,b=2`
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// `labels` is a superset of `selector`
pub fn labels_match(
    labels: Option<&BTreeMap<String, String>>,
    selector: &BTreeMap<String, String>,
) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
}
