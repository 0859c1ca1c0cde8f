//! Vertex execution
//!
//! [`ObjectExecutor`] turns each vertex's action into a store call. Every
//! write is idempotent against the object's presence: creating something
//! that exists, or updating, patching or deleting something already gone,
//! counts as success.

use async_trait::async_trait;
use kube::api::DynamicObject;
use tracing::debug;

use super::transformer::TransformContext;
use crate::error::{Error, Result};
use crate::model::{is_object_deleting, remove_finalizer, Action, ClientOption, ObjectVertex};
use crate::store::patch::{is_empty_patch, object_patch};
use crate::store::{ObjectWriter, SharedObjectStore};

/// Writes one vertex
#[async_trait]
pub trait VertexExecutor<C: TransformContext>: Send + Sync {
    /// Tie-break between vertices with no ordering edge
    fn less(&self, a: &ObjectVertex, b: &ObjectVertex) -> bool {
        a.key() < b.key()
    }

    async fn execute(&self, ctx: &C, vertex: &ObjectVertex) -> Result<()>;
}

/// Standard executor dispatching on [`Action`]
pub struct ObjectExecutor {
    store: SharedObjectStore,
    finalizer: Option<String>,
}

/// Absence races are the desired end state
fn ignore_not_found<T>(result: Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

impl ObjectExecutor {
    pub fn new(store: SharedObjectStore) -> Self {
        Self {
            store,
            finalizer: None,
        }
    }

    /// Finalizer stripped from objects before they are deleted
    pub fn with_finalizer(mut self, finalizer: impl Into<String>) -> Self {
        self.finalizer = Some(finalizer.into());
        self
    }

    async fn create(&self, obj: &DynamicObject, opt: Option<&ClientOption>) -> Result<()> {
        match self.store.create(obj, opt).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn patch(&self, vertex: &ObjectVertex, opt: Option<&ClientOption>) -> Result<()> {
        let base = vertex.ori_obj.as_ref().ok_or_else(|| {
            Error::Internal(format!("patch of {} has no original object", vertex.key()))
        })?;
        ignore_not_found(self.store.patch(&vertex.obj, base, opt).await)
    }

    async fn delete(&self, vertex: &ObjectVertex, opt: Option<&ClientOption>) -> Result<()> {
        let mut obj = vertex.obj.clone();
        if let Some(finalizer) = &self.finalizer {
            if remove_finalizer(&mut obj, finalizer) {
                match self.store.update(&obj, opt).await {
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
        }
        if is_object_deleting(&vertex.obj) {
            return Ok(());
        }
        ignore_not_found(self.store.delete(&obj, opt).await)
    }

    async fn status(&self, vertex: &ObjectVertex, opt: Option<&ClientOption>) -> Result<()> {
        let mut obj = vertex.obj.clone();
        if let Some(ori) = &vertex.ori_obj {
            if !is_empty_patch(&object_patch(ori, &obj)?) {
                match self.store.patch(&obj, ori, opt).await {
                    Ok(patched) => obj.metadata.resource_version = patched.metadata.resource_version,
                    Err(e) if e.is_not_found() => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
        }
        ignore_not_found(self.store.update_status(&obj, opt).await)
    }
}

#[async_trait]
impl<C: TransformContext> VertexExecutor<C> for ObjectExecutor {
    async fn execute(&self, ctx: &C, vertex: &ObjectVertex) -> Result<()> {
        let action = vertex.action.ok_or_else(|| Error::MissingAction {
            key: vertex.key().to_string(),
        })?;
        debug!(parent: ctx.span(), object = %vertex.key(), %action, "Executing vertex");

        let opt = vertex.client_opt.as_ref();
        match action {
            Action::Create => self.create(&vertex.obj, opt).await,
            Action::Update => ignore_not_found(self.store.update(&vertex.obj, opt).await),
            Action::Patch => self.patch(vertex, opt).await,
            Action::Delete => self.delete(vertex, opt).await,
            Action::Status => self.status(vertex, opt).await,
            Action::Noop => Ok(()),
        }
    }
}
