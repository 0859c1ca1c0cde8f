//! In-Memory Object Store
//!
//! DashMap-backed store with the API server behaviors the planner relies on:
//! optimistic locking on resourceVersion, generation bumps on spec changes,
//! finalizer-gated deletion and a separate status subresource.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::DynamicObject;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::patch::{apply_merge_patch, object_patch};
use super::{labels_match, ObjectReader, ObjectWriter};
use crate::error::{Error, Result};
use crate::model::{ClientOption, ObjectKey, ObjectKind, Scheme};

/// Shared in-memory object store
#[derive(Clone)]
pub struct MemoryStore {
    objects: Arc<DashMap<ObjectKey, DynamicObject>>,
    scheme: Arc<Scheme>,
    revision: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new(scheme: Arc<Scheme>) -> Self {
        Self {
            objects: Arc::new(DashMap::new()),
            scheme,
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    fn not_found(key: &ObjectKey) -> Error {
        Error::ResourceNotFound {
            kind: key.kind.kind.clone(),
            name: key.name.clone(),
        }
    }

    fn check_revision(key: &ObjectKey, stored: &DynamicObject, obj: &DynamicObject) -> Result<()> {
        match obj.metadata.resource_version.as_deref() {
            Some(rv) if Some(rv) != stored.metadata.resource_version.as_deref() => {
                Err(Error::ResourceConflict {
                    kind: key.kind.kind.clone(),
                    name: key.name.clone(),
                    reason: format!(
                        "the object has been modified: resourceVersion {} is stale",
                        rv
                    ),
                })
            }
            _ => Ok(()),
        }
    }

    fn is_dry_run(opt: Option<&ClientOption>) -> bool {
        opt.is_some_and(|o| o.dry_run)
    }

    /// Store `next` over `stored`, keeping the server-owned fields
    fn commit(
        &self,
        key: &ObjectKey,
        stored: &DynamicObject,
        mut next: DynamicObject,
        dry_run: bool,
    ) -> DynamicObject {
        if let Some(status) = stored.data.get("status") {
            next.data["status"] = status.clone();
        } else if let Some(map) = next.data.as_object_mut() {
            map.remove("status");
        }
        next.types = stored.types.clone();
        next.metadata.uid = stored.metadata.uid.clone();
        next.metadata.creation_timestamp = stored.metadata.creation_timestamp.clone();
        next.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
        next.metadata.generation = stored.metadata.generation;
        if next.data.get("spec") != stored.data.get("spec") {
            next.metadata.generation = Some(stored.metadata.generation.unwrap_or(0) + 1);
        }
        next.metadata.resource_version = Some(self.next_revision());

        if dry_run {
            return next;
        }
        let released = next.metadata.deletion_timestamp.is_some()
            && next.metadata.finalizers.as_ref().map_or(true, Vec::is_empty);
        if released {
            self.objects.remove(key);
        } else {
            self.objects.insert(key.clone(), next.clone());
        }
        next
    }

    fn stored(&self, key: &ObjectKey) -> Result<DynamicObject> {
        self.objects
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Self::not_found(key))
    }
}

#[async_trait]
impl ObjectReader for MemoryStore {
    async fn get(
        &self,
        kind: &ObjectKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        self.stored(&ObjectKey::new(kind.clone(), namespace, name))
    }

    async fn list(
        &self,
        kind: &ObjectKind,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>> {
        let mut objs: Vec<DynamicObject> = self
            .objects
            .iter()
            .filter(|entry| {
                let key = entry.key();
                key.kind == *kind
                    && namespace.map_or(true, |ns| key.namespace.as_deref() == Some(ns))
                    && labels_match(entry.value().metadata.labels.as_ref(), labels)
            })
            .map(|entry| entry.value().clone())
            .collect();
        objs.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(objs)
    }
}

#[async_trait]
impl ObjectWriter for MemoryStore {
    async fn create(
        &self,
        obj: &DynamicObject,
        opt: Option<&ClientOption>,
    ) -> Result<DynamicObject> {
        let key = self.scheme.object_key(obj)?;
        let mut created = obj.clone();
        created.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        created.metadata.resource_version = Some(self.next_revision());
        created.metadata.generation = Some(1);
        created.metadata.creation_timestamp = Some(Time(Utc::now()));
        created.metadata.deletion_timestamp = None;
        if Self::is_dry_run(opt) {
            return Ok(created);
        }

        match self.objects.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Err(Error::ResourceExists {
                kind: entry.key().kind.kind.clone(),
                name: entry.key().name.clone(),
            }),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(created.clone());
                Ok(created)
            }
        }
    }

    async fn update(
        &self,
        obj: &DynamicObject,
        opt: Option<&ClientOption>,
    ) -> Result<DynamicObject> {
        let key = self.scheme.object_key(obj)?;
        let stored = self.stored(&key)?;
        Self::check_revision(&key, &stored, obj)?;
        Ok(self.commit(&key, &stored, obj.clone(), Self::is_dry_run(opt)))
    }

    async fn patch(
        &self,
        obj: &DynamicObject,
        base: &DynamicObject,
        opt: Option<&ClientOption>,
    ) -> Result<DynamicObject> {
        let key = self.scheme.object_key(obj)?;
        let stored = self.stored(&key)?;
        let patch = object_patch(base, obj)?;
        let mut value = serde_json::to_value(&stored)?;
        apply_merge_patch(&mut value, &patch);
        let next: DynamicObject = serde_json::from_value(value)?;
        Ok(self.commit(&key, &stored, next, Self::is_dry_run(opt)))
    }

    async fn delete(&self, obj: &DynamicObject, opt: Option<&ClientOption>) -> Result<()> {
        let key = self.scheme.object_key(obj)?;
        let stored = self.stored(&key)?;
        if Self::is_dry_run(opt) {
            return Ok(());
        }
        let has_finalizers = stored
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| !f.is_empty());
        if !has_finalizers {
            self.objects.remove(&key);
            return Ok(());
        }
        if stored.metadata.deletion_timestamp.is_none() {
            let mut deleting = stored;
            deleting.metadata.deletion_timestamp = Some(Time(Utc::now()));
            deleting.metadata.resource_version = Some(self.next_revision());
            self.objects.insert(key, deleting);
        }
        Ok(())
    }

    async fn update_status(
        &self,
        obj: &DynamicObject,
        opt: Option<&ClientOption>,
    ) -> Result<DynamicObject> {
        let key = self.scheme.object_key(obj)?;
        let stored = self.stored(&key)?;
        Self::check_revision(&key, &stored, obj)?;
        if obj.data.get("status") == stored.data.get("status") {
            return Ok(stored);
        }

        let mut next = stored;
        match obj.data.get("status") {
            Some(status) => next.data["status"] = status.clone(),
            None => {
                if let Some(map) = next.data.as_object_mut() {
                    map.remove("status");
                }
            }
        }
        next.metadata.resource_version = Some(self.next_revision());
        if !Self::is_dry_run(opt) {
            self.objects.insert(key, next.clone());
        }
        Ok(next)
    }
}
