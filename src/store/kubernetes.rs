//! Kubernetes API Store
//!
//! [`ObjectReader`]/[`ObjectWriter`] over the API server using dynamic
//! objects resolved through the [`Scheme`].

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, ListParams, Patch};
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::patch::{is_empty_patch, object_patch};
use super::{label_selector, ObjectReader, ObjectWriter};
use crate::error::{Error, Result};
use crate::model::{ClientOption, ObjectKind, Scheme};

/// Default field manager for writes
pub const FIELD_MANAGER: &str = "rollout-operator";

/// Store backed by a live cluster
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    scheme: Arc<Scheme>,
    field_manager: String,
}

impl KubeStore {
    pub fn new(client: Client, scheme: Arc<Scheme>) -> Self {
        Self {
            client,
            scheme,
            field_manager: FIELD_MANAGER.to_string(),
        }
    }

    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    fn api(&self, kind: &ObjectKind, namespace: Option<&str>) -> Result<Api<DynamicObject>> {
        let resource = self.scheme.api_resource(kind)?;
        Ok(match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        })
    }

    fn api_for(&self, obj: &DynamicObject) -> Result<Api<DynamicObject>> {
        let kind = self.scheme.kind_of(obj)?;
        self.api(&kind, obj.metadata.namespace.as_deref())
    }

    fn options(opt: Option<&ClientOption>) -> ClientOption {
        opt.cloned().unwrap_or_default()
    }
}

/// Map API status codes onto the store error taxonomy
fn map_kube_error(err: kube::Error, kind: &str, name: &str) -> Error {
    match &err {
        kube::Error::Api(resp) if resp.code == 404 => Error::ResourceNotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            Error::ResourceExists {
                kind: kind.to_string(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(resp) if resp.code == 409 => Error::ResourceConflict {
            kind: kind.to_string(),
            name: name.to_string(),
            reason: resp.message.clone(),
        },
        _ => Error::Kube(err),
    }
}

fn kind_name(obj: &DynamicObject) -> String {
    obj.types
        .as_ref()
        .map(|t| t.kind.clone())
        .unwrap_or_default()
}

#[async_trait]
impl ObjectReader for KubeStore {
    async fn get(
        &self,
        kind: &ObjectKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        self.api(kind, namespace)?
            .get(name)
            .await
            .map_err(|e| map_kube_error(e, &kind.kind, name))
    }

    async fn list(
        &self,
        kind: &ObjectKind,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>> {
        let params = ListParams::default().labels(&label_selector(labels));
        let list = self
            .api(kind, namespace)?
            .list(&params)
            .await
            .map_err(|e| map_kube_error(e, &kind.kind, ""))?;
        Ok(list.items)
    }
}

#[async_trait]
impl ObjectWriter for KubeStore {
    async fn create(
        &self,
        obj: &DynamicObject,
        opt: Option<&ClientOption>,
    ) -> Result<DynamicObject> {
        let params = Self::options(opt).post_params(&self.field_manager);
        self.api_for(obj)?
            .create(&params, obj)
            .await
            .map_err(|e| map_kube_error(e, &kind_name(obj), &obj.name_any()))
    }

    async fn update(
        &self,
        obj: &DynamicObject,
        opt: Option<&ClientOption>,
    ) -> Result<DynamicObject> {
        let params = Self::options(opt).post_params(&self.field_manager);
        let name = obj.name_any();
        self.api_for(obj)?
            .replace(&name, &params, obj)
            .await
            .map_err(|e| map_kube_error(e, &kind_name(obj), &name))
    }

    async fn patch(
        &self,
        obj: &DynamicObject,
        base: &DynamicObject,
        opt: Option<&ClientOption>,
    ) -> Result<DynamicObject> {
        let name = obj.name_any();
        let api = self.api_for(obj)?;
        let diff = object_patch(base, obj)?;
        if is_empty_patch(&diff) {
            return api
                .get(&name)
                .await
                .map_err(|e| map_kube_error(e, &kind_name(obj), &name));
        }
        let params = Self::options(opt).patch_params(&self.field_manager);
        api.patch(&name, &params, &Patch::Merge(&diff))
            .await
            .map_err(|e| map_kube_error(e, &kind_name(obj), &name))
    }

    async fn delete(&self, obj: &DynamicObject, opt: Option<&ClientOption>) -> Result<()> {
        let params = Self::options(opt).delete_params();
        let name = obj.name_any();
        self.api_for(obj)?
            .delete(&name, &params)
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(e, &kind_name(obj), &name))
    }

    async fn update_status(
        &self,
        obj: &DynamicObject,
        opt: Option<&ClientOption>,
    ) -> Result<DynamicObject> {
        let params = Self::options(opt).post_params(&self.field_manager);
        let name = obj.name_any();
        let body = serde_json::to_vec(obj)?;
        self.api_for(obj)?
            .replace_status(&name, &params, body)
            .await
            .map_err(|e| map_kube_error(e, &kind_name(obj), &name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "the object has been modified".into(),
            reason: reason.into(),
            code,
        })
    }

    #[test]
    fn test_map_kube_error() {
        assert_matches!(
            map_kube_error(api_error(404, "NotFound"), "Pod", "p1"),
            Error::ResourceNotFound { .. }
        );
        assert_matches!(
            map_kube_error(api_error(409, "AlreadyExists"), "Pod", "p1"),
            Error::ResourceExists { .. }
        );
        assert_matches!(
            map_kube_error(api_error(409, "Conflict"), "Pod", "p1"),
            Error::ResourceConflict { reason, .. } if reason == "the object has been modified"
        );
        assert_matches!(
            map_kube_error(api_error(500, "InternalError"), "Pod", "p1"),
            Error::Kube(_)
        );
    }
}
