//! Object identity and predicates
//!
//! Every object placed in a graph is keyed by group/version/kind plus
//! namespace and name. The [`Scheme`] is the registry that maps an object's
//! type metadata to a known kind; keying an unregistered object is a
//! wiring error, never silently tolerated.

use kube::api::{ApiResource, DynamicObject};
use kube::core::TypeMeta;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

// =============================================================================
// Kind & Key
// =============================================================================

/// Explicit kind discriminator for graph objects
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl ObjectKind {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Kind of a statically typed resource
    pub fn of<K: Resource<DynamicType = ()>>() -> Self {
        Self {
            group: K::group(&()).to_string(),
            version: K::version(&()).to_string(),
            kind: K::kind(&()).to_string(),
        }
    }

    /// Parse `apiVersion` + `kind` type metadata
    pub fn from_type_meta(types: &TypeMeta) -> Self {
        let (group, version) = match types.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", types.api_version.as_str()),
        };
        Self::new(group, version, &types.kind)
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Composite identity of a graph object: kind, namespace and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: ObjectKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: ObjectKind, namespace: Option<&str>, name: &str) -> Self {
        Self {
            kind,
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

// =============================================================================
// Scheme
// =============================================================================

/// Registry of the object kinds a controller is allowed to put in a graph
#[derive(Debug, Clone, Default)]
pub struct Scheme {
    resources: BTreeMap<ObjectKind, ApiResource>,
}

impl Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a statically typed resource
    pub fn register<K: Resource<DynamicType = ()>>(mut self) -> Self {
        self.resources
            .insert(ObjectKind::of::<K>(), ApiResource::erase::<K>(&()));
        self
    }

    pub fn is_registered(&self, kind: &ObjectKind) -> bool {
        self.resources.contains_key(kind)
    }

    pub fn api_resource(&self, kind: &ObjectKind) -> Result<&ApiResource> {
        self.resources.get(kind).ok_or_else(|| Error::UnregisteredType {
            kind: kind.to_string(),
            name: String::new(),
        })
    }

    /// Registered kind of a dynamic object
    pub fn kind_of(&self, obj: &DynamicObject) -> Result<ObjectKind> {
        let unregistered = |kind: String| Error::UnregisteredType {
            kind,
            name: obj.name_any(),
        };
        let types = obj
            .types
            .as_ref()
            .ok_or_else(|| unregistered("<missing type meta>".into()))?;
        let kind = ObjectKind::from_type_meta(types);
        if !self.is_registered(&kind) {
            return Err(unregistered(kind.to_string()));
        }
        Ok(kind)
    }

    /// Graph identity of a dynamic object
    pub fn object_key(&self, obj: &DynamicObject) -> Result<ObjectKey> {
        let kind = self.kind_of(obj)?;
        let name = obj.metadata.name.as_deref().ok_or_else(|| Error::UnregisteredType {
            kind: kind.to_string(),
            name: "<missing name>".into(),
        })?;
        Ok(ObjectKey::new(kind, obj.metadata.namespace.as_deref(), name))
    }
}

// =============================================================================
// Conversion
// =============================================================================

/// Convert a typed resource into the dynamic form stored in graphs
pub fn to_object<K>(obj: &K) -> Result<DynamicObject>
where
    K: Resource<DynamicType = ()> + Serialize,
{
    let mut value = serde_json::to_value(obj)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("apiVersion".into(), K::api_version(&()).into());
        map.insert("kind".into(), K::kind(&()).into());
    }
    Ok(serde_json::from_value(value)?)
}

/// Convert a dynamic object back into its typed form
pub fn from_object<K: DeserializeOwned>(obj: &DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

// =============================================================================
// Predicates
// =============================================================================

/// Types that report the generation their status was computed from
pub trait ObservedGeneration {
    fn observed_generation(&self) -> Option<i64>;
}

impl ObservedGeneration for DynamicObject {
    fn observed_generation(&self) -> Option<i64> {
        self.data
            .get("status")
            .and_then(|status| status.get("observedGeneration"))
            .and_then(|v| v.as_i64())
    }
}

pub fn is_object_deleting<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

/// The spec changed since the status was last computed
pub fn is_object_updating<K: Resource + ObservedGeneration>(obj: &K) -> bool {
    obj.meta().generation != obj.observed_generation()
}

/// Neither deleting nor waiting on a spec change, so only status moves
pub fn is_object_status_updating<K: Resource + ObservedGeneration>(obj: &K) -> bool {
    !is_object_deleting(obj) && !is_object_updating(obj)
}

/// `owner` is listed in the owner references of `obj`
pub fn is_owner_of<O, K>(owner: &O, obj: &K) -> bool
where
    O: Resource<DynamicType = ()>,
    K: Resource,
{
    let owner_uid = owner.meta().uid.as_deref();
    let owner_name = owner.meta().name.as_deref();
    obj.owner_references().iter().any(|r| match owner_uid {
        Some(uid) => r.uid == uid,
        None => {
            r.kind == O::kind(&()) && Some(r.name.as_str()) == owner_name
        }
    })
}

pub fn contains_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.finalizers().iter().any(|f| f == finalizer)
}

/// Returns true when the finalizer was added
pub fn add_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    if contains_finalizer(obj, finalizer) {
        return false;
    }
    obj.finalizers_mut().push(finalizer.to_string());
    true
}

/// Returns true when the finalizer was present
pub fn remove_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    let finalizers = obj.finalizers_mut();
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    finalizers.len() != before
}
