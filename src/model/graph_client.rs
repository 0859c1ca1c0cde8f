//! Graph Client
//!
//! Read-through access to the object store plus the set-like graph writer.
//! Writes are idempotent by object key: planning the same object twice
//! collapses onto one vertex and the last write decides its action.

use kube::api::DynamicObject;
use kube::Resource;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::object::{from_object, ObjectKind, Scheme};
use super::options::{GraphOption, GraphOptions};
use super::vertex::{Action, ObjectGraph, ObjectVertex, VertexId};
use crate::error::{Error, Result};
use crate::store::ObjectReader;

// =============================================================================
// GraphWriter
// =============================================================================

/// Mutations that plan object writes into an [`ObjectGraph`]
pub trait GraphWriter {
    /// Establish the single root vertex.
    ///
    /// An already planned vertex for `new` is promoted; otherwise a new vertex
    /// is added. Every other vertex becomes a dependent of the root.
    fn root(
        &self,
        graph: &mut ObjectGraph,
        old: Option<DynamicObject>,
        new: DynamicObject,
        action: Action,
    ) -> Result<VertexId>;

    fn create(&self, graph: &mut ObjectGraph, obj: DynamicObject, opts: &[GraphOption])
        -> Result<VertexId>;

    fn update(
        &self,
        graph: &mut ObjectGraph,
        old: DynamicObject,
        new: DynamicObject,
        opts: &[GraphOption],
    ) -> Result<VertexId>;

    fn patch(
        &self,
        graph: &mut ObjectGraph,
        old: DynamicObject,
        new: DynamicObject,
        opts: &[GraphOption],
    ) -> Result<VertexId>;

    fn delete(&self, graph: &mut ObjectGraph, obj: DynamicObject, opts: &[GraphOption])
        -> Result<VertexId>;

    fn status(
        &self,
        graph: &mut ObjectGraph,
        old: DynamicObject,
        new: DynamicObject,
        opts: &[GraphOption],
    ) -> Result<VertexId>;

    fn noop(&self, graph: &mut ObjectGraph, obj: DynamicObject, opts: &[GraphOption])
        -> Result<VertexId>;

    /// Always add a new vertex, below `parent` or below the root
    fn do_action(
        &self,
        graph: &mut ObjectGraph,
        old: Option<DynamicObject>,
        new: DynamicObject,
        action: Option<Action>,
        parent: Option<VertexId>,
        opts: &[GraphOption],
    ) -> Result<VertexId>;

    /// `obj` is planned and its action equals `action`
    fn is_action(&self, graph: &ObjectGraph, obj: &DynamicObject, action: Option<Action>)
        -> Result<bool>;

    /// Order `obj` after each of `deps`; unplanned objects are skipped
    fn depend_on(
        &self,
        graph: &mut ObjectGraph,
        obj: &DynamicObject,
        deps: &[&DynamicObject],
    ) -> Result<()>;

    /// Planned objects of `kind`, or of every other kind with
    /// [`GraphOption::HaveDifferentType`]
    fn find_all(
        &self,
        graph: &ObjectGraph,
        kind: Option<&ObjectKind>,
        opts: &[GraphOption],
    ) -> Vec<DynamicObject>;
}

// =============================================================================
// GraphClient
// =============================================================================

/// Store reader plus graph writer handed to transformers
#[derive(Clone)]
pub struct GraphClient {
    reader: Arc<dyn ObjectReader>,
    scheme: Arc<Scheme>,
}

impl GraphClient {
    pub fn new(reader: Arc<dyn ObjectReader>, scheme: Arc<Scheme>) -> Self {
        Self { reader, scheme }
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Read a typed object from the store
    pub async fn get<K>(&self, namespace: Option<&str>, name: &str) -> Result<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let obj = self
            .reader
            .get(&ObjectKind::of::<K>(), namespace, name)
            .await?;
        from_object(&obj)
    }

    /// Like [`get`](Self::get), with a missing object as `None`
    pub async fn get_opt<K>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        match self.get(namespace, name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// List typed objects matching every label in `labels`
    pub async fn list<K>(
        &self,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let objs = self
            .reader
            .list(&ObjectKind::of::<K>(), namespace, labels)
            .await?;
        objs.iter().map(from_object).collect()
    }

    fn do_write(
        &self,
        graph: &mut ObjectGraph,
        old: Option<DynamicObject>,
        new: DynamicObject,
        action: Action,
        opts: &[GraphOption],
    ) -> Result<VertexId> {
        let opts = GraphOptions::from_options(opts);
        let key = self.scheme.object_key(&new)?;

        if let Some(id) = graph.find_by_key(&key) {
            if let Some(vertex) = graph.vertex_mut(id) {
                if opts.replace_if_existing {
                    vertex.set_objects(new, old);
                }
                if opts.client_opt.is_some() {
                    vertex.client_opt = opts.client_opt;
                }
                vertex.action = Some(action);
            }
            return Ok(id);
        }

        let root = graph.root_id().ok_or(Error::RootNotFound)?;
        let mut vertex = ObjectVertex::new(key, new, old, Some(action));
        vertex.client_opt = opts.client_opt;
        let id = graph.add_vertex(vertex);
        graph.connect(root, id);
        Ok(id)
    }
}

impl GraphWriter for GraphClient {
    fn root(
        &self,
        graph: &mut ObjectGraph,
        old: Option<DynamicObject>,
        new: DynamicObject,
        action: Action,
    ) -> Result<VertexId> {
        let key = self.scheme.object_key(&new)?;
        let root = match graph.find_by_key(&key) {
            Some(id) => {
                if let Some(vertex) = graph.vertex_mut(id) {
                    vertex.set_objects(new, old);
                    vertex.action = Some(action);
                }
                id
            }
            None => graph.add_vertex(ObjectVertex::new(key, new, old, Some(action))),
        };

        let others: Vec<VertexId> = graph
            .dag()
            .vertices()
            .copied()
            .filter(|id| *id != root)
            .collect();
        for id in others {
            graph.connect(root, id);
        }
        Ok(root)
    }

    fn create(
        &self,
        graph: &mut ObjectGraph,
        obj: DynamicObject,
        opts: &[GraphOption],
    ) -> Result<VertexId> {
        self.do_write(graph, None, obj, Action::Create, opts)
    }

    fn update(
        &self,
        graph: &mut ObjectGraph,
        old: DynamicObject,
        new: DynamicObject,
        opts: &[GraphOption],
    ) -> Result<VertexId> {
        self.do_write(graph, Some(old), new, Action::Update, opts)
    }

    fn patch(
        &self,
        graph: &mut ObjectGraph,
        old: DynamicObject,
        new: DynamicObject,
        opts: &[GraphOption],
    ) -> Result<VertexId> {
        self.do_write(graph, Some(old), new, Action::Patch, opts)
    }

    fn delete(
        &self,
        graph: &mut ObjectGraph,
        obj: DynamicObject,
        opts: &[GraphOption],
    ) -> Result<VertexId> {
        self.do_write(graph, None, obj, Action::Delete, opts)
    }

    fn status(
        &self,
        graph: &mut ObjectGraph,
        old: DynamicObject,
        new: DynamicObject,
        opts: &[GraphOption],
    ) -> Result<VertexId> {
        self.do_write(graph, Some(old), new, Action::Status, opts)
    }

    fn noop(
        &self,
        graph: &mut ObjectGraph,
        obj: DynamicObject,
        opts: &[GraphOption],
    ) -> Result<VertexId> {
        self.do_write(graph, None, obj, Action::Noop, opts)
    }

    fn do_action(
        &self,
        graph: &mut ObjectGraph,
        old: Option<DynamicObject>,
        new: DynamicObject,
        action: Option<Action>,
        parent: Option<VertexId>,
        opts: &[GraphOption],
    ) -> Result<VertexId> {
        let root = graph.root_id().ok_or(Error::RootNotFound)?;
        let opts = GraphOptions::from_options(opts);
        let key = self.scheme.object_key(&new)?;

        let mut vertex = ObjectVertex::new(key, new, old, action);
        vertex.client_opt = opts.client_opt;
        let id = graph.add_vertex(vertex);
        let upstream = parent.filter(|p| graph.vertex(*p).is_some()).unwrap_or(root);
        graph.connect(upstream, id);
        Ok(id)
    }

    fn is_action(
        &self,
        graph: &ObjectGraph,
        obj: &DynamicObject,
        action: Option<Action>,
    ) -> Result<bool> {
        let key = self.scheme.object_key(obj)?;
        Ok(graph
            .find_by_key(&key)
            .and_then(|id| graph.vertex(id))
            .is_some_and(|v| v.action == action))
    }

    fn depend_on(
        &self,
        graph: &mut ObjectGraph,
        obj: &DynamicObject,
        deps: &[&DynamicObject],
    ) -> Result<()> {
        let key = self.scheme.object_key(obj)?;
        let Some(from) = graph.find_by_key(&key) else {
            return Ok(());
        };
        for dep in deps {
            let dep_key = self.scheme.object_key(dep)?;
            if let Some(to) = graph.find_by_key(&dep_key) {
                graph.connect(from, to);
            }
        }
        Ok(())
    }

    fn find_all(
        &self,
        graph: &ObjectGraph,
        kind: Option<&ObjectKind>,
        opts: &[GraphOption],
    ) -> Vec<DynamicObject> {
        let opts = GraphOptions::from_options(opts);
        graph
            .vertices()
            .filter(|v| kind.is_some_and(|k| v.key().kind == *k) != opts.have_different_type)
            .map(|v| v.obj.clone())
            .collect()
    }
}
