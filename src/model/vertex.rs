//! Object vertices and the object graph
//!
//! [`ObjectGraph`] pairs a [`Dag`] of vertex ids with the vertices
//! themselves. Ids are unique for the whole process, so graphs built
//! independently can be merged without remapping.

use kube::api::DynamicObject;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::object::ObjectKey;
use super::options::ClientOption;
use crate::error::{Error, Result};
use crate::graph::Dag;

static NEXT_VERTEX_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique vertex handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(u64);

impl VertexId {
    fn next() -> Self {
        Self(NEXT_VERTEX_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Action
// =============================================================================

/// Write to perform for a vertex at execution time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Patch,
    Delete,
    Status,
    Noop,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => write!(f, "CREATE"),
            Action::Update => write!(f, "UPDATE"),
            Action::Patch => write!(f, "PATCH"),
            Action::Delete => write!(f, "DELETE"),
            Action::Status => write!(f, "STATUS"),
            Action::Noop => write!(f, "NOOP"),
        }
    }
}

// =============================================================================
// ObjectVertex
// =============================================================================

/// Desired object, its observed original, and the write to perform
#[derive(Debug, Clone)]
pub struct ObjectVertex {
    id: VertexId,
    key: ObjectKey,
    pub obj: DynamicObject,
    pub ori_obj: Option<DynamicObject>,
    pub action: Option<Action>,
    pub client_opt: Option<ClientOption>,
}

impl ObjectVertex {
    pub fn new(
        key: ObjectKey,
        obj: DynamicObject,
        ori_obj: Option<DynamicObject>,
        action: Option<Action>,
    ) -> Self {
        Self {
            id: VertexId::next(),
            key,
            obj,
            ori_obj,
            action,
            client_opt: None,
        }
    }

    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// Replace the object; the key must not change
    pub(crate) fn set_objects(&mut self, obj: DynamicObject, ori_obj: Option<DynamicObject>) {
        self.obj = obj;
        self.ori_obj = ori_obj;
    }

    /// Same planned write: action and both objects
    fn same_write(&self, other: &ObjectVertex) -> bool {
        self.action == other.action
            && same_object(&self.obj, &other.obj)
            && match (&self.ori_obj, &other.ori_obj) {
                (Some(a), Some(b)) => same_object(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}

fn same_object(a: &DynamicObject, b: &DynamicObject) -> bool {
    a.types == b.types && a.metadata == b.metadata && a.data == b.data
}

impl fmt::Display for ObjectVertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            Some(action) => write!(f, "{{{}, action: {}}}", self.key, action),
            None => write!(f, "{{{}, action: <none>}}", self.key),
        }
    }
}

// =============================================================================
// ObjectGraph
// =============================================================================

/// DAG of planned object writes
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    dag: Dag<VertexId>,
    vertices: HashMap<VertexId, ObjectVertex>,
    /// Vertices as copied by `branch`, to tell what a branch touched
    base: HashMap<VertexId, ObjectVertex>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dag(&self) -> &Dag<VertexId> {
        &self.dag
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertex(&self, id: VertexId) -> Option<&ObjectVertex> {
        self.vertices.get(&id)
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut ObjectVertex> {
        self.vertices.get_mut(&id)
    }

    /// Vertices in DAG insertion order
    pub fn vertices(&self) -> impl Iterator<Item = &ObjectVertex> {
        self.dag.vertices().filter_map(|id| self.vertices.get(id))
    }

    /// Insert an unconnected vertex
    pub fn add_vertex(&mut self, vertex: ObjectVertex) -> VertexId {
        let id = vertex.id();
        self.dag.add_vertex(id);
        self.vertices.insert(id, vertex);
        id
    }

    pub fn remove_vertex(&mut self, id: VertexId) -> Option<ObjectVertex> {
        self.dag.remove_vertex(&id);
        self.base.remove(&id);
        self.vertices.remove(&id)
    }

    /// `from` is written after `to`
    pub fn connect(&mut self, from: VertexId, to: VertexId) -> bool {
        self.dag.connect(from, to)
    }

    pub fn add_connect_root(&mut self, id: VertexId) -> bool {
        self.dag.add_connect_root(id)
    }

    pub fn root_id(&self) -> Option<VertexId> {
        self.dag.root()
    }

    pub fn root_vertex(&self) -> Option<&ObjectVertex> {
        self.root_id().and_then(|id| self.vertices.get(&id))
    }

    /// Linear scan for the vertex planned for `key`
    pub fn find_by_key(&self, key: &ObjectKey) -> Option<VertexId> {
        self.vertices().find(|v| v.key() == key).map(ObjectVertex::id)
    }

    pub fn validate(&self) -> Result<()> {
        self.dag.validate()
    }

    /// Execution order: dependencies first, root last
    pub fn reverse_topo_order(
        &self,
        less: &dyn Fn(&ObjectVertex, &ObjectVertex) -> bool,
    ) -> Result<Vec<VertexId>> {
        let by_id = |a: &VertexId, b: &VertexId| match (self.vertices.get(a), self.vertices.get(b)) {
            (Some(a), Some(b)) => less(a, b),
            _ => a < b,
        };
        self.dag.topo_order(true, Some(&by_id))
    }

    /// Scratch graph holding only a copy of the root, for concurrent branches
    pub fn branch(&self) -> ObjectGraph {
        let mut graph = ObjectGraph::new();
        if let Some(root) = self.root_vertex() {
            graph.base.insert(root.id(), root.clone());
            graph.add_vertex(root.clone());
        }
        graph
    }

    /// Fold a graph produced by [`branch`](Self::branch) back into this one.
    ///
    /// A vertex already present takes the branch copy when the branch
    /// changed its action or objects, so branches that left a shared vertex
    /// alone do not undo another branch's write. A new vertex whose key is
    /// already planned here is rejected.
    pub fn merge(&mut self, other: ObjectGraph) -> Result<()> {
        let ObjectGraph {
            dag,
            mut vertices,
            base,
        } = other;

        for id in dag.vertices() {
            let Some(vertex) = vertices.remove(id) else {
                continue;
            };
            match self.vertices.get_mut(id) {
                Some(existing) => {
                    let touched = match base.get(id) {
                        Some(copied) => !copied.same_write(&vertex),
                        None => !existing.same_write(&vertex),
                    };
                    if touched {
                        *existing = vertex;
                    }
                }
                None => {
                    if let Some(dup) = self.find_by_key(vertex.key()) {
                        return Err(Error::Internal(format!(
                            "object {} planned twice (vertex {} and {})",
                            vertex.key(),
                            dup,
                            id
                        )));
                    }
                    self.vertices.insert(*id, vertex);
                }
            }
        }

        self.dag.merge(&dag);
        Ok(())
    }
}

impl fmt::Display for ObjectGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let less = |a: &ObjectVertex, b: &ObjectVertex| a.key() < b.key();
        match self.reverse_topo_order(&less) {
            Ok(order) => {
                let parts: Vec<String> = order
                    .iter()
                    .filter_map(|id| self.vertices.get(id))
                    .map(|v| v.to_string())
                    .collect();
                write!(f, "{}", parts.join("->"))
            }
            Err(_) => write!(f, "->err"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectKind;
    use crate::plan::testing::{config_map, pod};
    use assert_matches::assert_matches;
    use k8s_openapi::api::core::v1::{ConfigMap, Pod};

    fn vertex(obj: DynamicObject, action: Option<Action>) -> ObjectVertex {
        let key = ObjectKey::new(
            ObjectKind::of::<ConfigMap>(),
            obj.metadata.namespace.as_deref(),
            obj.metadata.name.as_deref().unwrap_or_default(),
        );
        ObjectVertex::new(key, obj, None, action)
    }

    fn labelled(mut obj: DynamicObject, value: &str) -> DynamicObject {
        obj.metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert("step".into(), value.into());
        obj
    }

    fn rooted() -> ObjectGraph {
        let mut graph = ObjectGraph::new();
        let root = graph.add_vertex(vertex(config_map("root"), Some(Action::Status)));
        graph.add_connect_root(root);
        graph
    }

    #[test]
    fn test_merge_takes_branch_object_change() {
        let mut graph = rooted();
        let root = graph.root_id().unwrap();

        let mut branch = graph.branch();
        let copy = branch.vertex_mut(root).unwrap();
        copy.obj = labelled(copy.obj.clone(), "branch");

        graph.merge(branch).unwrap();
        let merged = graph.vertex(root).unwrap();
        assert_eq!(merged.action, Some(Action::Status));
        assert_eq!(
            merged.obj.metadata.labels.as_ref().unwrap()["step"],
            "branch"
        );
    }

    #[test]
    fn test_merge_untouched_branch_keeps_sibling_change() {
        let mut graph = rooted();
        let root = graph.root_id().unwrap();

        let mut changed = graph.branch();
        let untouched = graph.branch();
        let copy = changed.vertex_mut(root).unwrap();
        copy.obj = labelled(copy.obj.clone(), "changed");
        copy.action = Some(Action::Update);

        graph.merge(changed).unwrap();
        graph.merge(untouched).unwrap();

        let merged = graph.vertex(root).unwrap();
        assert_eq!(merged.action, Some(Action::Update));
        assert_eq!(
            merged.obj.metadata.labels.as_ref().unwrap()["step"],
            "changed"
        );
    }

    #[test]
    fn test_merge_adds_branch_vertices_and_rejects_duplicate_keys() {
        let mut graph = rooted();
        let root = graph.root_id().unwrap();

        let mut branch = graph.branch();
        let key = ObjectKey::new(ObjectKind::of::<Pod>(), Some("default"), "p");
        let id = branch.add_vertex(ObjectVertex::new(
            key.clone(),
            pod("p"),
            None,
            Some(Action::Create),
        ));
        branch.connect(root, id);
        graph.merge(branch).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.find_by_key(&key), Some(id));
        let less = |a: &ObjectVertex, b: &ObjectVertex| a.key() < b.key();
        let order = graph.reverse_topo_order(&less).unwrap();
        assert_eq!(order, vec![id, root]);

        let mut again = graph.branch();
        again.add_vertex(ObjectVertex::new(key, pod("p"), None, Some(Action::Create)));
        assert_matches!(graph.merge(again), Err(Error::Internal(_)));
    }
}
