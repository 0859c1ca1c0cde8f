//! DAG container
//!
//! Vertices and edges are held in insertion-ordered sets, so every walk is
//! deterministic for a given construction sequence. Callers that need a
//! specific order among siblings pass a `less` tie-break.
//!
//! Invariants (single root, no cycles) are only checked by [`Dag::validate`],
//! which every walk calls first. The root is recomputed on each call and
//! never cached, since vertices and edges keep changing after it is set.

use indexmap::IndexSet;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

use crate::error::{Error, Result};

/// Strict "a sorts before b" comparison used to break ties between siblings
pub type LessFn<'a, V> = &'a dyn Fn(&V, &V) -> bool;

// =============================================================================
// Edge
// =============================================================================

/// Directed edge; `from` is processed after `to`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge<V> {
    pub from: V,
    pub to: V,
}

impl<V> Edge<V> {
    pub fn new(from: V, to: V) -> Self {
        Self { from, to }
    }
}

// =============================================================================
// Dag
// =============================================================================

/// Directed graph with on-demand acyclicity and single-root validation.
///
/// Not internally synchronised. Concurrent writers must each work on their
/// own graph and [`merge`](Dag::merge) the results.
#[derive(Debug, Clone)]
pub struct Dag<V: Eq + Hash> {
    vertices: IndexSet<V>,
    edges: IndexSet<Edge<V>>,
}

impl<V: Eq + Hash> Default for Dag<V> {
    fn default() -> Self {
        Self {
            vertices: IndexSet::new(),
            edges: IndexSet::new(),
        }
    }
}

#[derive(Clone, Copy)]
enum Mark {
    Visiting,
    Done,
}

impl<V> Dag<V>
where
    V: Clone + Eq + Hash + fmt::Display,
{
    /// Create an empty graph with no root
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex; returns false if it was already present
    pub fn add_vertex(&mut self, v: V) -> bool {
        self.vertices.insert(v)
    }

    /// Remove a vertex and every edge touching it; returns whether it was present
    pub fn remove_vertex(&mut self, v: &V) -> bool {
        self.edges.retain(|e| &e.from != v && &e.to != v);
        self.vertices.shift_remove(v)
    }

    /// Add `from -> to`, adding missing endpoints.
    ///
    /// Connecting an existing edge again leaves a single edge in place and
    /// returns false.
    pub fn connect(&mut self, from: V, to: V) -> bool {
        self.vertices.insert(from.clone());
        self.vertices.insert(to.clone());
        self.edges.insert(Edge::new(from, to))
    }

    /// Add `to` and connect `from -> to`; fails when `from` is not in the graph
    pub fn add_connect(&mut self, from: &V, to: V) -> bool {
        if !self.vertices.contains(from) {
            return false;
        }
        self.vertices.insert(to.clone());
        self.edges.insert(Edge::new(from.clone(), to));
        true
    }

    /// Make `v` a direct dependent of the current root; fails without a root
    pub fn add_connect_root(&mut self, v: V) -> bool {
        match self.root() {
            Some(root) if root != v => {
                self.connect(root, v);
                true
            }
            _ => false,
        }
    }

    /// Low-level edge insert. Endpoints are not added as vertices.
    pub fn add_edge(&mut self, edge: Edge<V>) -> bool {
        self.edges.insert(edge)
    }

    pub fn remove_edge(&mut self, edge: &Edge<V>) -> bool {
        self.edges.shift_remove(edge)
    }

    /// The single vertex with no incoming edge, if exactly one exists
    pub fn root(&self) -> Option<V> {
        self.root_ref().cloned()
    }

    fn root_ref(&self) -> Option<&V> {
        let targets: HashSet<&V> = self.edges.iter().map(|e| &e.to).collect();
        let mut roots = self.vertices.iter().filter(|v| !targets.contains(v));
        match (roots.next(), roots.next()) {
            (Some(root), None) => Some(root),
            _ => None,
        }
    }

    pub fn vertices(&self) -> impl Iterator<Item = &V> {
        self.vertices.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge<V>> {
        self.edges.iter()
    }

    pub fn contains(&self, v: &V) -> bool {
        self.vertices.contains(v)
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Direct dependencies of `v`, in edge insertion order
    pub fn out_neighbors<'a>(&'a self, v: &'a V) -> impl Iterator<Item = &'a V> + 'a {
        self.edges.iter().filter(move |e| &e.from == v).map(|e| &e.to)
    }

    /// Check the single-root, self-cycle and cycle invariants, in that order
    pub fn validate(&self) -> Result<()> {
        if self.root_ref().is_none() {
            return Err(Error::NoSingleRoot);
        }

        if let Some(edge) = self.edges.iter().find(|e| e.from == e.to) {
            return Err(Error::SelfCycle(edge.from.to_string()));
        }

        let adj = self.adjacency(None);
        let mut marks: HashMap<&V, Mark> = HashMap::with_capacity(self.vertices.len());
        for start in &self.vertices {
            if marks.contains_key(start) {
                continue;
            }
            marks.insert(start, Mark::Visiting);
            let mut stack: Vec<(&V, usize)> = vec![(start, 0)];
            while let Some(top) = stack.last_mut() {
                let (v, next) = (top.0, top.1);
                let children = adj.get(v).map(Vec::as_slice).unwrap_or(&[]);
                if next < children.len() {
                    top.1 += 1;
                    let child = children[next];
                    match marks.get(child) {
                        Some(Mark::Visiting) => return Err(Error::CycleFound),
                        Some(Mark::Done) => {}
                        None => {
                            marks.insert(child, Mark::Visiting);
                            stack.push((child, 0));
                        }
                    }
                } else {
                    marks.insert(v, Mark::Done);
                    stack.pop();
                }
            }
        }

        Ok(())
    }

    // =========================================================================
    // Walks
    // =========================================================================

    /// Visit the root first, then every vertex before its dependencies
    pub fn walk_topo_order<F>(&self, mut visit: F, less: Option<LessFn<'_, V>>) -> Result<()>
    where
        F: FnMut(&V) -> Result<()>,
    {
        for v in self.post_order(less)?.into_iter().rev() {
            visit(v)?;
        }
        Ok(())
    }

    /// Visit dependencies before dependents, ending at the root
    pub fn walk_reverse_topo_order<F>(
        &self,
        mut visit: F,
        less: Option<LessFn<'_, V>>,
    ) -> Result<()>
    where
        F: FnMut(&V) -> Result<()>,
    {
        for v in self.post_order(less)? {
            visit(v)?;
        }
        Ok(())
    }

    /// Breadth-first from the root, siblings ordered by `less`
    pub fn walk_bfs<F>(&self, mut visit: F, less: Option<LessFn<'_, V>>) -> Result<()>
    where
        F: FnMut(&V) -> Result<()>,
    {
        self.validate()?;
        let root = self.root_ref().ok_or(Error::NoSingleRoot)?;
        let adj = self.adjacency(less);

        let mut seen: HashSet<&V> = HashSet::new();
        let mut queue: VecDeque<&V> = VecDeque::new();
        seen.insert(root);
        queue.push_back(root);
        while let Some(v) = queue.pop_front() {
            visit(v)?;
            for child in adj.get(v).into_iter().flatten() {
                if seen.insert(*child) {
                    queue.push_back(*child);
                }
            }
        }
        Ok(())
    }

    /// Owned copy of a walk order, for callers that visit asynchronously
    pub fn topo_order(&self, reverse: bool, less: Option<LessFn<'_, V>>) -> Result<Vec<V>> {
        let mut order: Vec<V> = self.post_order(less)?.into_iter().cloned().collect();
        if !reverse {
            order.reverse();
        }
        Ok(order)
    }

    /// DFS post-order from the root along out-edges
    fn post_order(&self, less: Option<LessFn<'_, V>>) -> Result<Vec<&V>> {
        self.validate()?;
        let root = self.root_ref().ok_or(Error::NoSingleRoot)?;
        let adj = self.adjacency(less);

        let mut order = Vec::with_capacity(self.vertices.len());
        let mut visited: HashSet<&V> = HashSet::with_capacity(self.vertices.len());
        let mut stack: Vec<(&V, usize)> = vec![(root, 0)];
        visited.insert(root);
        while let Some(top) = stack.last_mut() {
            let (v, next) = (top.0, top.1);
            let children = adj.get(v).map(Vec::as_slice).unwrap_or(&[]);
            if next < children.len() {
                top.1 += 1;
                let child = children[next];
                if visited.insert(child) {
                    stack.push((child, 0));
                }
            } else {
                order.push(v);
                stack.pop();
            }
        }
        Ok(order)
    }

    fn adjacency(&self, less: Option<LessFn<'_, V>>) -> HashMap<&V, Vec<&V>> {
        let mut adj: HashMap<&V, Vec<&V>> = HashMap::with_capacity(self.vertices.len());
        for edge in &self.edges {
            adj.entry(&edge.from).or_default().push(&edge.to);
        }
        if let Some(less) = less {
            for children in adj.values_mut() {
                children.sort_by(|a, b| compare(*a, *b, less));
            }
        }
        adj
    }

    // =========================================================================
    // Comparison & Merge
    // =========================================================================

    /// Structural equality under `less`, ignoring insertion order.
    ///
    /// Two vertices are the same when neither sorts before the other.
    /// Returns false when either `other` or `less` is missing.
    pub fn equals(&self, other: Option<&Dag<V>>, less: Option<LessFn<'_, V>>) -> bool {
        let (other, less) = match (other, less) {
            (Some(other), Some(less)) => (other, less),
            _ => return false,
        };
        if self.vertices.len() != other.vertices.len() || self.edges.len() != other.edges.len() {
            return false;
        }

        let mine = sorted_vertices(&self.vertices, less);
        let theirs = sorted_vertices(&other.vertices, less);
        if mine
            .iter()
            .zip(&theirs)
            .any(|(a, b)| compare(*a, *b, less) != Ordering::Equal)
        {
            return false;
        }

        match (edge_indexes(&self.edges, &mine), edge_indexes(&other.edges, &theirs)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Union `other` into this graph.
    ///
    /// Every vertex without an incoming edge in `other` becomes a direct
    /// dependent of this graph's root, so the result keeps a single root.
    pub fn merge(&mut self, other: &Dag<V>) {
        let primary = self.root();

        for v in &other.vertices {
            self.vertices.insert(v.clone());
        }
        for edge in &other.edges {
            self.vertices.insert(edge.from.clone());
            self.vertices.insert(edge.to.clone());
            self.edges.insert(edge.clone());
        }

        if let Some(root) = primary {
            let targets: HashSet<&V> = other.edges.iter().map(|e| &e.to).collect();
            for v in other.vertices.iter().filter(|v| !targets.contains(v)) {
                if *v != root {
                    self.edges.insert(Edge::new(root.clone(), v.clone()));
                }
            }
        }
    }
}

fn compare<V>(a: &V, b: &V, less: LessFn<'_, V>) -> Ordering {
    if less(a, b) {
        Ordering::Less
    } else if less(b, a) {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

fn sorted_vertices<'a, V>(vertices: &'a IndexSet<V>, less: LessFn<'_, V>) -> Vec<&'a V> {
    let mut sorted: Vec<&V> = vertices.iter().collect();
    sorted.sort_by(|a, b| compare(*a, *b, less));
    sorted
}

fn edge_indexes<V: Eq>(edges: &IndexSet<Edge<V>>, sorted: &[&V]) -> Option<HashSet<(usize, usize)>> {
    let index = |v: &V| sorted.iter().position(|x| *x == v);
    edges
        .iter()
        .map(|e| Some((index(&e.from)?, index(&e.to)?)))
        .collect()
}

impl<V> fmt::Display for Dag<V>
where
    V: Clone + Eq + Hash + fmt::Display,
{
    /// One reverse-topological walk, e.g. `leaf->mid->root`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.post_order(None) {
            Ok(order) => {
                let parts: Vec<String> = order.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join("->"))
            }
            Err(_) => write!(f, "->err"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn less(a: &i32, b: &i32) -> bool {
        a < b
    }

    fn new_test_dag() -> Dag<i32> {
        let mut dag = Dag::new();
        for (from, to) in [
            (2, 3),
            (0, 6),
            (0, 1),
            (2, 0),
            (1, 5),
            (5, 4),
            (0, 5),
            (6, 4),
            (6, 9),
            (9, 10),
            (9, 11),
            (9, 12),
            (11, 12),
            (3, 5),
            (7, 2),
            (7, 6),
            (8, 7),
        ] {
            dag.connect(from, to);
        }
        dag
    }

    fn collect_walk(dag: &Dag<i32>, reverse: bool) -> Vec<i32> {
        let mut seen = Vec::new();
        let visit = |v: &i32| {
            seen.push(*v);
            Ok(())
        };
        if reverse {
            dag.walk_reverse_topo_order(visit, Some(&less)).unwrap();
        } else {
            dag.walk_topo_order(visit, Some(&less)).unwrap();
        }
        seen
    }

    #[test]
    fn test_reverse_topo_order() {
        let dag = new_test_dag();
        assert_eq!(dag.root(), Some(8));
        assert_eq!(
            collect_walk(&dag, true),
            vec![4, 5, 1, 10, 12, 11, 9, 6, 0, 3, 2, 7, 8]
        );
    }

    #[test]
    fn test_topo_order() {
        let dag = new_test_dag();
        assert_eq!(
            collect_walk(&dag, false),
            vec![8, 7, 2, 3, 0, 6, 9, 11, 12, 10, 1, 5, 4]
        );
        assert_eq!(
            dag.topo_order(false, Some(&less)).unwrap(),
            vec![8, 7, 2, 3, 0, 6, 9, 11, 12, 10, 1, 5, 4]
        );
    }

    #[test]
    fn test_reverse_walk_visits_dependencies_first() {
        let dag = new_test_dag();
        let order = collect_walk(&dag, true);
        let pos = |v: i32| order.iter().position(|x| *x == v).unwrap();
        for edge in dag.edges() {
            assert!(pos(edge.to) < pos(edge.from), "{} before {}", edge.to, edge.from);
        }
    }

    #[test]
    fn test_bfs() {
        let dag = new_test_dag();
        let mut seen = Vec::new();
        dag.walk_bfs(
            |v| {
                seen.push(*v);
                Ok(())
            },
            Some(&less),
        )
        .unwrap();
        assert_eq!(seen, vec![8, 7, 2, 6, 0, 3, 4, 9, 1, 5, 10, 11, 12]);
    }

    #[test]
    fn test_walk_stops_on_first_error() {
        let dag = new_test_dag();
        let mut count = 0;
        let result = dag.walk_reverse_topo_order(
            |v| {
                count += 1;
                if *v == 10 {
                    return Err(Error::Internal("stop".into()));
                }
                Ok(())
            },
            Some(&less),
        );
        assert_matches!(result, Err(Error::Internal(_)));
        assert_eq!(count, 4);
    }

    #[test]
    fn test_validate() {
        let dag: Dag<i32> = Dag::new();
        assert_eq!(dag.validate().unwrap_err().to_string(), "no single Root found");

        let mut dag = Dag::new();
        dag.connect(0, 1);
        dag.connect(1, 2);
        dag.connect(2, 3);
        dag.connect(3, 1);
        assert_eq!(dag.validate().unwrap_err().to_string(), "cycle found");

        dag.connect(1, 1);
        assert_eq!(dag.validate().unwrap_err().to_string(), "self-cycle found: 1");

        assert!(new_test_dag().validate().is_ok());
    }

    #[test]
    fn test_two_roots_is_invalid() {
        let mut dag = Dag::new();
        dag.connect(1, 2);
        dag.add_vertex(3);
        assert_eq!(dag.root(), None);
        assert_matches!(dag.validate(), Err(Error::NoSingleRoot));
        assert!(!dag.add_connect_root(4));
    }

    #[test]
    fn test_vertex_and_edge_ops() {
        let mut dag = Dag::new();
        assert!(dag.add_vertex(1));
        assert!(!dag.add_vertex(1));
        assert_eq!(dag.root(), Some(1));

        assert!(dag.add_connect_root(2));
        assert!(!dag.connect(1, 2));
        assert_eq!(dag.edges().count(), 1);

        assert!(!dag.add_connect(&9, 3));
        assert!(dag.add_connect(&2, 3));
        assert!(dag.contains(&3));

        assert!(dag.remove_vertex(&2));
        assert!(!dag.remove_vertex(&2));
        assert_eq!(dag.edges().count(), 0);
        // root is recomputed: 1 and 3 are both sources now
        assert_eq!(dag.root(), None);

        assert!(dag.add_edge(Edge::new(1, 3)));
        assert_eq!(dag.root(), Some(1));
        assert!(dag.remove_edge(&Edge::new(1, 3)));
        assert!(!dag.remove_edge(&Edge::new(1, 3)));
    }

    #[test]
    fn test_equals_ignores_insertion_order() {
        let a = new_test_dag();

        let mut b = Dag::new();
        let mut edges: Vec<Edge<i32>> = a.edges().cloned().collect();
        edges.reverse();
        for edge in edges {
            b.connect(edge.from, edge.to);
        }

        assert!(a.equals(Some(&b), Some(&less)));
        assert!(b.equals(Some(&a), Some(&less)));
        assert!(!a.equals(None, Some(&less)));
        assert!(!a.equals(Some(&b), None));

        b.connect(4, 12);
        assert!(!a.equals(Some(&b), Some(&less)));
    }

    #[test]
    fn test_merge() {
        let mut primary = Dag::new();
        primary.connect(1, 2);

        let mut other = Dag::new();
        for (from, to) in [(2, 3), (2, 4), (3, 5), (4, 5), (6, 4), (6, 5)] {
            other.connect(from, to);
        }

        let mut expected = Dag::new();
        for (from, to) in [
            (1, 2),
            (1, 6),
            (2, 3),
            (2, 4),
            (3, 5),
            (4, 5),
            (6, 4),
            (6, 5),
        ] {
            expected.connect(from, to);
        }

        primary.merge(&other);
        assert!(primary.equals(Some(&expected), Some(&less)));
        assert_eq!(primary.root(), Some(1));
    }

    #[test]
    fn test_display() {
        let mut dag = Dag::new();
        dag.connect("a".to_string(), "b".to_string());
        dag.connect("a".to_string(), "c".to_string());
        assert_eq!(dag.to_string(), "b->c->a");

        dag.connect("c".to_string(), "a".to_string());
        assert_eq!(dag.to_string(), "->err");
    }
}
