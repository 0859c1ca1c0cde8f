//! Generic Directed Graph
//!
//! A small DAG container used to order planned writes. Vertices are any
//! hashable value; an edge `A -> B` means A is processed after B.

pub mod dag;

pub use dag::*;
