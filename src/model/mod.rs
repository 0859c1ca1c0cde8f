//! Object Graph Model
//!
//! The object layer on top of [`crate::graph`]:
//! - `object`: kinds, keys, the type registry and object predicates
//! - `vertex`: `ObjectVertex`, `Action` and the `ObjectGraph`
//! - `options`: write options
//! - `graph_client`: read-through client and the idempotent graph writer

pub mod graph_client;
pub mod object;
pub mod options;
pub mod vertex;

pub use graph_client::*;
pub use object::*;
pub use options::*;
pub use vertex::*;
