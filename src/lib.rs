//! Rollout Operator - Graph-Planned Reconciliation
//!
//! A reconciliation is planned as a DAG of object writes before anything
//! touches the API server, then executed dependencies first.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Rollout Controller                         │
//! │        (kube-runtime Controller, backoff, metrics, events)       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐      ┌──────────────────────────────┐  │
//! │  │   Transformer Chain  │ ───▶ │   Plan (reverse topo walk)   │  │
//! │  │   (PlanBuilder)      │      │   VertexExecutor             │  │
//! │  └──────────┬───────────┘      └──────────────┬───────────────┘  │
//! │             │                                 │                  │
//! │  ┌──────────┴───────────┐      ┌──────────────┴───────────────┐  │
//! │  │  Object Graph        │      │  Object Store                │  │
//! │  │  (GraphClient, Dag)  │      │  (Kubernetes / in-memory)    │  │
//! │  └──────────────────────┘      └──────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`graph`]: generic DAG with validation and ordered walks
//! - [`model`]: object vertices, actions and the graph client
//! - [`plan`]: transformer chain, plan building and execution
//! - [`store`]: object stores backing reads and writes
//! - [`rollout`]: Rollout planning transformers
//! - [`controller`]: the running controller
//! - [`crd`]: Custom Resource Definitions
//! - [`events`]: Kubernetes Event recording
//! - [`error`]: Error types and handling

pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod graph;
pub mod model;
pub mod plan;
pub mod rollout;
pub mod store;

// Re-export commonly used types
pub use controller::{Context, ControllerConfig, Metrics};

pub use crd::{Cluster, ClusterSpec, Rollout, RolloutSpec, RolloutState, RolloutStatus};

pub use error::{Error, ErrorAction, Result};

pub use graph::{Dag, Edge};

pub use model::{
    Action, GraphClient, GraphOption, GraphWriter, ObjectGraph, ObjectKey, ObjectKind,
    ObjectVertex, Scheme,
};

pub use plan::{
    ObjectExecutor, Plan, PlanBuilder, PlanState, TransformContext, Transformer,
    VertexExecutor,
};

pub use rollout::{RolloutPlanBuilder, RolloutTransformContext};

pub use store::{KubeStore, MemoryStore, ObjectReader, ObjectStore, ObjectWriter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
