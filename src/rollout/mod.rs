//! Rollout Controller Planning
//!
//! One reconciliation of a Rollout is planned by this transformer chain:
//!
//! ```text
//! init -> deletion -> meta -> load -> validation -> setup
//!      -> inplace -> replace -> teardown -> status -> cluster
//! ```
//!
//! Components and shardings are planned alike, as [`Target`]s. The Rollout
//! is the plan root with a status write; the Cluster patch is its only
//! dependent, so it lands before the Rollout status.

mod builder;
mod context;
mod inplace;
mod lifecycle;
mod load;
mod replace;
mod status;
mod target;
mod teardown;

pub use builder::RolloutPlanBuilder;
pub use context::RolloutTransformContext;
pub use inplace::InplaceTransformer;
pub use lifecycle::{DeletionTransformer, InitTransformer, MetaTransformer};
pub use load::{LoadTransformer, SetupTransformer, ValidationTransformer};
pub use replace::ReplaceTransformer;
pub use status::{ClusterUpdateTransformer, StatusTransformer};
pub use target::{Target, TargetKind};
pub use teardown::TearDownTransformer;

use k8s_openapi::api::core::v1::Pod;
use std::time::Duration;

use crate::crd::{Cluster, Rollout};
use crate::model::Scheme;

/// Field manager and event reporter name
pub const CONTROLLER_NAME: &str = "rollout-controller";

pub(crate) const CLUSTER_NOT_FOUND_REQUEUE: Duration = Duration::from_secs(5);
pub(crate) const COMPONENT_NOT_READY_REQUEUE: Duration = Duration::from_secs(5);
pub(crate) const STALE_STATUS_REQUEUE: Duration = Duration::from_secs(1);
/// A negative delay waits for a spec change; check back once an hour
pub(crate) const INFINITE_DELAY_REQUEUE: Duration = Duration::from_secs(3600);

/// Kinds a Rollout plan reads or writes
pub fn scheme() -> Scheme {
    Scheme::new()
        .register::<Rollout>()
        .register::<Cluster>()
        .register::<Pod>()
}
