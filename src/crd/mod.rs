//! Custom Resource Definitions for the Rollout Operator
//!
//! This module contains all CRD types:
//! - Cluster: components and shardings scaled through instance templates
//! - Rollout: version change of a Cluster's components and shardings

pub mod cluster;
pub mod rollout;

pub use cluster::*;
pub use rollout::*;

/// API group of the operator's resources
pub const API_GROUP: &str = "apps.rollout.io";

/// Finalizer held on every Rollout until its cluster label is released
pub const ROLLOUT_FINALIZER: &str = "rollout.apps.rollout.io/finalizer";

// =============================================================================
// Labels & Annotations
// =============================================================================

/// Cluster label naming the Rollout that owns it
pub const ROLLOUT_NAME_LABEL: &str = "apps.rollout.io/rollout-name";

/// Pod label: owning cluster
pub const APP_INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Pod label: component within the cluster
pub const COMPONENT_NAME_LABEL: &str = "apps.rollout.io/component-name";

/// Pod label: sharding the pod's component belongs to
pub const SHARDING_NAME_LABEL: &str = "apps.rollout.io/sharding-name";

/// Pod label: release phase
pub const RELEASE_PHASE_LABEL: &str = "apps.rollout.io/release-phase";

pub const RELEASE_PHASE_STABLE: &str = "stable";

/// Pod label: instance template the pod was created from
pub const INSTANCE_TEMPLATE_LABEL: &str = "apps.rollout.io/instance-template-name";

/// Annotation on instance templates a Rollout created
pub const TEMPLATE_CREATED_BY_ANNOTATION: &str = "apps.rollout.io/instance-template-created-by";
