//! Cluster CRD
//!
//! The workload a Rollout acts on: a set of named components and shardings,
//! each scaled through instance templates with flat ordinals. A sharding is
//! a number of identical components sharing one template spec.

use k8s_openapi::api::core::v1::{Affinity, Toleration, TopologySpreadConstraint};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::ObservedGeneration;

// =============================================================================
// Cluster CRD
// =============================================================================

/// Cluster describes a multi-component workload
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apps.rollout.io",
    version = "v1alpha1",
    kind = "Cluster",
    plural = "clusters",
    shortname = "cl",
    status = "ClusterStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Components of the cluster
    #[serde(default)]
    pub component_specs: Vec<ClusterComponentSpec>,

    #[serde(default)]
    pub shardings: Vec<ClusterSharding>,
}

// =============================================================================
// Sub-Types
// =============================================================================

/// One component of a cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterComponentSpec {
    pub name: String,

    /// Component definition the instances run
    #[serde(default)]
    pub comp_def: String,

    #[serde(default)]
    pub service_version: String,

    /// Total replicas, including those of instance templates
    #[serde(default)]
    pub replicas: i32,

    /// Instance templates overriding the component defaults
    #[serde(default)]
    pub instances: Vec<InstanceTemplate>,

    /// Instances to take offline, by pod name
    #[serde(default)]
    pub offline_instances: Vec<String>,

    /// Ordinals are shared across templates instead of per template
    #[serde(default)]
    pub flat_instance_ordinal: bool,
}

/// Shards of one component template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSharding {
    pub name: String,

    /// Spec every shard runs; `replicas` counts per shard
    pub template: ClusterComponentSpec,

    #[serde(default)]
    pub shards: i32,
}

/// A group of instances with their own overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTemplate {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comp_def: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling_policy: Option<SchedulingPolicy>,
}

/// Where the instances of a template are scheduled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_name: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topology_spread_constraints: Vec<TopologySpreadConstraint>,
}

impl InstanceTemplate {
    pub fn replicas(&self) -> i32 {
        self.replicas.unwrap_or(0)
    }
}

// =============================================================================
// Status
// =============================================================================

/// Status of the Cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Generation the status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ComponentPhase>,

    /// Per-component status by component name
    #[serde(default)]
    pub components: BTreeMap<String, ClusterComponentStatus>,

    /// Per-sharding status by sharding name
    #[serde(default)]
    pub shardings: BTreeMap<String, ClusterComponentStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterComponentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ComponentPhase>,
}

/// Phase of a cluster or one of its components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ComponentPhase {
    Creating,
    Running,
    Updating,
    Stopped,
    Failed,
    Abnormal,
}

impl std::fmt::Display for ComponentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentPhase::Creating => write!(f, "Creating"),
            ComponentPhase::Running => write!(f, "Running"),
            ComponentPhase::Updating => write!(f, "Updating"),
            ComponentPhase::Stopped => write!(f, "Stopped"),
            ComponentPhase::Failed => write!(f, "Failed"),
            ComponentPhase::Abnormal => write!(f, "Abnormal"),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

impl ObservedGeneration for Cluster {
    fn observed_generation(&self) -> Option<i64> {
        self.status.as_ref().and_then(|s| s.observed_generation)
    }
}

impl Cluster {
    pub fn component(&self, name: &str) -> Option<&ClusterComponentSpec> {
        self.spec.component_specs.iter().find(|c| c.name == name)
    }

    pub fn component_mut(&mut self, name: &str) -> Option<&mut ClusterComponentSpec> {
        self.spec.component_specs.iter_mut().find(|c| c.name == name)
    }

    pub fn sharding(&self, name: &str) -> Option<&ClusterSharding> {
        self.spec.shardings.iter().find(|s| s.name == name)
    }

    pub fn sharding_mut(&mut self, name: &str) -> Option<&mut ClusterSharding> {
        self.spec.shardings.iter_mut().find(|s| s.name == name)
    }

    /// The status reflects the current spec and both the cluster and the
    /// component are running
    pub fn is_component_running(&self, name: &str) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| self.is_running(status, &status.components, name))
    }

    /// Same as [`is_component_running`](Self::is_component_running), for a
    /// sharding
    pub fn is_sharding_running(&self, name: &str) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| self.is_running(status, &status.shardings, name))
    }

    fn is_running(
        &self,
        status: &ClusterStatus,
        phases: &BTreeMap<String, ClusterComponentStatus>,
        name: &str,
    ) -> bool {
        status.observed_generation.is_some()
            && status.observed_generation == self.metadata.generation
            && status.phase == Some(ComponentPhase::Running)
            && phases
                .get(name)
                .and_then(|c| c.phase)
                .is_some_and(|p| p == ComponentPhase::Running)
    }
}
