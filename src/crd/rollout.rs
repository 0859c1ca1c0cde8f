//! Rollout CRD
//!
//! Declares a target service version and/or component definition for
//! components and shardings of one Cluster, and how to get there: in place,
//! or by replacing instances one at a time.

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::cluster::SchedulingPolicy;
use crate::model::ObservedGeneration;

// =============================================================================
// Rollout CRD
// =============================================================================

/// Rollout moves cluster components to a new version
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apps.rollout.io",
    version = "v1alpha1",
    kind = "Rollout",
    plural = "rollouts",
    shortname = "ro",
    status = "RolloutStatus",
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".spec.clusterName"}"#,
    printcolumn = r#"{"name": "State", "type": "string", "jsonPath": ".status.state"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RolloutSpec {
    /// Cluster in the same namespace
    pub cluster_name: String,

    #[serde(default)]
    pub components: Vec<RolloutComponent>,

    #[serde(default)]
    pub shardings: Vec<RolloutSharding>,
}

// =============================================================================
// Sub-Types
// =============================================================================

/// Target of one component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutComponent {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comp_def: Option<String>,

    /// Instances to roll out, absolute or a percentage of the component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "int_or_string_schema")]
    pub replicas: Option<IntOrString>,

    #[serde(default)]
    pub strategy: RolloutStrategy,
}

/// Target of one sharding; every shard is rolled out
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutSharding {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comp_def: Option<String>,

    #[serde(default)]
    pub strategy: RolloutStrategy,
}

fn int_or_string_schema(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject::default();
    schema
        .extensions
        .insert("x-kubernetes-int-or-string".to_string(), true.into());
    Schema::Object(schema)
}

/// Exactly one strategy is expected to be set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStrategy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inplace: Option<RolloutStrategyInplace>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<RolloutStrategyReplace>,
}

/// Update the component spec directly
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RolloutStrategyInplace {}

/// Create a new instance, then take an old one offline, repeatedly
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStrategyReplace {
    /// Wait between scaling up consecutive instances; negative waits forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_instance_interval_seconds: Option<i32>,

    /// Wait between scaling up and scaling down; negative waits forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_delay_seconds: Option<i32>,

    /// Scheduling of the new instances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling_policy: Option<SchedulingPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_meta: Option<RolloutInstanceMeta>,
}

/// Metadata of the instances a Rollout creates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutInstanceMeta {
    /// Set on the new instances while they run next to the old ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canary: Option<InstanceMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

// =============================================================================
// Status
// =============================================================================

/// Status of the Rollout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RolloutState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub components: Vec<RolloutComponentStatus>,

    #[serde(default)]
    pub shardings: Vec<RolloutComponentStatus>,
}

/// Rollout progress of one component or sharding.
///
/// Replica counts of a sharding are totals over its shards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutComponentStatus {
    pub name: String,

    /// Original service version
    #[serde(default)]
    pub service_version: String,

    /// Original component definition
    #[serde(default)]
    pub comp_def: String,

    /// Original replicas
    #[serde(default)]
    pub replicas: i32,

    /// Replicas of the new instance templates
    #[serde(default)]
    pub new_replicas: i32,

    /// Old instances taken offline
    #[serde(default)]
    pub rolled_out_replicas: i32,

    #[serde(default)]
    pub scale_down_instances: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_scale_up_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_scale_down_timestamp: Option<DateTime<Utc>>,
}

/// Rollout state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RolloutState {
    Pending,
    Rolling,
    Succeed,
    Error,
}

impl std::fmt::Display for RolloutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RolloutState::Pending => write!(f, "Pending"),
            RolloutState::Rolling => write!(f, "Rolling"),
            RolloutState::Succeed => write!(f, "Succeed"),
            RolloutState::Error => write!(f, "Error"),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

impl ObservedGeneration for Rollout {
    fn observed_generation(&self) -> Option<i64> {
        self.status.as_ref().and_then(|s| s.observed_generation)
    }
}

impl Rollout {
    pub fn state(&self) -> Option<RolloutState> {
        self.status.as_ref().and_then(|s| s.state)
    }

    pub fn is_succeed(&self) -> bool {
        self.state() == Some(RolloutState::Succeed)
    }

    pub fn component_status(&self, name: &str) -> Option<&RolloutComponentStatus> {
        self.status
            .as_ref()
            .and_then(|s| s.components.iter().find(|c| c.name == name))
    }

    pub fn component_status_mut(&mut self, name: &str) -> Option<&mut RolloutComponentStatus> {
        self.status
            .as_mut()
            .and_then(|s| s.components.iter_mut().find(|c| c.name == name))
    }

    pub fn sharding_status(&self, name: &str) -> Option<&RolloutComponentStatus> {
        self.status
            .as_ref()
            .and_then(|s| s.shardings.iter().find(|c| c.name == name))
    }

    pub fn sharding_status_mut(&mut self, name: &str) -> Option<&mut RolloutComponentStatus> {
        self.status
            .as_mut()
            .and_then(|s| s.shardings.iter_mut().find(|c| c.name == name))
    }

    pub fn status_mut(&mut self) -> &mut RolloutStatus {
        self.status.get_or_insert_with(RolloutStatus::default)
    }
}
