//! Components and shardings as rollout targets
//!
//! A sharding rolls out like a component whose spec is the sharding
//! template, except that every template replica stands for one instance per
//! shard. Status replica counts of a sharding are totals over its shards.

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;

use crate::crd::{
    Cluster, ClusterComponentSpec, Rollout, RolloutComponent, RolloutComponentStatus,
    RolloutSharding, RolloutStrategy, APP_INSTANCE_LABEL, COMPONENT_NAME_LABEL,
    RELEASE_PHASE_LABEL, RELEASE_PHASE_STABLE, SHARDING_NAME_LABEL,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Component,
    Sharding,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Component => write!(f, "component"),
            TargetKind::Sharding => write!(f, "sharding"),
        }
    }
}

/// A component or sharding named by a Rollout
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub kind: TargetKind,
    pub name: String,
    pub service_version: Option<String>,
    pub comp_def: Option<String>,
    /// Components only, shardings always roll out every instance
    pub replicas: Option<IntOrString>,
    pub strategy: RolloutStrategy,
}

impl From<&RolloutComponent> for Target {
    fn from(comp: &RolloutComponent) -> Self {
        Self {
            kind: TargetKind::Component,
            name: comp.name.clone(),
            service_version: comp.service_version.clone(),
            comp_def: comp.comp_def.clone(),
            replicas: comp.replicas.clone(),
            strategy: comp.strategy.clone(),
        }
    }
}

impl From<&RolloutSharding> for Target {
    fn from(sharding: &RolloutSharding) -> Self {
        Self {
            kind: TargetKind::Sharding,
            name: sharding.name.clone(),
            service_version: sharding.service_version.clone(),
            comp_def: sharding.comp_def.clone(),
            replicas: None,
            strategy: sharding.strategy.clone(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

impl Target {
    /// Components, then shardings, in spec order
    pub fn all(rollout: &Rollout) -> Vec<Target> {
        rollout
            .spec
            .components
            .iter()
            .map(Target::from)
            .chain(rollout.spec.shardings.iter().map(Target::from))
            .collect()
    }

    /// The component spec, or the template of the sharding
    pub fn spec<'a>(&self, cluster: &'a Cluster) -> Option<&'a ClusterComponentSpec> {
        match self.kind {
            TargetKind::Component => cluster.component(&self.name),
            TargetKind::Sharding => cluster.sharding(&self.name).map(|s| &s.template),
        }
    }

    pub fn spec_mut<'a>(&self, cluster: &'a mut Cluster) -> Option<&'a mut ClusterComponentSpec> {
        match self.kind {
            TargetKind::Component => cluster.component_mut(&self.name),
            TargetKind::Sharding => cluster.sharding_mut(&self.name).map(|s| &mut s.template),
        }
    }

    pub fn require_spec<'a>(&self, cluster: &'a Cluster) -> Result<&'a ClusterComponentSpec> {
        self.spec(cluster).ok_or_else(|| {
            Error::Validation(format!(
                "the {} is not found in cluster {}",
                self,
                cluster.name_any()
            ))
        })
    }

    /// Instances per template replica
    pub fn shards(&self, cluster: &Cluster) -> i32 {
        match self.kind {
            TargetKind::Component => 1,
            TargetKind::Sharding => cluster.sharding(&self.name).map_or(0, |s| s.shards),
        }
    }

    pub fn is_running(&self, cluster: &Cluster) -> bool {
        match self.kind {
            TargetKind::Component => cluster.is_component_running(&self.name),
            TargetKind::Sharding => cluster.is_sharding_running(&self.name),
        }
    }

    pub fn status<'a>(&self, rollout: &'a Rollout) -> Option<&'a RolloutComponentStatus> {
        match self.kind {
            TargetKind::Component => rollout.component_status(&self.name),
            TargetKind::Sharding => rollout.sharding_status(&self.name),
        }
    }

    pub fn status_mut<'a>(&self, rollout: &'a mut Rollout) -> Option<&'a mut RolloutComponentStatus> {
        match self.kind {
            TargetKind::Component => rollout.component_status_mut(&self.name),
            TargetKind::Sharding => rollout.sharding_status_mut(&self.name),
        }
    }

    /// Selector of the stable pods of the target, every shard included
    pub fn stable_pod_labels(&self, cluster: &Cluster) -> BTreeMap<String, String> {
        let owner = match self.kind {
            TargetKind::Component => COMPONENT_NAME_LABEL,
            TargetKind::Sharding => SHARDING_NAME_LABEL,
        };
        BTreeMap::from([
            (APP_INSTANCE_LABEL.to_string(), cluster.name_any()),
            (owner.to_string(), self.name.clone()),
            (RELEASE_PHASE_LABEL.to_string(), RELEASE_PHASE_STABLE.to_string()),
        ])
    }
}
