//! Cluster loading, validation and status setup

use async_trait::async_trait;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::warn;

use super::context::RolloutTransformContext;
use super::target::{Target, TargetKind};
use super::CLUSTER_NOT_FOUND_REQUEUE;
use crate::crd::{Cluster, RolloutComponentStatus, RolloutState, ROLLOUT_NAME_LABEL};
use crate::error::{Error, Result};
use crate::events::{actions, reasons};
use crate::model::{Action, GraphOption, GraphWriter, ObjectGraph};
use crate::plan::{TransformContext, Transformer};

/// Reads the Cluster named by the Rollout
pub struct LoadTransformer;

#[async_trait]
impl Transformer<RolloutTransformContext> for LoadTransformer {
    fn name(&self) -> &'static str {
        "load"
    }

    async fn transform(
        &self,
        ctx: &mut RolloutTransformContext,
        _graph: &mut ObjectGraph,
    ) -> Result<()> {
        let name = ctx.rollout.spec.cluster_name.clone();
        let cluster = ctx.client().get_opt::<Cluster>(ctx.namespace(), &name).await?;
        match cluster {
            Some(cluster) => {
                ctx.cluster_orig = Some(cluster.clone());
                ctx.cluster = Some(cluster);
                Ok(())
            }
            None => Err(Error::requeue_after(
                CLUSTER_NOT_FOUND_REQUEUE,
                format!("the cluster {} is not found", name),
            )),
        }
    }
}

/// Claims the Cluster for the Rollout
pub struct ValidationTransformer;

fn validate_target(cluster: &Cluster, target: &Target) -> Result<()> {
    target.require_spec(cluster)?;
    match (&target.strategy.inplace, &target.strategy.replace) {
        (Some(_), None) | (None, Some(_)) => Ok(()),
        _ => Err(Error::Validation(format!(
            "the {} must set exactly one rollout strategy",
            target
        ))),
    }
}

#[async_trait]
impl Transformer<RolloutTransformContext> for ValidationTransformer {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn transform(
        &self,
        ctx: &mut RolloutTransformContext,
        graph: &mut ObjectGraph,
    ) -> Result<()> {
        let rollout_name = ctx.rollout.name_any();
        let cluster = ctx.cluster()?;

        let owner = cluster
            .labels()
            .get(ROLLOUT_NAME_LABEL)
            .filter(|owner| **owner != rollout_name)
            .cloned();
        if let Some(owner) = owner {
            let message = format!(
                "the cluster {} is already being rolled out by {}",
                cluster.name_any(),
                owner
            );
            warn!(parent: ctx.span(), rollout = %rollout_name, %owner, "Cluster claimed by another rollout");

            let generation = ctx.rollout.metadata.generation;
            let status = ctx.rollout.status_mut();
            status.state = Some(RolloutState::Error);
            status.message = Some(message.clone());
            status.observed_generation = generation;
            let (orig, rollout) = ctx.rollout_objects()?;
            ctx.client().root(graph, Some(orig), rollout, Action::Status)?;

            ctx.publish(
                EventType::Warning,
                reasons::CLUSTER_CLAIMED,
                actions::RECONCILE,
                Some(message),
            )
            .await;
            return Err(Error::PrematureStop);
        }

        for target in Target::all(&ctx.rollout) {
            validate_target(cluster, &target)?;
        }

        if cluster.labels().get(ROLLOUT_NAME_LABEL) != Some(&rollout_name) {
            ctx.cluster_mut()?
                .labels_mut()
                .insert(ROLLOUT_NAME_LABEL.to_string(), rollout_name);
            let (orig, cluster) = ctx.cluster_objects()?;
            ctx.client()
                .patch(graph, orig, cluster, &[GraphOption::ReplaceIfExisting])?;
        }
        Ok(())
    }
}

/// Records where each component and sharding started from
pub struct SetupTransformer;

#[async_trait]
impl Transformer<RolloutTransformContext> for SetupTransformer {
    fn name(&self) -> &'static str {
        "setup"
    }

    async fn transform(
        &self,
        ctx: &mut RolloutTransformContext,
        graph: &mut ObjectGraph,
    ) -> Result<()> {
        let cluster = ctx.cluster()?;
        let mut components = Vec::new();
        let mut shardings = Vec::new();
        for target in Target::all(&ctx.rollout) {
            if target.status(&ctx.rollout).is_some() {
                continue;
            }
            let Some(spec) = target.spec(cluster) else {
                continue;
            };
            let initial = RolloutComponentStatus {
                name: target.name.clone(),
                service_version: spec.service_version.clone(),
                comp_def: spec.comp_def.clone(),
                replicas: spec.replicas * target.shards(cluster),
                ..Default::default()
            };
            match target.kind {
                TargetKind::Component => components.push(initial),
                TargetKind::Sharding => shardings.push(initial),
            }
        }

        let generation = ctx.rollout.metadata.generation;
        let status = ctx.rollout.status_mut();
        status.components.extend(components);
        status.shardings.extend(shardings);
        if status.state.is_none() {
            status.state = Some(RolloutState::Pending);
        }
        status.observed_generation = generation;

        // later transformers may stop early, the root carries the status so far
        let (orig, rollout) = ctx.rollout_objects()?;
        ctx.client().root(graph, Some(orig), rollout, Action::Status)?;
        Ok(())
    }
}
