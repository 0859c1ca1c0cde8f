//! Rollout status and the final Cluster write

use async_trait::async_trait;
use kube::runtime::events::EventType;
use tracing::{debug, info};

use super::context::RolloutTransformContext;
use super::inplace::inplace_spec;
use super::replace::{rollout_templates, template_replicas, template_suffix};
use super::target::Target;
use super::teardown::is_replaced;
use crate::crd::{Cluster, Rollout, RolloutState};
use crate::error::Result;
use crate::events::{actions, reasons};
use crate::model::{is_object_deleting, GraphClient, GraphOption, GraphWriter, ObjectGraph};
use crate::plan::{TransformContext, Transformer};

/// The component or sharding reached its target in the stored cluster
async fn is_target_done(
    client: &GraphClient,
    rollout: &Rollout,
    cluster: &Cluster,
    target: &Target,
    suffix: &str,
) -> Result<bool> {
    let Some(spec) = target.spec(cluster) else {
        return Ok(false);
    };
    if !target.is_running(cluster) {
        return Ok(false);
    }
    if target.strategy.inplace.is_some() {
        return Ok(inplace_spec(spec, target) == *spec);
    }
    if target.strategy.replace.is_none() {
        return Ok(true);
    }

    let torn_down = target
        .service_version
        .as_ref()
        .map_or(true, |sv| *sv == spec.service_version)
        && target.comp_def.as_ref().map_or(true, |cd| *cd == spec.comp_def)
        && target.status(rollout).map_or(true, |status| {
            status
                .scale_down_instances
                .iter()
                .all(|instance| !spec.offline_instances.contains(instance))
        });
    if !torn_down {
        return Ok(false);
    }
    is_replaced(client, rollout, cluster, target, suffix).await
}

/// Counts replace progress and derives the Rollout state
pub struct StatusTransformer;

impl StatusTransformer {
    /// Replica counters are totals: a sharding step moves one instance in
    /// every shard
    fn update_counters(ctx: &mut RolloutTransformContext, suffix: &str) -> Result<()> {
        let now = ctx.now;
        let Some(cluster) = ctx.cluster.as_ref() else {
            return Ok(());
        };
        let targets = Target::all(&ctx.rollout);
        for target in targets.iter().filter(|t| t.strategy.replace.is_some()) {
            let Some(spec) = target.spec(cluster) else {
                continue;
            };
            let shards = target.shards(cluster);
            let Some(status) = target.status_mut(&mut ctx.rollout) else {
                continue;
            };

            let new_replicas = template_replicas(spec, &rollout_templates(spec, suffix)) * shards;
            let rolled_out = i32::try_from(status.scale_down_instances.len())
                .unwrap_or(i32::MAX)
                .saturating_mul(shards);
            if new_replicas > status.new_replicas {
                status.last_scale_up_timestamp = Some(now);
            }
            if rolled_out > status.rolled_out_replicas {
                status.last_scale_down_timestamp = Some(now);
            }
            status.new_replicas = new_replicas;
            status.rolled_out_replicas = rolled_out;
        }
        Ok(())
    }
}

#[async_trait]
impl Transformer<RolloutTransformContext> for StatusTransformer {
    fn name(&self) -> &'static str {
        "status"
    }

    async fn transform(
        &self,
        ctx: &mut RolloutTransformContext,
        graph: &mut ObjectGraph,
    ) -> Result<()> {
        if is_object_deleting(&ctx.rollout_orig) {
            return Ok(());
        }
        let suffix = template_suffix(&ctx.rollout)?;
        Self::update_counters(ctx, &suffix)?;

        let previous = ctx.rollout_orig.state();
        let state = if previous == Some(RolloutState::Succeed) {
            RolloutState::Succeed
        } else {
            let mut done = true;
            for target in Target::all(&ctx.rollout) {
                let cluster = ctx.cluster_orig()?;
                if !is_target_done(ctx.client(), &ctx.rollout, cluster, &target, &suffix).await? {
                    done = false;
                    break;
                }
            }
            let changed = ctx.cluster_orig()?.spec != ctx.cluster()?.spec;
            if done {
                RolloutState::Succeed
            } else if changed || previous == Some(RolloutState::Rolling) {
                RolloutState::Rolling
            } else {
                RolloutState::Pending
            }
        };

        let generation = ctx.rollout.metadata.generation;
        let status = ctx.rollout.status_mut();
        status.state = Some(state);
        status.message = None;
        status.observed_generation = generation;

        if previous != Some(state) {
            info!(parent: ctx.span(), from = ?previous, to = %state, "Rollout state changed");
            match state {
                RolloutState::Rolling => {
                    ctx.publish(EventType::Normal, reasons::ROLLOUT_STARTED, actions::RECONCILE, None)
                        .await
                }
                RolloutState::Succeed => {
                    ctx.publish(EventType::Normal, reasons::ROLLOUT_SUCCEEDED, actions::RECONCILE, None)
                        .await
                }
                RolloutState::Pending | RolloutState::Error => {}
            }
        }

        let (orig, rollout) = ctx.rollout_objects()?;
        ctx.client()
            .status(graph, orig, rollout, &[GraphOption::ReplaceIfExisting])?;
        Ok(())
    }
}

/// Patches the Cluster when its labels or spec were changed
pub struct ClusterUpdateTransformer;

#[async_trait]
impl Transformer<RolloutTransformContext> for ClusterUpdateTransformer {
    fn name(&self) -> &'static str {
        "cluster"
    }

    async fn transform(
        &self,
        ctx: &mut RolloutTransformContext,
        graph: &mut ObjectGraph,
    ) -> Result<()> {
        let (Some(orig), Some(cluster)) = (&ctx.cluster_orig, &ctx.cluster) else {
            return Ok(());
        };
        if orig.metadata.labels == cluster.metadata.labels && orig.spec == cluster.spec {
            return Ok(());
        }
        debug!(parent: ctx.span(), "Cluster changed");
        let (orig, cluster) = ctx.cluster_objects()?;
        ctx.client()
            .patch(graph, orig, cluster, &[GraphOption::ReplaceIfExisting])?;
        Ok(())
    }
}
