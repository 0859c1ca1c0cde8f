//! Tear-down of a finished replace
//!
//! Once every instance runs from the Rollout's templates and the old ones
//! are gone, the component spec (or sharding template) itself adopts the
//! target version and forgets the instances the Rollout took offline.

use async_trait::async_trait;
use tracing::info;

use super::context::RolloutTransformContext;
use super::replace::{
    is_old_pod, replace_replicas, rollout_templates, stable_pods, template_replicas,
    template_suffix,
};
use super::target::Target;
use crate::crd::{Cluster, Rollout};
use crate::error::Result;
use crate::model::{is_object_deleting, GraphClient, ObjectGraph};
use crate::plan::{TransformContext, Transformer};

/// Every instance of the target, in every shard, runs from the Rollout's
/// templates
pub(super) async fn is_replaced(
    client: &GraphClient,
    rollout: &Rollout,
    cluster: &Cluster,
    target: &Target,
    suffix: &str,
) -> Result<bool> {
    let spec = target.require_spec(cluster)?;
    let shards = target.shards(cluster);
    let (replicas, _) = replace_replicas(rollout, target, spec, shards)?;
    let tpls = rollout_templates(spec, suffix);
    if template_replicas(spec, &tpls) != replicas || spec.replicas != replicas {
        return Ok(false);
    }
    if !target.is_running(cluster) {
        return Ok(false);
    }

    let pods = stable_pods(client, cluster, target).await?;
    let live = || pods.iter().filter(|pod| !is_object_deleting(*pod));
    let old = live().filter(|pod| is_old_pod(pod, suffix)).count();
    let new = live().filter(|pod| !is_old_pod(pod, suffix)).count();
    Ok(old == 0 && i32::try_from(new).is_ok_and(|new| new == replicas * shards))
}

pub struct TearDownTransformer;

#[async_trait]
impl Transformer<RolloutTransformContext> for TearDownTransformer {
    fn name(&self) -> &'static str {
        "teardown"
    }

    async fn transform(
        &self,
        ctx: &mut RolloutTransformContext,
        _graph: &mut ObjectGraph,
    ) -> Result<()> {
        if is_object_deleting(&ctx.rollout_orig) || ctx.rollout_orig.is_succeed() {
            return Ok(());
        }
        let suffix = template_suffix(&ctx.rollout)?;

        let targets = Target::all(&ctx.rollout);
        for target in targets.iter().filter(|t| t.strategy.replace.is_some()) {
            // judged on the stored cluster, a step planned in this pass has not landed yet
            if !is_replaced(ctx.client(), &ctx.rollout, ctx.cluster_orig()?, target, &suffix).await? {
                continue;
            }

            let offline = target
                .status(&ctx.rollout)
                .map(|status| status.scale_down_instances.clone())
                .unwrap_or_default();
            let Some(spec) = target.spec_mut(ctx.cluster_mut()?) else {
                continue;
            };
            let before = spec.clone();
            if let Some(service_version) = &target.service_version {
                spec.service_version = service_version.clone();
            }
            if let Some(comp_def) = &target.comp_def {
                spec.comp_def = comp_def.clone();
            }
            spec.offline_instances
                .retain(|instance| !offline.contains(instance));

            if *spec != before {
                info!(parent: ctx.span(), target = %target, "Tearing down replaced instances");
            }
        }
        Ok(())
    }
}
