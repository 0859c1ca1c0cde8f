//! In-place strategy: the component spec, or the sharding template, takes
//! the target version directly

use async_trait::async_trait;
use tracing::info;

use super::context::RolloutTransformContext;
use super::target::Target;
use super::COMPONENT_NOT_READY_REQUEUE;
use crate::crd::ClusterComponentSpec;
use crate::error::{Error, Result};
use crate::model::{is_object_deleting, ObjectGraph};
use crate::plan::{TransformContext, Transformer};

/// `spec` moved to the versions of `target`, instance templates included
pub(super) fn inplace_spec(spec: &ClusterComponentSpec, target: &Target) -> ClusterComponentSpec {
    let mut moved = spec.clone();
    if let Some(service_version) = &target.service_version {
        moved.service_version = service_version.clone();
        for tpl in &mut moved.instances {
            if tpl.service_version.is_some() {
                tpl.service_version = Some(service_version.clone());
            }
        }
    }
    if let Some(comp_def) = &target.comp_def {
        moved.comp_def = comp_def.clone();
        for tpl in &mut moved.instances {
            if tpl.comp_def.is_some() {
                tpl.comp_def = Some(comp_def.clone());
            }
        }
    }
    moved
}

pub struct InplaceTransformer;

#[async_trait]
impl Transformer<RolloutTransformContext> for InplaceTransformer {
    fn name(&self) -> &'static str {
        "inplace"
    }

    async fn transform(
        &self,
        ctx: &mut RolloutTransformContext,
        _graph: &mut ObjectGraph,
    ) -> Result<()> {
        if is_object_deleting(&ctx.rollout_orig) || ctx.rollout_orig.is_succeed() {
            return Ok(());
        }

        let targets = Target::all(&ctx.rollout);
        for target in targets.iter().filter(|t| t.strategy.inplace.is_some()) {
            let cluster = ctx.cluster()?;
            let spec = target.require_spec(cluster)?;
            let moved = inplace_spec(spec, target);
            if moved == *spec {
                continue;
            }
            if !target.is_running(cluster) {
                return Err(Error::requeue_after(
                    COMPONENT_NOT_READY_REQUEUE,
                    format!("the {} is not ready", target),
                ));
            }

            info!(
                parent: ctx.span(),
                target = %target,
                service_version = %moved.service_version,
                comp_def = %moved.comp_def,
                "Updating in place"
            );
            if let Some(spec) = target.spec_mut(ctx.cluster_mut()?) {
                *spec = moved;
            }
        }
        Ok(())
    }
}
