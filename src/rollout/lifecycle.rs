//! Root, deletion and finalizer handling

use async_trait::async_trait;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::info;

use super::context::RolloutTransformContext;
use crate::crd::{Cluster, ROLLOUT_FINALIZER, ROLLOUT_NAME_LABEL};
use crate::error::{Error, Result};
use crate::events::{actions, reasons};
use crate::model::{
    add_finalizer, contains_finalizer, is_object_deleting, to_object, Action, GraphOption,
    GraphWriter, ObjectGraph,
};
use crate::plan::{TransformContext, Transformer};

/// Makes the Rollout the root of the plan, with a status write
pub struct InitTransformer;

#[async_trait]
impl Transformer<RolloutTransformContext> for InitTransformer {
    fn name(&self) -> &'static str {
        "init"
    }

    async fn transform(
        &self,
        ctx: &mut RolloutTransformContext,
        graph: &mut ObjectGraph,
    ) -> Result<()> {
        let (orig, rollout) = ctx.rollout_objects()?;
        ctx.client().root(graph, Some(orig), rollout, Action::Status)?;
        Ok(())
    }
}

/// Releases the cluster and deletes a Rollout marked for deletion
pub struct DeletionTransformer;

#[async_trait]
impl Transformer<RolloutTransformContext> for DeletionTransformer {
    fn name(&self) -> &'static str {
        "deletion"
    }

    async fn transform(
        &self,
        ctx: &mut RolloutTransformContext,
        graph: &mut ObjectGraph,
    ) -> Result<()> {
        if !is_object_deleting(&ctx.rollout) {
            return Ok(());
        }

        let rollout_name = ctx.rollout.name_any();
        let cluster = ctx
            .client()
            .get_opt::<Cluster>(ctx.namespace(), &ctx.rollout.spec.cluster_name)
            .await?;
        if let Some(cluster) = cluster {
            if cluster.labels().get(ROLLOUT_NAME_LABEL) == Some(&rollout_name) {
                let mut released = cluster.clone();
                released.labels_mut().remove(ROLLOUT_NAME_LABEL);
                ctx.client()
                    .patch(graph, to_object(&cluster)?, to_object(&released)?, &[])?;
            }
        }

        if contains_finalizer(&ctx.rollout, ROLLOUT_FINALIZER) {
            info!(parent: ctx.span(), rollout = %rollout_name, "Deleting rollout");
            ctx.publish(
                EventType::Normal,
                reasons::DELETION_STARTED,
                actions::DELETE,
                None,
            )
            .await;
        }
        ctx.client().delete(
            graph,
            to_object(&ctx.rollout)?,
            &[GraphOption::ReplaceIfExisting],
        )?;
        Err(Error::PrematureStop)
    }
}

/// Holds the Rollout with a finalizer until its cluster is released
pub struct MetaTransformer;

#[async_trait]
impl Transformer<RolloutTransformContext> for MetaTransformer {
    fn name(&self) -> &'static str {
        "meta"
    }

    async fn transform(
        &self,
        ctx: &mut RolloutTransformContext,
        graph: &mut ObjectGraph,
    ) -> Result<()> {
        let mut rollout = ctx.rollout.clone();
        if !add_finalizer(&mut rollout, ROLLOUT_FINALIZER) {
            return Ok(());
        }
        ctx.client().update(
            graph,
            to_object(&ctx.rollout_orig)?,
            to_object(&rollout)?,
            &[GraphOption::ReplaceIfExisting],
        )?;
        Err(Error::PrematureStop)
    }
}
