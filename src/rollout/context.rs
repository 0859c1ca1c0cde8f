//! Per-reconciliation state of one Rollout

use chrono::{DateTime, Utc};
use kube::api::DynamicObject;
use kube::runtime::events::EventType;
use kube::Resource;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::crd::{Cluster, Rollout};
use crate::error::{Error, Result};
use crate::events::EventRecorder;
use crate::model::{to_object, GraphClient};
use crate::plan::TransformContext;

/// Working copies of the Rollout and its Cluster.
///
/// `*_orig` hold the objects as read from the store; transformers change the
/// working copies and plan the difference.
pub struct RolloutTransformContext {
    client: GraphClient,
    recorder: Arc<dyn EventRecorder>,
    span: tracing::Span,
    token: CancellationToken,

    pub rollout_orig: Rollout,
    pub rollout: Rollout,
    pub cluster_orig: Option<Cluster>,
    pub cluster: Option<Cluster>,

    /// Clock for delays and status timestamps
    pub now: DateTime<Utc>,
}

fn cluster_not_loaded() -> Error {
    Error::Internal("the cluster has not been loaded".into())
}

impl RolloutTransformContext {
    pub fn new(
        client: GraphClient,
        recorder: Arc<dyn EventRecorder>,
        span: tracing::Span,
        token: CancellationToken,
        rollout: Rollout,
    ) -> Self {
        Self {
            client,
            recorder,
            span,
            token,
            rollout_orig: rollout.clone(),
            rollout,
            cluster_orig: None,
            cluster: None,
            now: Utc::now(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.rollout_orig.metadata.namespace.as_deref()
    }

    pub fn cluster(&self) -> Result<&Cluster> {
        self.cluster.as_ref().ok_or_else(cluster_not_loaded)
    }

    pub fn cluster_mut(&mut self) -> Result<&mut Cluster> {
        self.cluster.as_mut().ok_or_else(cluster_not_loaded)
    }

    pub fn cluster_orig(&self) -> Result<&Cluster> {
        self.cluster_orig.as_ref().ok_or_else(cluster_not_loaded)
    }

    /// Original and working Rollout, in graph form
    pub fn rollout_objects(&self) -> Result<(DynamicObject, DynamicObject)> {
        Ok((to_object(&self.rollout_orig)?, to_object(&self.rollout)?))
    }

    /// Original and working Cluster, in graph form
    pub fn cluster_objects(&self) -> Result<(DynamicObject, DynamicObject)> {
        Ok((to_object(self.cluster_orig()?)?, to_object(self.cluster()?)?))
    }

    /// Publish an event about the Rollout
    pub async fn publish(&self, type_: EventType, reason: &str, action: &str, note: Option<String>) {
        let obj_ref = self.rollout_orig.object_ref(&());
        self.recorder
            .publish(&obj_ref, type_, reason, action, note)
            .await;
    }
}

impl TransformContext for RolloutTransformContext {
    fn client(&self) -> &GraphClient {
        &self.client
    }

    fn recorder(&self) -> &dyn EventRecorder {
        self.recorder.as_ref()
    }

    fn span(&self) -> &tracing::Span {
        &self.span
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.token
    }
}
