//! Rollout plan builder

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::context::RolloutTransformContext;
use super::inplace::InplaceTransformer;
use super::lifecycle::{DeletionTransformer, InitTransformer, MetaTransformer};
use super::load::{LoadTransformer, SetupTransformer, ValidationTransformer};
use super::replace::ReplaceTransformer;
use super::status::{ClusterUpdateTransformer, StatusTransformer};
use super::teardown::TearDownTransformer;
use crate::crd::{Rollout, ROLLOUT_FINALIZER};
use crate::error::Result;
use crate::events::EventRecorder;
use crate::model::{GraphClient, Scheme};
use crate::plan::{ObjectExecutor, PlanBuilder, VertexExecutor};
use crate::store::SharedObjectStore;

/// Creates the plan builder of each Rollout reconciliation
pub struct RolloutPlanBuilder {
    client: GraphClient,
    recorder: Arc<dyn EventRecorder>,
    executor: Arc<dyn VertexExecutor<RolloutTransformContext>>,
}

impl RolloutPlanBuilder {
    pub fn new(
        store: SharedObjectStore,
        scheme: Arc<Scheme>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        let executor = ObjectExecutor::new(store.clone()).with_finalizer(ROLLOUT_FINALIZER);
        Self {
            client: GraphClient::new(Arc::new(store), scheme),
            recorder,
            executor: Arc::new(executor),
        }
    }

    /// Load the Rollout and assemble its transformer chain.
    ///
    /// Returns `None` when the Rollout no longer exists.
    pub async fn init(
        &self,
        namespace: &str,
        name: &str,
        token: CancellationToken,
    ) -> Result<Option<PlanBuilder<RolloutTransformContext>>> {
        let Some(rollout) = self
            .client
            .get_opt::<Rollout>(Some(namespace), name)
            .await?
        else {
            return Ok(None);
        };

        let ctx = RolloutTransformContext::new(
            self.client.clone(),
            self.recorder.clone(),
            tracing::Span::current(),
            token,
            rollout,
        );
        let builder = PlanBuilder::new(ctx, self.executor.clone())
            .add_transformer(InitTransformer)
            .add_transformer(DeletionTransformer)
            .add_transformer(MetaTransformer)
            .add_transformer(LoadTransformer)
            .add_transformer(ValidationTransformer)
            .add_transformer(SetupTransformer)
            .add_transformer(InplaceTransformer)
            .add_transformer(ReplaceTransformer)
            .add_transformer(TearDownTransformer)
            .add_transformer(StatusTransformer)
            .add_transformer(ClusterUpdateTransformer);
        Ok(Some(builder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        Cluster, ClusterComponentSpec, ClusterSpec, RolloutComponent, RolloutSpec, RolloutState,
        RolloutStrategy, RolloutStrategyInplace, ROLLOUT_NAME_LABEL,
    };
    use crate::error::Error;
    use crate::events::{reasons, MemoryEventRecorder};
    use crate::model::{contains_finalizer, from_object, to_object, ObjectKind};
    use crate::plan::PlanState;
    use crate::rollout::scheme;
    use crate::store::{MemoryStore, ObjectReader, ObjectWriter};
    use assert_matches::assert_matches;
    use kube::ResourceExt;

    struct Harness {
        store: MemoryStore,
        recorder: Arc<MemoryEventRecorder>,
        builder: RolloutPlanBuilder,
    }

    impl Harness {
        fn new() -> Self {
            let scheme = Arc::new(scheme());
            let store = MemoryStore::new(scheme.clone());
            let recorder = Arc::new(MemoryEventRecorder::new());
            let builder = RolloutPlanBuilder::new(Arc::new(store.clone()), scheme, recorder.clone());
            Self {
                store,
                recorder,
                builder,
            }
        }

        async fn reconcile(&self) -> Result<PlanState> {
            let plan = self
                .builder
                .init("default", "r1", CancellationToken::new())
                .await?
                .expect("rollout exists")
                .build()
                .await;
            let state = match plan.state() {
                PlanState::Complete => PlanState::Complete,
                PlanState::Stopped => PlanState::Stopped,
                PlanState::Partial(_) => PlanState::Partial(Error::Internal("partial".into())),
            };
            plan.execute().await?;
            Ok(state)
        }

        async fn rollout(&self) -> Option<Rollout> {
            match self
                .store
                .get(&ObjectKind::of::<Rollout>(), Some("default"), "r1")
                .await
            {
                Ok(obj) => Some(from_object(&obj).unwrap()),
                Err(e) if e.is_not_found() => None,
                Err(e) => panic!("{}", e),
            }
        }

        async fn cluster(&self) -> Cluster {
            let obj = self
                .store
                .get(&ObjectKind::of::<Cluster>(), Some("default"), "c1")
                .await
                .unwrap();
            from_object(&obj).unwrap()
        }
    }

    fn cluster() -> Cluster {
        let mut cluster = Cluster::new(
            "c1",
            ClusterSpec {
                component_specs: vec![ClusterComponentSpec {
                    name: "comp".into(),
                    comp_def: "def-1".into(),
                    service_version: "v1".into(),
                    replicas: 3,
                    ..Default::default()
                }],
                ..Default::default()
            },
        );
        cluster.metadata.namespace = Some("default".into());
        cluster
    }

    fn rollout() -> Rollout {
        let mut rollout = Rollout::new(
            "r1",
            RolloutSpec {
                cluster_name: "c1".into(),
                components: vec![RolloutComponent {
                    name: "comp".into(),
                    service_version: Some("v2".into()),
                    strategy: RolloutStrategy {
                        inplace: Some(RolloutStrategyInplace {}),
                        replace: None,
                    },
                    ..Default::default()
                }],
                ..Default::default()
            },
        );
        rollout.metadata.namespace = Some("default".into());
        rollout
    }

    #[tokio::test]
    async fn test_missing_rollout() {
        let harness = Harness::new();
        let builder = harness
            .builder
            .init("default", "r1", CancellationToken::new())
            .await
            .unwrap();
        assert!(builder.is_none());
    }

    #[tokio::test]
    async fn test_finalizer_first_then_pending() {
        let harness = Harness::new();
        harness.store.create(&to_object(&rollout()).unwrap(), None).await.unwrap();
        harness.store.create(&to_object(&cluster()).unwrap(), None).await.unwrap();

        assert_matches!(harness.reconcile().await, Ok(PlanState::Stopped));
        let stored = harness.rollout().await.unwrap();
        assert!(contains_finalizer(&stored, ROLLOUT_FINALIZER));
        assert_eq!(stored.state(), None);
        assert!(harness.cluster().await.labels().get(ROLLOUT_NAME_LABEL).is_none());

        // the cluster is not running yet
        assert_matches!(harness.reconcile().await, Err(Error::Requeue { .. }));
        let stored = harness.rollout().await.unwrap();
        assert_eq!(stored.state(), Some(RolloutState::Pending));
        assert_eq!(stored.component_status("comp").unwrap().service_version, "v1");
        assert_eq!(harness.cluster().await.labels()[ROLLOUT_NAME_LABEL], "r1");
    }

    #[tokio::test]
    async fn test_missing_cluster_requeues() {
        let harness = Harness::new();
        harness.store.create(&to_object(&rollout()).unwrap(), None).await.unwrap();
        harness.reconcile().await.unwrap();

        assert_matches!(
            harness.reconcile().await,
            Err(Error::Requeue { reason, .. }) if reason.contains("c1")
        );
    }

    #[tokio::test]
    async fn test_cluster_claimed_by_other_rollout() {
        let harness = Harness::new();
        let mut claimed = cluster();
        claimed
            .labels_mut()
            .insert(ROLLOUT_NAME_LABEL.into(), "r0".into());
        harness.store.create(&to_object(&rollout()).unwrap(), None).await.unwrap();
        harness.store.create(&to_object(&claimed).unwrap(), None).await.unwrap();
        harness.reconcile().await.unwrap();

        assert_matches!(harness.reconcile().await, Ok(PlanState::Stopped));
        let stored = harness.rollout().await.unwrap();
        assert_eq!(stored.state(), Some(RolloutState::Error));
        assert!(stored
            .status
            .unwrap()
            .message
            .unwrap()
            .contains("already being rolled out by r0"));
        assert_eq!(harness.recorder.reasons(), vec![reasons::CLUSTER_CLAIMED]);
        assert_eq!(harness.cluster().await.labels()[ROLLOUT_NAME_LABEL], "r0");
    }

    #[tokio::test]
    async fn test_deletion_releases_cluster() {
        let harness = Harness::new();
        harness.store.create(&to_object(&rollout()).unwrap(), None).await.unwrap();
        harness.store.create(&to_object(&cluster()).unwrap(), None).await.unwrap();
        harness.reconcile().await.unwrap();
        let _ = harness.reconcile().await;
        assert_eq!(harness.cluster().await.labels()[ROLLOUT_NAME_LABEL], "r1");

        let stored = to_object(&harness.rollout().await.unwrap()).unwrap();
        harness.store.delete(&stored, None).await.unwrap();
        assert!(harness.rollout().await.is_some());

        assert_matches!(harness.reconcile().await, Ok(PlanState::Stopped));
        assert!(harness.rollout().await.is_none());
        assert!(harness.cluster().await.labels().get(ROLLOUT_NAME_LABEL).is_none());
        assert!(harness
            .recorder
            .reasons()
            .contains(&reasons::DELETION_STARTED.to_string()));
    }
}
