//! Plan Building
//!
//! A reconciliation is planned by an ordered chain of transformers that
//! record object writes into an [`ObjectGraph`](crate::model::ObjectGraph),
//! then executed by walking the graph dependencies-first:
//!
//! ```text
//! PlanBuilder::new(ctx, executor)
//!     .add_transformer(..)       // Transform* (sequential)
//!     .build().await             // Plan { Complete | Stopped | Partial }
//!     .execute().await           // reverse-topological writes
//! ```

mod builder;
mod executor;
mod transformer;

pub use builder::{Plan, PlanBuilder, PlanState};
pub use executor::{ObjectExecutor, VertexExecutor};
pub use transformer::{
    BranchTransformer, ParallelTransformer, TransformContext, Transformer, TransformerChain,
};

#[cfg(test)]
pub(crate) mod testing {
    use super::TransformContext;
    use crate::events::{EventRecorder, NoopEventRecorder};
    use crate::model::{to_object, GraphClient, Scheme};
    use crate::store::MemoryStore;
    use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::api::DynamicObject;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    pub struct TestContext {
        client: GraphClient,
        recorder: NoopEventRecorder,
        span: tracing::Span,
        pub token: CancellationToken,
        pub steps: Vec<&'static str>,
    }

    impl TestContext {
        pub fn scheme() -> Arc<Scheme> {
            Arc::new(
                Scheme::new()
                    .register::<Pod>()
                    .register::<ConfigMap>()
                    .register::<Service>(),
            )
        }

        pub fn new(store: MemoryStore) -> Self {
            Self {
                client: GraphClient::new(Arc::new(store), Self::scheme()),
                recorder: NoopEventRecorder,
                span: tracing::Span::none(),
                token: CancellationToken::new(),
                steps: Vec::new(),
            }
        }
    }

    impl TransformContext for TestContext {
        fn client(&self) -> &GraphClient {
            &self.client
        }

        fn recorder(&self) -> &dyn EventRecorder {
            &self.recorder
        }

        fn span(&self) -> &tracing::Span {
            &self.span
        }

        fn cancellation(&self) -> &CancellationToken {
            &self.token
        }
    }

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.into()),
            namespace: Some("default".into()),
            ..Default::default()
        }
    }

    pub fn pod(name: &str) -> DynamicObject {
        to_object(&Pod {
            metadata: meta(name),
            ..Default::default()
        })
        .unwrap()
    }

    pub fn config_map(name: &str) -> DynamicObject {
        to_object(&ConfigMap {
            metadata: meta(name),
            ..Default::default()
        })
        .unwrap()
    }
}
