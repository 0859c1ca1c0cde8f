//! Rollout Controller
//!
//! Drives [`RolloutPlanBuilder`] plans from a kube-runtime `Controller`:
//! Rollouts are watched directly, Clusters through the Rollout that labels
//! them.

mod metrics;

pub use metrics::{outcomes, Metrics};

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::events::EventType;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Client, Resource, ResourceExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::crd::{Cluster, Rollout, RolloutState, ROLLOUT_NAME_LABEL};
use crate::error::{Error, ErrorAction, Result};
use crate::events::{actions, reasons, EventRecorder};
use crate::model::Scheme;
use crate::plan::PlanState;
use crate::rollout::RolloutPlanBuilder;
use crate::store::SharedObjectStore;

// =============================================================================
// Configuration
// =============================================================================

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Watch one namespace instead of the whole cluster
    pub namespace: Option<String>,
    /// Requeue interval of Rollouts still in progress
    pub requeue_interval: Duration,
    /// First retry delay after a failure
    pub backoff_initial: Duration,
    /// Upper bound of the retry delay
    pub backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            requeue_interval: Duration::from_secs(30),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl ControllerConfig {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.backoff_initial)
            .with_max_interval(self.backoff_max)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

// =============================================================================
// Context
// =============================================================================

/// Shared state of the controller
pub struct Context {
    planner: RolloutPlanBuilder,
    recorder: Arc<dyn EventRecorder>,
    pub metrics: Arc<Metrics>,
    pub config: ControllerConfig,
    /// Cancelled on shutdown, stops plans between writes
    pub token: CancellationToken,
    /// Per-Rollout retry state, reset after a successful reconcile
    backoffs: Mutex<HashMap<String, ExponentialBackoff>>,
}

impl Context {
    pub fn new(
        store: SharedObjectStore,
        scheme: Arc<Scheme>,
        recorder: Arc<dyn EventRecorder>,
        metrics: Arc<Metrics>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            planner: RolloutPlanBuilder::new(store, scheme, recorder.clone()),
            recorder,
            metrics,
            config,
            token: CancellationToken::new(),
            backoffs: Mutex::new(HashMap::new()),
        }
    }

    fn next_backoff(&self, key: &str) -> Duration {
        let mut backoffs = self.backoffs.lock();
        let backoff = backoffs
            .entry(key.to_string())
            .or_insert_with(|| self.config.backoff());
        backoff.next_backoff().unwrap_or(self.config.backoff_max)
    }

    fn reset_backoff(&self, key: &str) {
        if let Some(backoff) = self.backoffs.lock().get_mut(key) {
            backoff.reset();
        }
    }
}

fn rollout_key(rollout: &Rollout) -> String {
    format!(
        "{}/{}",
        rollout.namespace().unwrap_or_default(),
        rollout.name_any()
    )
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Plan and execute one reconciliation of a Rollout
pub async fn reconcile_rollout(ctx: &Context, namespace: &str, name: &str) -> Result<Action> {
    let Some(builder) = ctx
        .planner
        .init(namespace, name, ctx.token.child_token())
        .await?
    else {
        debug!("Rollout is gone");
        ctx.metrics.reconciled(outcomes::GONE);
        return Ok(Action::await_change());
    };

    let timer = ctx.metrics.plan_duration.start_timer();
    let plan = builder.build().await;
    ctx.metrics
        .planned_vertices
        .set(i64::try_from(plan.graph().len()).unwrap_or(i64::MAX));
    let stopped = matches!(plan.state(), PlanState::Stopped);
    let state = plan.context().rollout.state();
    let result = plan.execute().await;
    timer.observe_duration();
    result?;

    if stopped {
        ctx.metrics.reconciled(outcomes::STOPPED);
        return Ok(Action::await_change());
    }
    ctx.metrics.reconciled(outcomes::COMPLETE);
    Ok(match state {
        Some(RolloutState::Succeed) | Some(RolloutState::Error) => Action::await_change(),
        _ => Action::requeue(ctx.config.requeue_interval),
    })
}

/// Entry point of the kube-runtime controller
pub async fn reconcile(rollout: Arc<Rollout>, ctx: Arc<Context>) -> Result<Action> {
    let key = rollout_key(&rollout);
    let namespace = rollout
        .namespace()
        .ok_or_else(|| Error::Validation(format!("rollout {} is not namespaced", key)))?;
    let name = rollout.name_any();

    let span = info_span!("reconcile", rollout = %key);
    async move {
        match reconcile_rollout(&ctx, &namespace, &name).await {
            Ok(action) => {
                ctx.reset_backoff(&key);
                Ok(action)
            }
            Err(e) => {
                if matches!(
                    e.action(),
                    ErrorAction::RequeueWithBackoff | ErrorAction::NoRequeue
                ) {
                    ctx.recorder
                        .publish(
                            &rollout.object_ref(&()),
                            EventType::Warning,
                            reasons::RECONCILE_FAILED,
                            actions::RECONCILE,
                            Some(e.to_string()),
                        )
                        .await;
                }
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

/// Requeue decision for a failed reconciliation
pub fn error_policy(rollout: Arc<Rollout>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = rollout_key(&rollout);
    match error.action() {
        ErrorAction::RequeueAfter(after) => {
            info!(rollout = %key, after = ?after, %error, "Requeueing rollout");
            ctx.metrics.reconciled(outcomes::REQUEUE);
            Action::requeue(after)
        }
        ErrorAction::RequeueImmediately => {
            debug!(rollout = %key, %error, "Conflict, retrying");
            ctx.metrics.reconciled(outcomes::CONFLICT);
            Action::requeue(Duration::ZERO)
        }
        ErrorAction::NoRequeue => {
            error!(rollout = %key, %error, "Reconciliation failed, waiting for a change");
            ctx.metrics.reconciled(outcomes::FAILED);
            Action::await_change()
        }
        ErrorAction::RequeueWithBackoff => {
            let after = ctx.next_backoff(&key);
            warn!(rollout = %key, after = ?after, %error, "Reconciliation failed");
            ctx.metrics.reconciled(outcomes::FAILED);
            Action::requeue(after)
        }
    }
}

/// Rollout that a Cluster event concerns
fn cluster_owner(cluster: &Cluster) -> Option<ObjectRef<Rollout>> {
    let name = cluster.labels().get(ROLLOUT_NAME_LABEL)?;
    let mut owner = ObjectRef::new(name);
    if let Some(namespace) = cluster.namespace() {
        owner = owner.within(&namespace);
    }
    Some(owner)
}

/// Run the controller until a termination signal
pub async fn run(client: Client, ctx: Arc<Context>) {
    let (rollouts, clusters) = match &ctx.config.namespace {
        Some(namespace) => (
            Api::<Rollout>::namespaced(client.clone(), namespace),
            Api::<Cluster>::namespaced(client, namespace),
        ),
        None => (Api::<Rollout>::all(client.clone()), Api::<Cluster>::all(client)),
    };

    info!(namespace = ?ctx.config.namespace, "Starting rollout controller");
    Controller::new(rollouts, WatcherConfig::default())
        .watches(clusters, WatcherConfig::default(), |cluster| cluster_owner(&cluster))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => debug!(rollout = %obj, ?action, "Reconciled"),
                Err(e) => debug!(error = %e, "Reconcile loop error"),
            }
        })
        .await;
    ctx.token.cancel();
    info!("Rollout controller stopped");
}
