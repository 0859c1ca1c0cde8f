//! Plan building and execution

use std::sync::Arc;
use tracing::{debug, error};

use super::executor::VertexExecutor;
use super::transformer::{
    BranchTransformer, ParallelTransformer, TransformContext, Transformer, TransformerChain,
};
use crate::error::{Error, Result};
use crate::model::{ObjectGraph, ObjectVertex};

/// How plan building ended
#[derive(Debug)]
pub enum PlanState {
    /// Every transformer ran
    Complete,
    /// A transformer stopped the chain on purpose
    Stopped,
    /// A transformer failed; the graph holds what ran before it
    Partial(Error),
}

impl PlanState {
    pub fn is_complete(&self) -> bool {
        matches!(self, PlanState::Complete)
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            PlanState::Partial(e) => Some(e),
            _ => None,
        }
    }
}

// =============================================================================
// PlanBuilder
// =============================================================================

/// Assembles the transformer chain for one reconciliation
pub struct PlanBuilder<C: TransformContext> {
    ctx: C,
    chain: TransformerChain<C>,
    executor: Arc<dyn VertexExecutor<C>>,
}

impl<C: TransformContext> PlanBuilder<C> {
    pub fn new(ctx: C, executor: Arc<dyn VertexExecutor<C>>) -> Self {
        Self {
            ctx,
            chain: TransformerChain::new(),
            executor,
        }
    }

    pub fn add_transformer(mut self, transformer: impl Transformer<C> + 'static) -> Self {
        self.chain.push(Box::new(transformer));
        self
    }

    /// Add branches that run concurrently as one step
    pub fn add_parallel_transformer(
        mut self,
        branches: Vec<Box<dyn BranchTransformer<C>>>,
    ) -> Self {
        self.chain.push(Box::new(ParallelTransformer::new(branches)));
        self
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    /// Run the chain.
    ///
    /// A failing transformer does not discard the writes planned before it;
    /// the plan comes back [`PlanState::Partial`] and still executes them.
    pub async fn build(self) -> Plan<C> {
        let PlanBuilder {
            mut ctx,
            chain,
            executor,
        } = self;

        let mut graph = ObjectGraph::new();
        let state = match chain.run(&mut ctx, &mut graph).await {
            Ok(()) => PlanState::Complete,
            Err(Error::PrematureStop) => PlanState::Stopped,
            Err(e) => PlanState::Partial(e),
        };
        debug!(parent: ctx.span(), state = ?state, vertices = graph.len(), plan = %graph, "Plan built");

        Plan {
            ctx,
            graph,
            state,
            executor,
        }
    }
}

// =============================================================================
// Plan
// =============================================================================

/// A built graph ready to be written, executed once
pub struct Plan<C: TransformContext> {
    ctx: C,
    graph: ObjectGraph,
    state: PlanState,
    executor: Arc<dyn VertexExecutor<C>>,
}

impl<C: TransformContext> Plan<C> {
    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn state(&self) -> &PlanState {
        &self.state
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    /// Write every vertex, dependencies first and the root last.
    ///
    /// A write failure is returned first; otherwise a partial plan returns
    /// its build error once its writes are done. An invalid graph is never
    /// walked.
    pub async fn execute(self) -> Result<()> {
        let Plan {
            ctx,
            graph,
            state,
            executor,
        } = self;
        let build_error = match state {
            PlanState::Partial(e) => Some(e),
            PlanState::Complete | PlanState::Stopped => None,
        };

        let less = |a: &ObjectVertex, b: &ObjectVertex| executor.less(a, b);
        let order = match graph.validate().and_then(|_| graph.reverse_topo_order(&less)) {
            Ok(order) => order,
            Err(e) => return Err(build_error.unwrap_or(e)),
        };

        for id in order {
            if ctx.cancellation().is_cancelled() {
                return Err(Error::Cancelled);
            }
            let Some(vertex) = graph.vertex(id) else {
                continue;
            };
            if let Err(e) = executor.execute(&ctx, vertex).await {
                if !e.is_conflict() {
                    error!(
                        parent: ctx.span(),
                        object = %vertex.key(),
                        action = ?vertex.action,
                        error = %e,
                        "Failed to execute vertex"
                    );
                }
                return Err(e);
            }
        }

        match build_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
