//! Transformers and the transformer chain

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::events::EventRecorder;
use crate::model::{GraphClient, ObjectGraph};

// =============================================================================
// Context
// =============================================================================

/// Per-reconciliation state shared by every transformer
pub trait TransformContext: Send + Sync + 'static {
    /// Store reader and graph writer
    fn client(&self) -> &GraphClient;

    fn recorder(&self) -> &dyn EventRecorder;

    /// Span carrying the reconciled object's identity
    fn span(&self) -> &tracing::Span;

    fn cancellation(&self) -> &CancellationToken;
}

// =============================================================================
// Transformer Traits
// =============================================================================

/// One step of plan building.
///
/// A transformer reads the context and the store and records the writes it
/// wants as graph vertices. Re-running it against unchanged inputs must
/// plan the same writes. Returning [`Error::PrematureStop`] ends the chain
/// without failing the plan.
#[async_trait]
pub trait Transformer<C: TransformContext>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transform(&self, ctx: &mut C, graph: &mut ObjectGraph) -> Result<()>;
}

/// A transformer that only reads the context, so several can run at once
#[async_trait]
pub trait BranchTransformer<C: TransformContext>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transform(&self, ctx: &C, graph: &mut ObjectGraph) -> Result<()>;
}

// =============================================================================
// Chain
// =============================================================================

/// Ordered transformers, stopping at the first error
pub struct TransformerChain<C: TransformContext> {
    transformers: Vec<Box<dyn Transformer<C>>>,
}

impl<C: TransformContext> Default for TransformerChain<C> {
    fn default() -> Self {
        Self {
            transformers: Vec::new(),
        }
    }
}

impl<C: TransformContext> TransformerChain<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transformer: Box<dyn Transformer<C>>) {
        self.transformers.push(transformer);
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    pub async fn run(&self, ctx: &mut C, graph: &mut ObjectGraph) -> Result<()> {
        for transformer in &self.transformers {
            if ctx.cancellation().is_cancelled() {
                return Err(Error::Cancelled);
            }
            trace!(parent: ctx.span(), transformer = transformer.name(), "Running transformer");
            transformer.transform(ctx, graph).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Parallel
// =============================================================================

/// Runs branch transformers concurrently, each on its own copy of the root.
///
/// Successful branches are merged back; a key planned by two branches, or by
/// a branch and the main graph, is an error. Branch errors are aggregated.
pub struct ParallelTransformer<C: TransformContext> {
    branches: Vec<Box<dyn BranchTransformer<C>>>,
}

impl<C: TransformContext> ParallelTransformer<C> {
    pub fn new(branches: Vec<Box<dyn BranchTransformer<C>>>) -> Self {
        Self { branches }
    }
}

#[async_trait]
impl<C: TransformContext> Transformer<C> for ParallelTransformer<C> {
    fn name(&self) -> &'static str {
        "parallel"
    }

    async fn transform(&self, ctx: &mut C, graph: &mut ObjectGraph) -> Result<()> {
        let shared: &C = ctx;
        let runs = self.branches.iter().map(|branch| {
            let mut scratch = graph.branch();
            async move {
                let result = branch.transform(shared, &mut scratch).await;
                (branch.name(), scratch, result)
            }
        });
        let results = join_all(runs).await;

        let mut errors = Vec::new();
        for (name, scratch, result) in results {
            let merged = result.and_then(|_| graph.merge(scratch));
            if let Err(e) = merged {
                debug!(parent: shared.span(), branch = name, error = %e, "Branch failed");
                errors.push(e);
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Aggregate(errors)),
        }
    }
}
