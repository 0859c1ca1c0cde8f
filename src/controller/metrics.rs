//! Prometheus metrics of the Rollout controller

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::error::{Error, Result};

/// Reconcile outcomes, the `outcome` label of `rollout_reconcile_total`
pub mod outcomes {
    pub const COMPLETE: &str = "complete";
    pub const STOPPED: &str = "stopped";
    pub const GONE: &str = "gone";
    pub const REQUEUE: &str = "requeue";
    pub const CONFLICT: &str = "conflict";
    pub const FAILED: &str = "failed";
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}

/// Controller metrics on their own registry
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    pub plan_duration: Histogram,
    pub planned_vertices: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new("rollout_reconcile_total", "Rollout reconciliations by outcome"),
            &["outcome"],
        )
        .map_err(metrics_error)?;
        let plan_duration = Histogram::with_opts(
            HistogramOpts::new(
                "rollout_plan_duration_seconds",
                "Time to build and execute one reconciliation plan",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )
        .map_err(metrics_error)?;
        let planned_vertices = IntGauge::new(
            "rollout_planned_vertices",
            "Vertices in the last reconciliation plan",
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(reconciliations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(plan_duration.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(planned_vertices.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            reconciliations,
            plan_duration,
            planned_vertices,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn reconciled(&self, outcome: &str) {
        self.reconciliations.with_label_values(&[outcome]).inc();
    }

    pub fn reconciled_count(&self, outcome: &str) -> u64 {
        self.reconciliations.with_label_values(&[outcome]).get()
    }

    /// Text exposition format
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}
