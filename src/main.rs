//! Rollout Operator
//!
//! Runs the Rollout controller against the current kubeconfig context and
//! serves health endpoints and Prometheus metrics next to it.

use clap::Parser;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use kube::{Client, CustomResourceExt};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rollout_operator::controller::{self, Context, ControllerConfig, Metrics};
use rollout_operator::events::KubeEventRecorder;
use rollout_operator::rollout::{scheme, CONTROLLER_NAME};
use rollout_operator::{Cluster, Error, KubeStore, Result, Rollout};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Rollout Operator - graph-planned rollouts of cluster components
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Watch a single namespace (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Field manager of server-side writes
    #[arg(long, env = "FIELD_MANAGER", default_value = CONTROLLER_NAME)]
    field_manager: String,

    /// Requeue interval of in-progress Rollouts, in seconds
    #[arg(long, env = "REQUEUE_INTERVAL", default_value = "30")]
    requeue_interval_secs: u64,

    /// First retry delay after a failed reconcile, in seconds
    #[arg(long, env = "BACKOFF_INITIAL", default_value = "1")]
    backoff_initial_secs: u64,

    /// Maximum retry delay, in seconds
    #[arg(long, env = "BACKOFF_MAX", default_value = "300")]
    backoff_max_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Print the CustomResourceDefinitions as YAML and exit
    #[arg(long)]
    print_crds: bool,
}

impl Args {
    fn controller_config(&self) -> Result<ControllerConfig> {
        if self.backoff_initial_secs == 0 || self.backoff_initial_secs > self.backoff_max_secs {
            return Err(Error::Configuration(format!(
                "backoff bounds must satisfy 0 < initial ({}) <= max ({})",
                self.backoff_initial_secs, self.backoff_max_secs
            )));
        }
        Ok(ControllerConfig {
            namespace: self.namespace.clone(),
            requeue_interval: Duration::from_secs(self.requeue_interval_secs),
            backoff_initial: Duration::from_secs(self.backoff_initial_secs),
            backoff_max: Duration::from_secs(self.backoff_max_secs),
        })
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crds {
        print!(
            "{}---\n{}",
            serde_yaml::to_string(&Rollout::crd())?,
            serde_yaml::to_string(&Cluster::crd())?
        );
        return Ok(());
    }

    init_logging(&args)?;
    let config = args.controller_config()?;

    info!("Starting Rollout Operator");
    info!("  Version: {}", rollout_operator::VERSION);
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("<all>"));
    info!("  Field manager: {}", args.field_manager);

    let health_addr = parse_addr(&args.health_addr, "health")?;
    let metrics_addr = parse_addr(&args.metrics_addr, "metrics")?;

    let client = Client::try_default().await?;
    let scheme = Arc::new(scheme());
    let store = KubeStore::new(client.clone(), scheme.clone())
        .with_field_manager(args.field_manager.clone());
    let recorder = KubeEventRecorder::new(client.clone(), CONTROLLER_NAME);
    let metrics = Arc::new(Metrics::new()?);

    let ctx = Arc::new(Context::new(
        Arc::new(store),
        scheme,
        Arc::new(recorder),
        metrics.clone(),
        config,
    ));

    tokio::spawn(async move {
        if let Err(e) = run_health_server(health_addr).await {
            error!("Health server error: {}", e);
        }
    });

    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_addr, metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    controller::run(client, ctx).await;

    info!("Operator shutdown complete");
    Ok(())
}

fn parse_addr(addr: &str, server: &str) -> Result<SocketAddr> {
    addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid {} server address {}: {}", server, addr, e))
    })
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let directive = |d: &str| {
        d.parse::<Directive>()
            .map_err(|e| Error::Configuration(format!("Invalid log directive {}: {}", d, e)))
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(directive("hyper=warn")?)
        .add_directive(directive("kube=info")?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// Health Server
// =============================================================================

fn text_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}

async fn run_health_server(addr: SocketAddr) -> Result<()> {
    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" | "/readyz" => text_response(StatusCode::OK, "ok"),
                _ => text_response(StatusCode::NOT_FOUND, "not found"),
            };
            Ok::<_, Infallible>(response)
        }))
    });

    info!("Health server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Health server bind error: {}", e)))?
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: SocketAddr, metrics: Arc<Metrics>) -> Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match metrics.encode() {
                            Ok((content_type, buffer)) => {
                                let mut response = Response::new(Body::from(buffer));
                                if let Ok(value) = content_type.parse() {
                                    response
                                        .headers_mut()
                                        .insert(hyper::header::CONTENT_TYPE, value);
                                }
                                response
                            }
                            Err(e) => {
                                error!("Failed to encode metrics: {}", e);
                                text_response(StatusCode::INTERNAL_SERVER_ERROR, "encode error")
                            }
                        },
                        _ => text_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    info!("Metrics server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Metrics server bind error: {}", e)))?
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
