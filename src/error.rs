//! Error types for the Rollout Operator
//!
//! Provides one structured error type for the graph, the object model, the
//! plan executor and the rollout transformers, plus the classification the
//! controller uses to decide how to requeue.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Graph Errors
    // =========================================================================
    #[error("no single Root found")]
    NoSingleRoot,

    #[error("cycle found")]
    CycleFound,

    #[error("self-cycle found: {0}")]
    SelfCycle(String),

    // =========================================================================
    // Precondition Errors
    // =========================================================================
    #[error("Unregistered object type: {kind} ({name})")]
    UnregisteredType { kind: String, name: String },

    #[error("Root vertex not found, call root() before adding dependents")]
    RootNotFound,

    #[error("Vertex {key} has no action")]
    MissingAction { key: String },

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    #[error("Resource conflict: {kind}/{name}: {reason}")]
    ResourceConflict {
        kind: String,
        name: String,
        reason: String,
    },

    // =========================================================================
    // Transform Flow
    // =========================================================================
    #[error("requeue after {after:?}: {reason}")]
    Requeue { after: Duration, reason: String },

    #[error("premature stop")]
    PrematureStop,

    #[error("reconciliation cancelled")]
    Cancelled,

    // =========================================================================
    // Domain Errors
    // =========================================================================
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{}", aggregate_message(.0))]
    Aggregate(Vec<Error>),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn aggregate_message(errors: &[Error]) -> String {
    let parts: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Requeue now without growing the backoff
    RequeueImmediately,
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Shorthand for a transformer asking to be retried later
    pub fn requeue_after(after: Duration, reason: impl Into<String>) -> Self {
        Error::Requeue {
            after,
            reason: reason.into(),
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            Error::Requeue { after, .. } => ErrorAction::RequeueAfter(*after),

            // Optimistic-lock races are expected
            Error::ResourceConflict { .. } => ErrorAction::RequeueImmediately,
            Error::Kube(kube::Error::Api(resp)) if resp.code == 409 && resp.reason == "Conflict" => {
                ErrorAction::RequeueImmediately
            }

            // Wiring bugs, retrying will not help
            Error::UnregisteredType { .. }
            | Error::RootNotFound
            | Error::MissingAction { .. }
            | Error::Configuration(_) => ErrorAction::NoRequeue,

            Error::PrematureStop | Error::Cancelled => ErrorAction::NoRequeue,

            Error::Aggregate(errors) => errors
                .iter()
                .map(Error::action)
                .find(|a| *a != ErrorAction::RequeueWithBackoff)
                .unwrap_or(ErrorAction::RequeueWithBackoff),

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Kube(_) | Error::ResourceConflict { .. } | Error::Requeue { .. }
        )
    }

    /// Graph invariant violations
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::NoSingleRoot | Error::CycleFound | Error::SelfCycle(_)
        )
    }

    /// Programming errors in transformer wiring
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::UnregisteredType { .. } | Error::RootNotFound | Error::MissingAction { .. }
        )
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            Error::ResourceConflict { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 409 && resp.reason == "Conflict",
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ResourceNotFound { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::ResourceExists { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => {
                resp.code == 409 && resp.reason == "AlreadyExists"
            }
            _ => false,
        }
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;
