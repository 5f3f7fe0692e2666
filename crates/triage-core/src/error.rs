use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("incident not found: {0}")]
    IncidentNotFound(Uuid),

    #[error("initial alert action not found for incident {0}")]
    MissingInitialAlert(Uuid),

    #[error("invalid tenant id: {0}")]
    InvalidTenant(String),

    #[error("invalid incident status: {0}")]
    InvalidStatus(String),

    #[error("planner error: {0}")]
    Planner(String),

    #[error("log store error: {0}")]
    LogStore(String),

    #[error("evidence capture error: {0}")]
    Evidence(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("circuit breaker is open")]
    BreakerOpen,

    #[error("external call attempt exceeded timeout {0:?}")]
    Timeout(Duration),

    #[error("external call failed after {attempts} attempts: {source}")]
    ExternalCall {
        attempts: u32,
        #[source]
        source: Box<TriageError>,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TriageError>;
