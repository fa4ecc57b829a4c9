use std::time::Duration;

use thiserror::Error;

use crate::types::{DebugTelemetry, SubQueryFailure};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Planning unavailable: {0}")]
    PlanningUnavailable(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Vector index failed: {0}")]
    Index(String),

    #[error("Product metadata lookup failed: {0}")]
    Metadata(String),

    #[error("Provider call failed: {0}")]
    Provider(String),

    #[error("Transient provider failure: {0}")]
    Transient(String),

    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Every dispatched sub-query failed; no partial results are returned.
    #[error("Retrieval unavailable: all {} sub-queries failed", failures.len())]
    RetrievalUnavailable {
        failures: Vec<SubQueryFailure>,
        debug: Option<Box<DebugTelemetry>>,
    },
}

impl Error {
    /// Failures worth one more attempt within the remaining call budget.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// Telemetry attached to a `RetrievalUnavailable` error, if any.
    pub fn debug(&self) -> Option<&DebugTelemetry> {
        match self {
            Error::RetrievalUnavailable { debug, .. } => debug.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
