use crate::ebay::UpstreamError;
use crate::profile::MissingField;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classes surfaced per marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ConfigurationError,
    ResolutionError,
    TransientUpstreamError,
    PermanentUpstreamError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigurationError => "configuration_error",
            ErrorKind::ResolutionError => "resolution_error",
            ErrorKind::TransientUpstreamError => "transient_upstream_error",
            ErrorKind::PermanentUpstreamError => "permanent_upstream_error",
        }
    }
}

/// Why one marketplace did not get a listing. Never aborts the batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketplaceFailure {
    #[error("unknown marketplace `{0}`")]
    UnknownMarketplace(String),
    #[error("missing configuration: {}", join_fields(.0))]
    MissingConfiguration(Vec<MissingField>),
    #[error("no usable category: {0}")]
    Unresolvable(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

fn join_fields(fields: &[MissingField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl MarketplaceFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketplaceFailure::UnknownMarketplace(_)
            | MarketplaceFailure::MissingConfiguration(_) => ErrorKind::ConfigurationError,
            MarketplaceFailure::Unresolvable(_) => ErrorKind::ResolutionError,
            MarketplaceFailure::Upstream(err) if err.is_transient() => {
                ErrorKind::TransientUpstreamError
            }
            MarketplaceFailure::Upstream(_) => ErrorKind::PermanentUpstreamError,
        }
    }

    /// Attempts spent on the call that failed; zero when nothing was sent.
    pub fn attempts(&self) -> u32 {
        match self {
            MarketplaceFailure::Upstream(err) => err.attempts,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrchestratorErrorKind {
    InvalidInput,
    NotFound,
    Internal,
}

/// Aborts a whole publish/unpublish call before any marketplace is touched.
#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct OrchestratorError {
    stage: &'static str,
    message: String,
    kind: OrchestratorErrorKind,
}

impl OrchestratorError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: OrchestratorErrorKind::InvalidInput,
        }
    }

    pub fn not_found(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: OrchestratorErrorKind::NotFound,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: OrchestratorErrorKind::Internal,
        }
    }

    pub fn store(stage: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::not_found(stage, format!("draft {id} not found")),
            other => Self::internal(stage, other.to_string()),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> OrchestratorErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}
