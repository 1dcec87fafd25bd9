//! Error types for the reconciliation core.

use thiserror::Error;

use crate::reconciler::ConnectionDetails;
use crate::time::DurationField;
use crate::token::TokenKey;
use crate::transport::TransportError;

/// Errors returned by reconciliation operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot get project: {0}")]
    Get(#[source] TransportError),

    #[error("cannot create project: {0}")]
    Create(#[source] TransportError),

    #[error("cannot update project: {0}")]
    Update(#[source] TransportError),

    #[error("cannot delete project: {0}")]
    Delete(#[source] TransportError),

    /// One or more token-create calls of an update pass failed. Tokens
    /// issued successfully in the same pass are kept in `issued`.
    #[error("cannot create project tokens: {}", format_failures(.failures))]
    TokenCreate {
        failures: Vec<TokenCreateFailure>,
        issued: ConnectionDetails,
    },

    #[error("invalid {field} duration {value:?}: {source}")]
    Parse {
        field: DurationField,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("{field} duration {value:?} is out of range")]
    DurationOutOfRange { field: DurationField, value: String },

    /// The resource has no external name, so there is nothing to address remotely.
    #[error("project has no external name")]
    MissingExternalName,

    #[error("operation cancelled")]
    Cancelled,
}

/// A single failed token-create call.
#[derive(Debug, Error)]
#[error("{key}: {source}")]
pub struct TokenCreateFailure {
    pub key: TokenKey,
    #[source]
    pub source: TransportError,
}

fn format_failures(failures: &[TokenCreateFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
