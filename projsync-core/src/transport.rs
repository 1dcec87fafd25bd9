//! Transport contract towards the remote CD control plane.
//!
//! The core depends only on [`ProjectService`]. Production deployments plug
//! in a client for the control plane's API; tests use
//! [`MemoryProjectService`](crate::memory::MemoryProjectService).

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The addressed project does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current remote state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller is not allowed to perform the request.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The remote system could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Any other remote failure.
    #[error("internal: {0}")]
    Internal(String),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}

/// Result type for transport calls.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

// =============================================================================
// Wire types
// =============================================================================

/// A project as the remote system represents it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteProject {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Opaque version used for optimistic concurrency on update.
    pub resource_version: String,
    pub spec: RemoteProjectSpec,
    pub status: RemoteProjectStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteProjectSpec {
    pub description: String,
    pub source_repos: Vec<String>,
    pub source_namespaces: Vec<String>,
    pub destinations: Vec<RemoteDestination>,
    pub cluster_resource_whitelist: Vec<RemoteGroupKind>,
    pub namespace_resource_blacklist: Vec<RemoteGroupKind>,
    pub roles: Vec<RemoteRole>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteDestination {
    pub server: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteGroupKind {
    pub group: String,
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRole {
    pub name: String,
    pub description: String,
    pub policies: Vec<String>,
    pub groups: Vec<String>,
    pub jwt_tokens: Vec<RemoteToken>,
}

/// Token metadata, timestamps in Unix seconds. `exp == 0` never expires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteToken {
    pub id: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteProjectStatus {
    pub jwt_tokens_by_role: BTreeMap<String, Vec<RemoteToken>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectQuery {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectCreateRequest {
    pub project: RemoteProject,
    pub upsert: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectUpdateRequest {
    pub project: RemoteProject,
}

/// Request to issue (or reissue) a role token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectTokenCreateRequest {
    pub project: String,
    pub role: String,
    pub id: String,
    /// Lifetime in whole seconds, `0` for a token that never expires.
    pub expires_in: i64,
    pub description: Option<String>,
}

/// A freshly issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
}

/// Remote operations the reconciler needs.
#[async_trait]
pub trait ProjectService: Send + Sync {
    async fn get(&self, query: ProjectQuery) -> TransportResult<RemoteProject>;

    async fn create(&self, request: ProjectCreateRequest) -> TransportResult<RemoteProject>;

    async fn update(&self, request: ProjectUpdateRequest) -> TransportResult<RemoteProject>;

    async fn delete(&self, query: ProjectQuery) -> TransportResult<()>;

    async fn create_token(&self, request: ProjectTokenCreateRequest)
        -> TransportResult<IssuedToken>;
}
