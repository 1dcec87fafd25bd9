//! External-resource reconcilers.
//!
//! A reconciler compares desired state (the caller's resource) with actual
//! state (the remote system) and takes the actions needed to converge. The
//! caller decides when each operation runs; reconcilers never poll, sleep or
//! retry on their own.

pub mod project;

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub use project::ProjectReconciler;

/// Secrets produced by an operation, keyed by name.
pub type ConnectionDetails = BTreeMap<String, Vec<u8>>;

/// Result of observing an external resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExternalObservation {
    pub resource_exists: bool,
    pub resource_up_to_date: bool,
    pub resource_late_initialized: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalCreation {
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalUpdate {
    pub connection_details: ConnectionDetails,
}

/// Lifecycle state of a resource as seen by the last observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Unknown,
    NotExists,
    Drifted,
    UpToDate,
}

impl From<&ExternalObservation> for ResourceState {
    fn from(o: &ExternalObservation) -> Self {
        match (o.resource_exists, o.resource_up_to_date) {
            (false, _) => ResourceState::NotExists,
            (true, false) => ResourceState::Drifted,
            (true, true) => ResourceState::UpToDate,
        }
    }
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Unknown => "unknown",
            ResourceState::NotExists => "not-exists",
            ResourceState::Drifted => "drifted",
            ResourceState::UpToDate => "up-to-date",
        }
    }
}

/// Lifecycle operations on an external resource.
///
/// Operations for one resource must not run concurrently; operations for
/// different resources may. Every remote call honors `cancel`.
#[async_trait]
pub trait ExternalClient: Send + Sync {
    /// The caller-owned resource type.
    type Resource: Send;

    /// Read the remote resource and compare it with the desired state.
    /// Late-initializes `resource` in place.
    async fn observe(
        &self,
        cancel: &CancellationToken,
        resource: &mut Self::Resource,
    ) -> Result<ExternalObservation>;

    /// Create the remote resource and record its external name.
    async fn create(
        &self,
        cancel: &CancellationToken,
        resource: &mut Self::Resource,
    ) -> Result<ExternalCreation>;

    /// Bring the remote resource in line with the desired state.
    async fn update(
        &self,
        cancel: &CancellationToken,
        resource: &mut Self::Resource,
    ) -> Result<ExternalUpdate>;

    /// Delete the remote resource. Deleting a missing resource succeeds.
    async fn delete(&self, cancel: &CancellationToken, resource: &mut Self::Resource)
        -> Result<()>;
}
