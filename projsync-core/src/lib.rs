//! projsync core: reconciles a declared CD project with the remote control
//! plane and keeps the project's role tokens renewed.
//!
//! The crate is driven by an external scheduler. Each pass calls
//! [`ExternalClient::observe`] and, depending on the verdict,
//! [`ExternalClient::create`], [`ExternalClient::update`] or
//! [`ExternalClient::delete`]. Nothing here polls, sleeps or retries.
//!
//! ```ignore
//! use std::sync::Arc;
//! use projsync_core::{ExternalClient, MemoryProjectService, Project, ProjectReconciler};
//! use tokio_util::sync::CancellationToken;
//!
//! let reconciler = ProjectReconciler::new(Arc::new(MemoryProjectService::new()));
//! let cancel = CancellationToken::new();
//! let observation = reconciler.observe(&cancel, &mut project).await?;
//! if !observation.resource_exists {
//!     reconciler.create(&cancel, &mut project).await?;
//! } else if !observation.resource_up_to_date {
//!     reconciler.update(&cancel, &mut project).await?;
//! }
//! ```

pub mod compare;
pub mod convert;
pub mod error;
pub mod memory;
pub mod reconciler;
pub mod time;
pub mod token;
pub mod transport;
pub mod types;

pub use error::{Error, Result, TokenCreateFailure};
pub use memory::MemoryProjectService;
pub use reconciler::{
    ConnectionDetails, ExternalClient, ExternalCreation, ExternalObservation, ExternalUpdate,
    ProjectReconciler, ResourceState,
};
pub use time::{Clock, FixedClock, SystemClock};
pub use token::{is_equal_tokens, plan_token_requests, TokenKey, TokenPlan};
pub use transport::{ProjectService, TransportError};
pub use types::{Project, ProjectParameters, ProjectRole, TokenSpec};
