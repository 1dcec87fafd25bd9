//! Project reconciler - converges a declared project and its role tokens
//! with the remote CD control plane.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    ConnectionDetails, ExternalClient, ExternalCreation, ExternalObservation, ExternalUpdate,
};
use crate::compare::{evaluate, is_project_up_to_date};
use crate::convert::{observation, remote_project};
use crate::error::{Error, Result, TokenCreateFailure};
use crate::time::{Clock, SystemClock};
use crate::token::plan_token_requests;
use crate::transport::{
    ProjectCreateRequest, ProjectQuery, ProjectService, ProjectUpdateRequest, TransportResult,
};
use crate::types::{Condition, Project};

/// Project reconciler that talks to the control plane through a
/// [`ProjectService`].
pub struct ProjectReconciler {
    client: Arc<dyn ProjectService>,
    clock: Arc<dyn Clock>,
}

impl ProjectReconciler {
    pub fn new(client: Arc<dyn ProjectService>) -> Self {
        Self::with_clock(client, Arc::new(SystemClock))
    }

    pub fn with_clock(client: Arc<dyn ProjectService>, clock: Arc<dyn Clock>) -> Self {
        Self { client, clock }
    }
}

/// Run a transport call unless `cancel` fires first.
async fn guarded<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = TransportResult<T>>,
) -> Result<TransportResult<T>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = call => Ok(result),
    }
}

#[async_trait]
impl ExternalClient for ProjectReconciler {
    type Resource = Project;

    async fn observe(
        &self,
        cancel: &CancellationToken,
        cr: &mut Project,
    ) -> Result<ExternalObservation> {
        let Some(name) = cr.external_name().map(str::to_string) else {
            debug!(resource = %cr.metadata.name, "Project has no external name yet");
            return Ok(ExternalObservation::default());
        };

        let query = ProjectQuery { name: name.clone() };
        let remote = match guarded(cancel, self.client.get(query)).await? {
            Ok(remote) => remote,
            Err(e) if e.is_not_found() => {
                debug!(project = %name, "Project does not exist remotely");
                return Ok(ExternalObservation::default());
            }
            Err(e) => return Err(Error::Get(e)),
        };

        // Sampled once; every time comparison of this pass uses it.
        let now = self.clock.now();

        // Nothing is written back to the resource unless the whole
        // evaluation succeeds.
        let at_provider = observation(&remote);
        let mut params = cr.spec.for_provider.clone();
        let tokens = &at_provider.jwt_tokens_by_role;
        let verdict = evaluate(&name, &mut params, &remote, tokens, now)?;

        cr.spec.for_provider = params;
        cr.status.at_provider = at_provider;
        cr.set_condition(Condition::available(now));

        debug!(
            project = %name,
            up_to_date = verdict.up_to_date,
            late_initialized = verdict.late_initialized,
            pending_tokens = verdict.token_plan.len(),
            "Observed project"
        );

        Ok(ExternalObservation {
            resource_exists: true,
            resource_up_to_date: verdict.up_to_date,
            resource_late_initialized: verdict.late_initialized,
        })
    }

    async fn create(
        &self,
        cancel: &CancellationToken,
        cr: &mut Project,
    ) -> Result<ExternalCreation> {
        let name = cr
            .external_name()
            .map(str::to_string)
            .unwrap_or_else(|| cr.metadata.name.clone());
        info!(project = %name, "Creating project");

        let request = ProjectCreateRequest {
            project: remote_project(&name, &cr.spec.for_provider, &BTreeMap::new()),
            upsert: false,
        };
        let created = guarded(cancel, self.client.create(request))
            .await?
            .map_err(Error::Create)?;

        cr.set_external_name(created.name.clone());
        info!(target: "audit", project = %created.name, "Project created");

        Ok(ExternalCreation::default())
    }

    async fn update(&self, cancel: &CancellationToken, cr: &mut Project) -> Result<ExternalUpdate> {
        let name = cr
            .external_name()
            .map(str::to_string)
            .ok_or(Error::MissingExternalName)?;

        // Always work from fresh remote state, never from the last observation.
        let query = ProjectQuery { name: name.clone() };
        let remote = guarded(cancel, self.client.get(query))
            .await?
            .map_err(Error::Update)?;

        let now = self.clock.now();
        let params = &cr.spec.for_provider;
        let tokens = observation(&remote).jwt_tokens_by_role;
        let plan = plan_token_requests(&name, &params.roles, &tokens, now)?;
        let drifted = !is_project_up_to_date(params, &remote, &tokens, now)?;
        info!(
            project = %name,
            drifted,
            pending_tokens = plan.len(),
            "Updating project"
        );

        let mut project = remote_project(&name, params, &tokens);
        project.resource_version = remote.resource_version;
        guarded(cancel, self.client.update(ProjectUpdateRequest { project }))
            .await?
            .map_err(Error::Update)?;
        info!(target: "audit", project = %name, "Project updated");

        let mut issued = ConnectionDetails::new();
        let mut failures = Vec::new();
        for (key, request) in plan {
            match guarded(cancel, self.client.create_token(request)).await? {
                Ok(token) => {
                    info!(
                        target: "audit",
                        project = %name,
                        role = %key.role,
                        token = %key.id,
                        "Project token issued"
                    );
                    issued.insert(key.to_string(), token.token.into_bytes());
                }
                Err(source) => {
                    warn!(
                        project = %name,
                        role = %key.role,
                        token = %key.id,
                        error = %source,
                        "Failed to issue project token"
                    );
                    failures.push(TokenCreateFailure { key, source });
                }
            }
        }

        if !failures.is_empty() {
            return Err(Error::TokenCreate { failures, issued });
        }

        Ok(ExternalUpdate {
            connection_details: issued,
        })
    }

    async fn delete(&self, cancel: &CancellationToken, cr: &mut Project) -> Result<()> {
        let Some(name) = cr.external_name().map(str::to_string) else {
            debug!(resource = %cr.metadata.name, "Project has no external name, nothing to delete");
            return Ok(());
        };
        info!(project = %name, "Deleting project");

        match guarded(cancel, self.client.delete(ProjectQuery { name: name.clone() })).await? {
            Ok(()) => {
                info!(target: "audit", project = %name, "Project deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(project = %name, "Project already gone");
                Ok(())
            }
            Err(e) => Err(Error::Delete(e)),
        }
    }
}
