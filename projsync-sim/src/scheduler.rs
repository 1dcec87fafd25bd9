//! Pass loop driving an [`ExternalClient`] for one project.
//!
//! The scheduler owns the cadence. Every pass starts from a fresh Observe;
//! failed passes are logged and retried on the next one.

use std::time::Duration;

use projsync_core::{Error, ExternalClient, Project, ResourceState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct Scheduler {
    pub passes: u32,
    pub interval: Duration,
    pub timeout: Duration,
    pub keep_going: bool,
    pub delete: bool,
}

/// What a run did.
#[derive(Debug)]
pub struct Summary {
    pub passes: u32,
    pub failures: u32,
    pub tokens_issued: usize,
    /// State seen by the last observation, or `NotExists` after a delete.
    pub state: ResourceState,
}

#[derive(Debug, PartialEq)]
enum Action {
    None,
    Created,
    Updated { issued: usize },
}

struct PassReport {
    state: ResourceState,
    action: Action,
}

impl Scheduler {
    pub async fn run<C>(
        &self,
        client: &C,
        cancel: &CancellationToken,
        project: &mut Project,
    ) -> Summary
    where
        C: ExternalClient<Resource = Project>,
    {
        let mut summary = Summary {
            passes: 0,
            failures: 0,
            tokens_issued: 0,
            state: ResourceState::Unknown,
        };

        for pass in 1..=self.passes {
            if cancel.is_cancelled() {
                break;
            }
            summary.passes = pass;

            let pass_cancel = cancel.child_token();
            let outcome =
                tokio::time::timeout(self.timeout, reconcile(client, &pass_cancel, project)).await;

            match outcome {
                Ok(Ok(report)) => {
                    summary.state = report.state;
                    if let Action::Updated { issued } = report.action {
                        summary.tokens_issued += issued;
                    }
                    info!(
                        pass,
                        state = report.state.as_str(),
                        action = ?report.action,
                        "Pass complete"
                    );
                    if report.state == ResourceState::UpToDate && !self.keep_going {
                        break;
                    }
                }
                Ok(Err(Error::Cancelled)) => {
                    warn!(pass, "Pass cancelled");
                    break;
                }
                Ok(Err(e)) => {
                    summary.failures += 1;
                    if let Error::TokenCreate { issued, .. } = &e {
                        summary.tokens_issued += issued.len();
                    }
                    error!(pass, "Pass failed: {}", e);
                }
                Err(_) => {
                    pass_cancel.cancel();
                    summary.failures += 1;
                    error!(pass, timeout = ?self.timeout, "Pass timed out");
                }
            }

            if pass < self.passes {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        if self.delete && !cancel.is_cancelled() {
            let delete_cancel = cancel.child_token();
            match tokio::time::timeout(self.timeout, client.delete(&delete_cancel, project)).await {
                Ok(Ok(())) => {
                    summary.state = ResourceState::NotExists;
                    info!("Project deleted");
                }
                Ok(Err(e)) => {
                    summary.failures += 1;
                    error!("Delete failed: {}", e);
                }
                Err(_) => {
                    delete_cancel.cancel();
                    summary.failures += 1;
                    error!(timeout = ?self.timeout, "Delete timed out");
                }
            }
        }

        summary
    }
}

/// One pass: observe, then create or update as the verdict demands.
async fn reconcile<C>(
    client: &C,
    cancel: &CancellationToken,
    project: &mut Project,
) -> projsync_core::Result<PassReport>
where
    C: ExternalClient<Resource = Project>,
{
    let observation = client.observe(cancel, project).await?;
    let state = ResourceState::from(&observation);
    if observation.resource_late_initialized {
        debug!("Desired state late-initialized from remote defaults");
    }

    let action = match state {
        ResourceState::NotExists => {
            client.create(cancel, project).await?;
            Action::Created
        }
        ResourceState::Drifted => {
            let update = client.update(cancel, project).await?;
            for key in update.connection_details.keys() {
                debug!(token = %key, "Received token");
            }
            Action::Updated {
                issued: update.connection_details.len(),
            }
        }
        ResourceState::UpToDate | ResourceState::Unknown => Action::None,
    };

    Ok(PassReport { state, action })
}
