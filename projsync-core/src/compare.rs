//! State comparator: decides whether the remote project satisfies the
//! desired parameters, and late-initializes unset desired fields from
//! server defaults.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::token::{is_equal_tokens, plan_token_requests, TokenPlan};
use crate::transport::RemoteProject;
use crate::types::{Destination, GroupKind, ObservedToken, ProjectParameters, ProjectRole};

/// Outcome of comparing desired and observed state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdict {
    pub up_to_date: bool,
    pub late_initialized: bool,
    /// Tokens the next update has to issue.
    pub token_plan: TokenPlan,
}

/// Copy server-populated values into desired fields the caller left empty.
///
/// Returns whether any field was written. Roles are never late-initialized.
pub fn late_initialize(params: &mut ProjectParameters, remote: &RemoteProject) -> bool {
    let mut changed = false;

    if params.description.is_none() && !remote.spec.description.is_empty() {
        params.description = Some(remote.spec.description.clone());
        changed = true;
    }
    if params.project_labels.is_empty() && !remote.labels.is_empty() {
        params.project_labels = remote.labels.clone();
        changed = true;
    }
    changed |= fill(&mut params.source_repos, &remote.spec.source_repos, String::clone);
    changed |= fill(
        &mut params.source_namespaces,
        &remote.spec.source_namespaces,
        String::clone,
    );
    changed |= fill(
        &mut params.destinations,
        &remote.spec.destinations,
        Destination::from,
    );
    changed |= fill(
        &mut params.cluster_resource_whitelist,
        &remote.spec.cluster_resource_whitelist,
        GroupKind::from,
    );
    changed |= fill(
        &mut params.namespace_resource_blacklist,
        &remote.spec.namespace_resource_blacklist,
        GroupKind::from,
    );

    changed
}

fn fill<'r, T, R>(desired: &mut Vec<T>, remote: &'r [R], convert: impl Fn(&'r R) -> T) -> bool {
    if !desired.is_empty() || remote.is_empty() {
        return false;
    }
    *desired = remote.iter().map(convert).collect();
    true
}

/// Structural comparison of everything except token renewal.
pub fn is_project_up_to_date(
    params: &ProjectParameters,
    remote: &RemoteProject,
    tokens_by_role: &BTreeMap<String, Vec<ObservedToken>>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let spec = &remote.spec;

    let scalars_match = params.description.as_deref().unwrap_or_default() == spec.description
        && params.project_labels == remote.labels
        && params.source_repos == spec.source_repos
        && params.source_namespaces == spec.source_namespaces
        && params
            .destinations
            .iter()
            .cloned()
            .eq(spec.destinations.iter().map(Destination::from))
        && params
            .cluster_resource_whitelist
            .iter()
            .cloned()
            .eq(spec.cluster_resource_whitelist.iter().map(GroupKind::from))
        && params
            .namespace_resource_blacklist
            .iter()
            .cloned()
            .eq(spec.namespace_resource_blacklist.iter().map(GroupKind::from));
    if !scalars_match {
        return Ok(false);
    }

    is_equal_roles(&params.roles, remote, tokens_by_role, now)
}

fn is_equal_roles(
    desired: &[ProjectRole],
    remote: &RemoteProject,
    tokens_by_role: &BTreeMap<String, Vec<ObservedToken>>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let observed = &remote.spec.roles;
    if desired.len() != observed.len() {
        return Ok(false);
    }
    for (want, have) in desired.iter().zip(observed) {
        if want.name != have.name
            || want.description.as_deref().unwrap_or_default() != have.description
            || want.policies != have.policies
            || want.groups != have.groups
        {
            return Ok(false);
        }
        let tokens = tokens_by_role
            .get(&want.name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if !is_equal_tokens(&want.tokens, tokens, now)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Late-initialize `params` from `remote`, then decide whether the project is
/// up to date. Pending token issues make it not up to date; late
/// initialization alone never does.
pub fn evaluate(
    project: &str,
    params: &mut ProjectParameters,
    remote: &RemoteProject,
    tokens_by_role: &BTreeMap<String, Vec<ObservedToken>>,
    now: DateTime<Utc>,
) -> Result<Verdict> {
    let late_initialized = late_initialize(params, remote);
    let token_plan = plan_token_requests(project, &params.roles, tokens_by_role, now)?;
    let up_to_date =
        token_plan.is_empty() && is_project_up_to_date(params, remote, tokens_by_role, now)?;

    Ok(Verdict {
        up_to_date,
        late_initialized,
        token_plan,
    })
}
