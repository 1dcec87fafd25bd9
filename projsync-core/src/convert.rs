//! Conversions between desired-state types and transport wire types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::transport::{
    RemoteDestination, RemoteGroupKind, RemoteProject, RemoteProjectSpec, RemoteRole, RemoteToken,
};
use crate::types::{Destination, GroupKind, ObservedToken, ProjectObservation, ProjectParameters};

impl From<&RemoteToken> for ObservedToken {
    fn from(t: &RemoteToken) -> Self {
        ObservedToken {
            id: t.id.clone(),
            issued_at: timestamp(t.iat),
            expires_at: (t.exp != 0).then(|| timestamp(t.exp)),
        }
    }
}

impl From<&ObservedToken> for RemoteToken {
    fn from(t: &ObservedToken) -> Self {
        RemoteToken {
            id: t.id.clone(),
            iat: t.issued_at.timestamp(),
            exp: t.expires_at.map(|e| e.timestamp()).unwrap_or(0),
        }
    }
}

impl From<&Destination> for RemoteDestination {
    fn from(d: &Destination) -> Self {
        RemoteDestination {
            server: d.server.clone().unwrap_or_default(),
            namespace: d.namespace.clone().unwrap_or_default(),
            name: d.name.clone().unwrap_or_default(),
        }
    }
}

impl From<&RemoteDestination> for Destination {
    fn from(d: &RemoteDestination) -> Self {
        let non_empty = |s: &String| (!s.is_empty()).then(|| s.clone());
        Destination {
            server: non_empty(&d.server),
            namespace: non_empty(&d.namespace),
            name: non_empty(&d.name),
        }
    }
}

impl From<&GroupKind> for RemoteGroupKind {
    fn from(g: &GroupKind) -> Self {
        RemoteGroupKind {
            group: g.group.clone(),
            kind: g.kind.clone(),
        }
    }
}

impl From<&RemoteGroupKind> for GroupKind {
    fn from(g: &RemoteGroupKind) -> Self {
        GroupKind {
            group: g.group.clone(),
            kind: g.kind.clone(),
        }
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(|| {
        warn!(secs, "Remote token timestamp out of range, using the Unix epoch");
        DateTime::UNIX_EPOCH
    })
}

/// Build the observation recorded in the resource status.
pub fn observation(remote: &RemoteProject) -> ProjectObservation {
    ProjectObservation {
        jwt_tokens_by_role: remote
            .status
            .jwt_tokens_by_role
            .iter()
            .map(|(role, tokens)| (role.clone(), tokens.iter().map(ObservedToken::from).collect()))
            .collect(),
    }
}

/// Build the remote representation of the desired parameters.
///
/// Role tokens are taken from `tokens_by_role`, restricted to the token IDs
/// still present in the desired role and ordered like it. Tokens are never
/// invented here; new ones are issued through token-create calls.
pub fn remote_project(
    name: &str,
    params: &ProjectParameters,
    tokens_by_role: &BTreeMap<String, Vec<ObservedToken>>,
) -> RemoteProject {
    let roles = params
        .roles
        .iter()
        .map(|role| {
            let observed = tokens_by_role.get(&role.name);
            let jwt_tokens = role
                .tokens
                .iter()
                .filter_map(|spec| observed?.iter().find(|t| t.id == spec.id))
                .map(RemoteToken::from)
                .collect();
            RemoteRole {
                name: role.name.clone(),
                description: role.description.clone().unwrap_or_default(),
                policies: role.policies.clone(),
                groups: role.groups.clone(),
                jwt_tokens,
            }
        })
        .collect();

    RemoteProject {
        name: name.to_string(),
        labels: params.project_labels.clone(),
        spec: RemoteProjectSpec {
            description: params.description.clone().unwrap_or_default(),
            source_repos: params.source_repos.clone(),
            source_namespaces: params.source_namespaces.clone(),
            destinations: params.destinations.iter().map(RemoteDestination::from).collect(),
            cluster_resource_whitelist: params
                .cluster_resource_whitelist
                .iter()
                .map(RemoteGroupKind::from)
                .collect(),
            namespace_resource_blacklist: params
                .namespace_resource_blacklist
                .iter()
                .map(RemoteGroupKind::from)
                .collect(),
            roles,
        },
        ..Default::default()
    }
}
