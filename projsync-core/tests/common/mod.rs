//! Shared test utilities for projsync-core integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use projsync_core::memory::MemoryProjectService;
use projsync_core::transport::{RemoteProject, RemoteProjectSpec};
use projsync_core::types::{Project, ProjectParameters, ProjectRole, TokenSpec};
use projsync_core::{Clock, ProjectReconciler};
use tokio_util::sync::CancellationToken;

pub const TEST_PROJECT_EXTERNAL_NAME: &str = "testproject";
pub const TEST_DESCRIPTION: &str = "This is a Test";
pub const TEST_DESCRIPTION_2: &str = "This description changed";

/// Start of every test timeline.
pub const T0: i64 = 1_700_000_000;

/// Clock the test moves by hand.
#[derive(Clone)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn new(secs: i64) -> Self {
        Self(Arc::new(AtomicI64::new(secs)))
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn secs(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.secs(), 0).unwrap()
    }
}

/// Reconciler wired to an in-memory control plane sharing one clock.
pub struct TestEnv {
    pub service: MemoryProjectService,
    pub reconciler: ProjectReconciler,
    pub clock: ManualClock,
    pub cancel: CancellationToken,
}

impl TestEnv {
    pub fn new() -> Self {
        let clock = ManualClock::new(T0);
        let service = MemoryProjectService::with_clock(Arc::new(clock.clone()));
        let reconciler =
            ProjectReconciler::with_clock(Arc::new(service.clone()), Arc::new(clock.clone()));
        Self {
            service,
            reconciler,
            clock,
            cancel: CancellationToken::new(),
        }
    }
}

pub fn test_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("label1".to_string(), "value1".to_string())])
}

/// Remote project with the given description and labels.
pub fn remote(description: &str, labels: BTreeMap<String, String>) -> RemoteProject {
    RemoteProject {
        name: TEST_PROJECT_EXTERNAL_NAME.to_string(),
        labels,
        spec: RemoteProjectSpec {
            description: description.to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Builder for desired projects.
pub struct ProjectBuilder {
    project: Project,
}

pub fn project() -> ProjectBuilder {
    ProjectBuilder {
        project: Project::default(),
    }
}

impl ProjectBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.project.metadata.name = name.to_string();
        self
    }

    pub fn external_name(mut self, name: &str) -> Self {
        self.project.set_external_name(name);
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.project.spec.for_provider.description = Some(description.to_string());
        self
    }

    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.project.spec.for_provider.project_labels = labels;
        self
    }

    pub fn role(mut self, role: ProjectRole) -> Self {
        self.project.spec.for_provider.roles.push(role);
        self
    }

    pub fn params(mut self, params: ProjectParameters) -> Self {
        self.project.spec.for_provider = params;
        self
    }

    pub fn build(self) -> Project {
        self.project
    }
}

pub fn role(name: &str, tokens: Vec<TokenSpec>) -> ProjectRole {
    ProjectRole {
        name: name.to_string(),
        tokens,
        ..Default::default()
    }
}

pub fn token(id: &str, expires_in: &str) -> TokenSpec {
    TokenSpec {
        id: id.to_string(),
        expires_in: Some(expires_in.to_string()),
        ..Default::default()
    }
}
