//! In-memory [`ProjectService`] for tests and simulations.
//!
//! Behaves like a minimal control plane: projects are keyed by name, every
//! write bumps `resource_version`, and `jwt_tokens_by_role` mirrors the
//! tokens held by each role. Failures can be injected per operation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::time::{Clock, SystemClock};
use crate::transport::{
    IssuedToken, ProjectCreateRequest, ProjectQuery, ProjectService, ProjectTokenCreateRequest,
    ProjectUpdateRequest, RemoteProject, RemoteToken, TransportError, TransportResult,
};

/// Transport operation, used to inject failures and to inspect calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Create,
    Update,
    Delete,
    CreateToken,
}

/// A recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get(ProjectQuery),
    Create(ProjectCreateRequest),
    Update(ProjectUpdateRequest),
    Delete(ProjectQuery),
    CreateToken(ProjectTokenCreateRequest),
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::Get(_) => Operation::Get,
            Call::Create(_) => Operation::Create,
            Call::Update(_) => Operation::Update,
            Call::Delete(_) => Operation::Delete,
            Call::CreateToken(_) => Operation::CreateToken,
        }
    }
}

#[derive(Default)]
struct Inner {
    projects: BTreeMap<String, RemoteProject>,
    failures: HashMap<Operation, TransportError>,
    /// Token-create failures keyed by `(role, id)`.
    token_failures: HashMap<(String, String), TransportError>,
    calls: Vec<Call>,
    version: u64,
}

/// In-memory control plane.
#[derive(Clone)]
pub struct MemoryProjectService {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryProjectService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProjectService {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use `clock` for token issue times.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock,
        }
    }

    /// Store a project as if it had been created remotely.
    pub async fn insert(&self, mut project: RemoteProject) {
        let mut inner = self.inner.lock().await;
        inner.version += 1;
        project.resource_version = inner.version.to_string();
        inner.projects.insert(project.name.clone(), project);
    }

    pub async fn project(&self, name: &str) -> Option<RemoteProject> {
        self.inner.lock().await.projects.get(name).cloned()
    }

    /// Make every following call of `op` fail with `error`.
    pub async fn fail(&self, op: Operation, error: TransportError) {
        self.inner.lock().await.failures.insert(op, error);
    }

    /// Make token-create calls for `role`/`id` fail with `error`.
    pub async fn fail_token(&self, role: &str, id: &str, error: TransportError) {
        self.inner
            .lock()
            .await
            .token_failures
            .insert((role.to_string(), id.to_string()), error);
    }

    /// Remove all injected failures.
    pub async fn heal(&self) {
        let mut inner = self.inner.lock().await;
        inner.failures.clear();
        inner.token_failures.clear();
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.inner.lock().await.calls.clone()
    }

    /// Number of recorded calls of `op`.
    pub async fn count(&self, op: Operation) -> usize {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.operation() == op)
            .count()
    }

    pub async fn clear_calls(&self) {
        self.inner.lock().await.calls.clear();
    }
}

impl Inner {
    fn record(&mut self, call: Call) -> TransportResult<()> {
        let op = call.operation();
        self.calls.push(call);
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// Rebuild the status token index from the role tokens.
fn sync_status(project: &mut RemoteProject) {
    project.status.jwt_tokens_by_role = project
        .spec
        .roles
        .iter()
        .filter(|r| !r.jwt_tokens.is_empty())
        .map(|r| (r.name.clone(), r.jwt_tokens.clone()))
        .collect();
}

#[async_trait]
impl ProjectService for MemoryProjectService {
    async fn get(&self, query: ProjectQuery) -> TransportResult<RemoteProject> {
        let mut inner = self.inner.lock().await;
        inner.record(Call::Get(query.clone()))?;
        inner
            .projects
            .get(&query.name)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("project {}", query.name)))
    }

    async fn create(&self, request: ProjectCreateRequest) -> TransportResult<RemoteProject> {
        let mut inner = self.inner.lock().await;
        inner.record(Call::Create(request.clone()))?;

        let name = request.project.name.clone();
        if inner.projects.contains_key(&name) && !request.upsert {
            return Err(TransportError::Conflict(format!(
                "project {} already exists",
                name
            )));
        }

        let mut project = request.project;
        project.resource_version = inner.next_version();
        sync_status(&mut project);
        debug!(project = %name, "memory: project created");
        inner.projects.insert(name, project.clone());
        Ok(project)
    }

    async fn update(&self, request: ProjectUpdateRequest) -> TransportResult<RemoteProject> {
        let mut inner = self.inner.lock().await;
        inner.record(Call::Update(request.clone()))?;

        let name = request.project.name.clone();
        let current_version = match inner.projects.get(&name) {
            Some(current) => current.resource_version.clone(),
            None => return Err(TransportError::NotFound(format!("project {}", name))),
        };
        if request.project.resource_version != current_version {
            return Err(TransportError::Conflict(format!(
                "project {} was modified: version {} != {}",
                name, request.project.resource_version, current_version
            )));
        }

        let mut project = request.project;
        project.resource_version = inner.next_version();
        sync_status(&mut project);
        debug!(project = %name, version = %project.resource_version, "memory: project updated");
        inner.projects.insert(name, project.clone());
        Ok(project)
    }

    async fn delete(&self, query: ProjectQuery) -> TransportResult<()> {
        let mut inner = self.inner.lock().await;
        inner.record(Call::Delete(query.clone()))?;
        match inner.projects.remove(&query.name) {
            Some(_) => Ok(()),
            None => Err(TransportError::NotFound(format!("project {}", query.name))),
        }
    }

    async fn create_token(
        &self,
        request: ProjectTokenCreateRequest,
    ) -> TransportResult<IssuedToken> {
        let mut inner = self.inner.lock().await;
        inner.record(Call::CreateToken(request.clone()))?;
        if let Some(err) = inner
            .token_failures
            .get(&(request.role.clone(), request.id.clone()))
        {
            return Err(err.clone());
        }

        let iat = self.clock.now().timestamp();
        let token = RemoteToken {
            id: request.id.clone(),
            iat,
            exp: if request.expires_in > 0 {
                iat + request.expires_in
            } else {
                0
            },
        };
        let version = inner.next_version();

        let project = inner
            .projects
            .get_mut(&request.project)
            .ok_or_else(|| TransportError::NotFound(format!("project {}", request.project)))?;
        let role = project
            .spec
            .roles
            .iter_mut()
            .find(|r| r.name == request.role)
            .ok_or_else(|| {
                TransportError::NotFound(format!(
                    "role {} in project {}",
                    request.role, request.project
                ))
            })?;
        match role.jwt_tokens.iter_mut().find(|t| t.id == token.id) {
            Some(existing) => *existing = token,
            None => role.jwt_tokens.push(token),
        }
        project.resource_version = version;
        sync_status(project);

        debug!(
            project = %request.project,
            role = %request.role,
            token = %request.id,
            "memory: token issued"
        );
        Ok(IssuedToken {
            token: format!(
                "jwt.{}.{}.{}.{}",
                request.project,
                request.role,
                request.id,
                uuid::Uuid::new_v4().simple()
            ),
        })
    }
}
