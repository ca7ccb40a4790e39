//! Session shell — the dashboard for one signed-in session.
//!
//! Owns the submission workflow and the most recent task list, and handles
//! sign-out. The [`SessionRegistry`] maps bearer tokens to shells and closes
//! sessions that sit idle or exceed the per-user limit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::WorkflowError;
use crate::identity::{Identity, SessionContext};
use crate::notification::Notification;
use crate::tasks::TaskList;
use crate::workflow::{
    FormUpdate, ProfileForm, SubmissionOutcome, SubmissionWorkflow, WorkflowDeps, WorkflowPhase,
};

/// Everything the dashboard renders.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub identity: Option<Identity>,
    /// First word of the display name, for the welcome banner.
    pub greeting_name: Option<String>,
    pub form: ProfileForm,
    pub phase: WorkflowPhase,
    pub saving: bool,
    pub tasks: TaskList,
}

pub struct SessionShell {
    session: Arc<SessionContext>,
    workflow: SubmissionWorkflow,
    tasks: RwLock<TaskList>,
}

impl SessionShell {
    pub fn new(session: Arc<SessionContext>, deps: WorkflowDeps) -> Self {
        Self {
            workflow: SubmissionWorkflow::new(Arc::clone(&session), deps),
            session,
            tasks: RwLock::new(TaskList::default()),
        }
    }

    /// Build a shell and load the profile for its identity.
    pub async fn open(session: Arc<SessionContext>, deps: WorkflowDeps) -> Self {
        let shell = Self::new(session, deps);
        shell.workflow.mount().await;
        shell
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn workflow(&self) -> &SubmissionWorkflow {
        &self.workflow
    }

    pub async fn tasks(&self) -> TaskList {
        self.tasks.read().await.clone()
    }

    pub async fn update_form(&self, update: FormUpdate) -> Result<(), WorkflowError> {
        self.workflow.update_field(update).await
    }

    pub async fn save_profile(&self) -> Result<Notification, WorkflowError> {
        self.workflow.save_profile().await
    }

    /// Submit the transcript. On success the task list is replaced wholesale;
    /// on failure the previous list stays.
    pub async fn submit(&self) -> Result<SubmissionOutcome, WorkflowError> {
        let outcome = self.workflow.submit().await?;
        *self.tasks.write().await = outcome.tasks.clone();
        Ok(outcome)
    }

    /// Sign out through the identity provider.
    ///
    /// Returns the notification to show. A failure keeps the identity and the
    /// dashboard as they are.
    pub async fn sign_out(&self) -> (bool, Notification) {
        match self.session.sign_out().await {
            Ok(()) => {
                self.workflow.teardown().await;
                *self.tasks.write().await = TaskList::default();
                (true, Notification::logged_out())
            }
            Err(_) => (false, Notification::logout_failed()),
        }
    }

    pub async fn view(&self) -> DashboardView {
        let identity = self.session.current();
        let snapshot = self.workflow.snapshot().await;
        DashboardView {
            greeting_name: identity
                .as_ref()
                .and_then(Identity::first_name)
                .map(str::to_string),
            identity,
            form: snapshot.form,
            phase: snapshot.phase,
            saving: snapshot.saving,
            tasks: self.tasks().await,
        }
    }
}

struct SessionEntry {
    shell: Arc<SessionShell>,
    uid: Option<String>,
    last_access: Instant,
}

/// Open sessions keyed by bearer token.
///
/// Sessions idle for longer than the configured TTL are closed on lookup and
/// by [`spawn_sweep_task`]. Each user keeps at most `max_per_user` sessions;
/// opening one more closes that user's least recently used session.
pub struct SessionRegistry {
    shells: RwLock<HashMap<Uuid, SessionEntry>>,
    limits: SessionConfig,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_limits(SessionConfig::default())
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: SessionConfig) -> Self {
        Self {
            shells: RwLock::new(HashMap::new()),
            limits,
        }
    }

    pub async fn insert(&self, shell: SessionShell) -> (Uuid, Arc<SessionShell>) {
        let token = Uuid::new_v4();
        let uid = shell.session().current().map(|identity| identity.uid);
        let shell = Arc::new(shell);

        let evicted = {
            let mut shells = self.shells.write().await;
            let mut evicted = Vec::new();
            if let Some(uid) = uid.as_deref() {
                let mut owned: Vec<(Uuid, Instant)> = shells
                    .iter()
                    .filter(|(_, entry)| entry.uid.as_deref() == Some(uid))
                    .map(|(token, entry)| (*token, entry.last_access))
                    .collect();
                owned.sort_by_key(|(_, last_access)| *last_access);
                let excess = (owned.len() + 1).saturating_sub(self.limits.max_per_user);
                for (old, _) in owned.into_iter().take(excess) {
                    if let Some(entry) = shells.remove(&old) {
                        evicted.push(entry.shell);
                    }
                }
            }
            shells.insert(
                token,
                SessionEntry {
                    shell: Arc::clone(&shell),
                    uid,
                    last_access: Instant::now(),
                },
            );
            evicted
        };

        if !evicted.is_empty() {
            info!(count = evicted.len(), "Closed least recently used sessions");
        }
        for old in evicted {
            old.workflow().teardown().await;
        }
        debug!(%token, "Session registered");
        (token, shell)
    }

    /// Look up a session and mark it used. Expired sessions are closed.
    pub async fn get(&self, token: &Uuid) -> Option<Arc<SessionShell>> {
        let expired = {
            let mut shells = self.shells.write().await;
            let entry = shells.get_mut(token)?;
            if entry.last_access.elapsed() < self.limits.idle_ttl {
                entry.last_access = Instant::now();
                return Some(Arc::clone(&entry.shell));
            }
            shells.remove(token)
        };
        if let Some(entry) = expired {
            debug!(%token, "Session expired");
            entry.shell.workflow().teardown().await;
        }
        None
    }

    pub async fn remove(&self, token: &Uuid) -> Option<Arc<SessionShell>> {
        let removed = self.shells.write().await.remove(token).map(|entry| entry.shell);
        if removed.is_some() {
            info!(%token, "Session closed");
        }
        removed
    }

    /// Close every session idle for longer than the TTL.
    pub async fn expire_idle(&self) -> usize {
        let expired: Vec<Arc<SessionShell>> = {
            let mut shells = self.shells.write().await;
            let stale: Vec<Uuid> = shells
                .iter()
                .filter(|(_, entry)| entry.last_access.elapsed() >= self.limits.idle_ttl)
                .map(|(token, _)| *token)
                .collect();
            stale
                .iter()
                .filter_map(|token| shells.remove(token))
                .map(|entry| entry.shell)
                .collect()
        };
        for shell in &expired {
            shell.workflow().teardown().await;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired idle sessions");
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.shells.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shells.read().await.is_empty()
    }
}

/// Spawn a background task that expires idle sessions every `period`.
pub fn spawn_sweep_task(
    registry: Arc<SessionRegistry>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            registry.expire_idle().await;
        }
    })
}
