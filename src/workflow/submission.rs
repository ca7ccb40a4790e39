//! SubmissionWorkflow — loads the profile, saves it on demand, and hands
//! transcripts to the user's webhook.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::state::{FormUpdate, ProfileForm, WorkflowPhase};
use crate::error::WorkflowError;
use crate::identity::SessionContext;
use crate::notification::Notification;
use crate::store::{ProfilePatch, ProfileStore};
use crate::tasks::{TaskContext, TaskGenerator, TaskList};
use crate::webhook::{DeliveryReceipt, TranscriptSubmission, WebhookNotifier};

/// Collaborators of a workflow.
#[derive(Clone)]
pub struct WorkflowDeps {
    pub store: Arc<dyn ProfileStore>,
    pub notifier: Arc<dyn WebhookNotifier>,
    pub generator: Arc<dyn TaskGenerator>,
}

/// Result of an accepted submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub tasks: TaskList,
    pub receipt: DeliveryReceipt,
    pub notification: Notification,
}

/// Point-in-time view of the workflow for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSnapshot {
    pub phase: WorkflowPhase,
    pub saving: bool,
    pub form: ProfileForm,
}

struct WorkflowInner {
    phase: WorkflowPhase,
    form: ProfileForm,
    /// E-mail found in the stored profile at mount, if any.
    stored_email: Option<String>,
    /// Whether the mount-time read succeeded. Until it does, what is stored
    /// is unknown and the e-mail is never written.
    profile_loaded: bool,
}

/// The profile form state machine for one session.
pub struct SubmissionWorkflow {
    session: Arc<SessionContext>,
    deps: WorkflowDeps,
    inner: RwLock<WorkflowInner>,
    saving: AtomicBool,
    torn_down: AtomicBool,
}

impl SubmissionWorkflow {
    pub fn new(session: Arc<SessionContext>, deps: WorkflowDeps) -> Self {
        Self {
            session,
            deps,
            inner: RwLock::new(WorkflowInner {
                phase: WorkflowPhase::Idle,
                form: ProfileForm::default(),
                stored_email: None,
                profile_loaded: false,
            }),
            saving: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
        }
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        let inner = self.inner.read().await;
        WorkflowSnapshot {
            phase: inner.phase,
            saving: self.saving.load(Ordering::SeqCst),
            form: inner.form.clone(),
        }
    }

    pub async fn phase(&self) -> WorkflowPhase {
        self.inner.read().await.phase
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Stop applying state updates. In-flight calls finish but their results
    /// are dropped.
    pub async fn teardown(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
        let mut inner = self.inner.write().await;
        transition(&mut inner, WorkflowPhase::Idle);
        debug!("Submission workflow torn down");
    }

    /// Load the signed-in user's profile into the form.
    ///
    /// A read failure is logged and leaves the fields at their defaults; it
    /// never blocks the rest of the workflow.
    pub async fn mount(&self) {
        if self.is_torn_down() {
            return;
        }
        let Some(identity) = self.session.current() else {
            debug!("No identity present; workflow stays idle");
            return;
        };

        {
            let mut inner = self.inner.write().await;
            inner.form.email = identity.email.clone();
            transition(&mut inner, WorkflowPhase::Loading);
        }

        let loaded = self.deps.store.load_profile(&identity.uid).await;
        if self.is_torn_down() {
            debug!(uid = %identity.uid, "Profile loaded after teardown; discarding");
            return;
        }

        let mut inner = self.inner.write().await;
        match loaded {
            Ok(Some(profile)) => {
                inner.form.role = profile.role.unwrap_or_default();
                inner.form.goal = profile.goal.unwrap_or_default();
                inner.form.webhook_url = profile.webhook_url.unwrap_or_default();
                inner.stored_email = profile.email.filter(|e| !e.is_empty());
                inner.profile_loaded = true;
                debug!(uid = %identity.uid, "Profile loaded");
            }
            Ok(None) => {
                inner.profile_loaded = true;
                debug!(uid = %identity.uid, "No stored profile; using defaults");
            }
            Err(e) => {
                warn!(uid = %identity.uid, error = %e, "Failed to load profile; using defaults");
            }
        }
        transition(&mut inner, WorkflowPhase::Ready);
    }

    /// Edit form fields. The e-mail is not editable.
    pub async fn update_field(&self, update: FormUpdate) -> Result<(), WorkflowError> {
        self.ensure_live()?;
        self.inner.write().await.form.apply(update);
        Ok(())
    }

    /// Persist role, goal and webhook URL with merge semantics.
    ///
    /// The e-mail is only written when the profile loaded at mount had none,
    /// so an existing stored e-mail is never altered. The transcript is
    /// untouched.
    pub async fn save_profile(&self) -> Result<Notification, WorkflowError> {
        self.ensure_live()?;
        let identity = self.session.current().ok_or(WorkflowError::NotSignedIn)?;

        let (form, email_unset) = {
            let inner = self.inner.read().await;
            match inner.phase {
                WorkflowPhase::Idle => return Err(WorkflowError::NotSignedIn),
                WorkflowPhase::Loading => {
                    return Err(WorkflowError::Busy {
                        action: "profile load",
                    });
                }
                WorkflowPhase::Ready | WorkflowPhase::Submitting => {}
            }
            (
                inner.form.clone(),
                inner.profile_loaded && inner.stored_email.is_none(),
            )
        };

        if self.saving.swap(true, Ordering::SeqCst) {
            return Err(WorkflowError::Busy {
                action: "profile save",
            });
        }

        let mut patch = ProfilePatch::editable(&form.role, &form.goal, &form.webhook_url);
        let write_email = email_unset && !form.email.is_empty();
        if write_email {
            patch = patch.with_email(form.email.clone());
        }

        let result = self.deps.store.save_profile(&identity.uid, &patch).await;
        self.saving.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                info!(uid = %identity.uid, "Profile saved");
                if write_email && !self.is_torn_down() {
                    self.inner.write().await.stored_email = Some(form.email);
                }
                Ok(Notification::profile_saved())
            }
            Err(e) => {
                warn!(uid = %identity.uid, error = %e, "Failed to save profile");
                Err(e.into())
            }
        }
    }

    /// Send the transcript to the webhook and produce a task list.
    ///
    /// Requires a non-empty webhook URL and a transcript that is non-empty
    /// after trimming; otherwise nothing is sent. In fire-and-forget mode any
    /// call that does not fail at the transport level counts as accepted.
    pub async fn submit(&self) -> Result<SubmissionOutcome, WorkflowError> {
        self.ensure_live()?;
        let identity = self.session.current().ok_or(WorkflowError::NotSignedIn)?;

        let (url, submission) = {
            let mut inner = self.inner.write().await;
            match inner.phase {
                WorkflowPhase::Idle => return Err(WorkflowError::NotSignedIn),
                WorkflowPhase::Loading => {
                    return Err(WorkflowError::Busy {
                        action: "profile load",
                    });
                }
                WorkflowPhase::Submitting => {
                    return Err(WorkflowError::Busy {
                        action: "submission",
                    });
                }
                WorkflowPhase::Ready => {}
            }

            let form = &inner.form;
            if form.webhook_url.trim().is_empty() {
                return Err(WorkflowError::Validation(
                    "Please enter your Zapier webhook URL.".to_string(),
                ));
            }
            if form.transcript.trim().is_empty() {
                return Err(WorkflowError::Validation(
                    "Please enter a meeting transcript.".to_string(),
                ));
            }

            let submission = TranscriptSubmission::new(
                form.email.clone(),
                form.role.clone(),
                form.goal.clone(),
                form.transcript.clone(),
                identity.uid.clone(),
            );
            let url = form.webhook_url.trim().to_string();
            transition(&mut inner, WorkflowPhase::Submitting);
            (url, submission)
        };

        debug!(uid = %identity.uid, payload = ?submission, "Sending transcript to webhook");
        let delivered = self.deps.notifier.deliver(&url, &submission).await;

        let receipt = match delivered {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(uid = %identity.uid, error = %e, "Failed to send transcript");
                if !self.is_torn_down() {
                    transition(&mut *self.inner.write().await, WorkflowPhase::Ready);
                }
                return Err(e.into());
            }
        };

        let tasks = match receipt.tasks() {
            Some(tasks) => TaskList::new(tasks.to_vec()),
            None => {
                self.deps
                    .generator
                    .generate(TaskContext {
                        transcript: &submission.transcript,
                        role: &submission.role,
                        goal: &submission.goal,
                    })
                    .await
            }
        };

        if self.is_torn_down() {
            debug!(uid = %identity.uid, "Submission finished after teardown; discarding");
            return Err(WorkflowError::TornDown);
        }

        {
            let mut inner = self.inner.write().await;
            inner.form.transcript.clear();
            transition(&mut inner, WorkflowPhase::Ready);
        }

        info!(
            uid = %identity.uid,
            tasks = tasks.len(),
            confirmed = matches!(receipt, DeliveryReceipt::Confirmed { .. }),
            "Transcript submitted"
        );

        Ok(SubmissionOutcome {
            tasks,
            receipt,
            notification: Notification::transcript_sent(),
        })
    }

    fn ensure_live(&self) -> Result<(), WorkflowError> {
        if self.is_torn_down() {
            Err(WorkflowError::TornDown)
        } else {
            Ok(())
        }
    }
}

fn transition(inner: &mut WorkflowInner, target: WorkflowPhase) {
    if !inner.phase.can_transition_to(target) {
        warn!(from = %inner.phase, to = %target, "Unexpected workflow transition");
    }
    inner.phase = target;
}
