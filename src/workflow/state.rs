//! Submission workflow state — phases and form fields.

use serde::{Deserialize, Serialize};

/// Phase of the submission workflow.
///
/// `Idle → Loading → Ready ⇄ Submitting`. Saving the profile is tracked
/// separately and does not change the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Submitting,
}

impl WorkflowPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: WorkflowPhase) -> bool {
        use WorkflowPhase::*;
        matches!(
            (self, target),
            (Idle, Loading)
                | (Ready, Loading)
                | (Loading, Ready)
                | (Ready, Submitting)
                | (Submitting, Ready)
                | (_, Idle)
        )
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Submitting => "submitting",
        };
        write!(f, "{s}")
    }
}

/// Form fields. Optional profile values are held as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileForm {
    /// Display-only, copied from the identity.
    pub email: String,
    pub role: String,
    pub goal: String,
    pub webhook_url: String,
    pub transcript: String,
}

/// Edits to the user-editable fields. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormUpdate {
    pub role: Option<String>,
    pub goal: Option<String>,
    pub webhook_url: Option<String>,
    pub transcript: Option<String>,
}

impl ProfileForm {
    pub fn apply(&mut self, update: FormUpdate) {
        if let Some(role) = update.role {
            self.role = role;
        }
        if let Some(goal) = update.goal {
            self.goal = goal;
        }
        if let Some(webhook_url) = update.webhook_url {
            self.webhook_url = webhook_url;
        }
        if let Some(transcript) = update.transcript {
            self.transcript = transcript;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use WorkflowPhase::*;
        for (from, to) in [
            (Idle, Loading),
            (Loading, Ready),
            (Ready, Submitting),
            (Submitting, Ready),
            (Ready, Loading),
            (Submitting, Idle),
        ] {
            assert!(from.can_transition_to(to), "{from} should transition to {to}");
        }
    }

    #[test]
    fn invalid_transitions() {
        use WorkflowPhase::*;
        assert!(!Idle.can_transition_to(Submitting));
        assert!(!Loading.can_transition_to(Submitting));
        assert!(!Submitting.can_transition_to(Submitting));
        assert!(!Idle.can_transition_to(Ready));
    }

    #[test]
    fn display_matches_serde() {
        use WorkflowPhase::*;
        for phase in [Idle, Loading, Ready, Submitting] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(format!("\"{phase}\""), json);
        }
    }

    #[test]
    fn apply_only_touches_given_fields() {
        let mut form = ProfileForm {
            email: "ada@example.com".into(),
            role: "Engineer".into(),
            goal: "Ship v2".into(),
            webhook_url: "https://h".into(),
            transcript: "notes".into(),
        };
        form.apply(FormUpdate {
            goal: Some("Ship v3".into()),
            transcript: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(form.role, "Engineer");
        assert_eq!(form.goal, "Ship v3");
        assert_eq!(form.webhook_url, "https://h");
        assert!(form.transcript.is_empty());
        assert_eq!(form.email, "ada@example.com");
    }
}
