//! User-facing notifications.
//!
//! Every action outcome, good or bad, ends up as one of these; rendering is
//! left to the client.

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, ProfileError, WorkflowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationVariant {
    #[default]
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: NotificationVariant,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NotificationVariant::Default,
        }
    }

    /// A destructive notification titled "Error".
    pub fn error(description: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            description: description.into(),
            variant: NotificationVariant::Destructive,
        }
    }

    pub fn is_error(&self) -> bool {
        self.variant == NotificationVariant::Destructive
    }

    pub fn profile_saved() -> Self {
        Self::info("Saved", "Your profile information has been saved.")
    }

    pub fn transcript_sent() -> Self {
        Self::info(
            "Success",
            "Meeting transcript sent to Zapier! Tasks are being generated.",
        )
    }

    pub fn logged_out() -> Self {
        Self::info("Logged out", "You have been successfully logged out.")
    }

    pub fn logout_failed() -> Self {
        Self::error("Failed to log out. Please try again.")
    }
}

impl From<&WorkflowError> for Notification {
    fn from(err: &WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(message) => Self::error(message.clone()),
            WorkflowError::NotSignedIn => Self::error("Please sign in to continue."),
            WorkflowError::Busy { action } => {
                Self::error(format!("A {action} is already in progress."))
            }
            WorkflowError::TornDown => Self::error("This session has ended."),
            WorkflowError::Transport(_) => {
                Self::error("Failed to send transcript to Zapier. Please try again.")
            }
            WorkflowError::Store(ProfileError::Write { .. }) => {
                Self::error("Failed to save profile information.")
            }
            WorkflowError::Store(ProfileError::Read { .. }) => {
                Self::error("Failed to load profile information.")
            }
        }
    }
}

impl From<&AuthError> for Notification {
    fn from(err: &AuthError) -> Self {
        Self::error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DatabaseError, TransportError};

    #[test]
    fn workflow_errors_become_destructive_notifications() {
        let n = Notification::from(&WorkflowError::Validation(
            "Please enter a meeting transcript.".into(),
        ));
        assert!(n.is_error());
        assert_eq!(n.title, "Error");
        assert_eq!(n.description, "Please enter a meeting transcript.");

        let n = Notification::from(&WorkflowError::Transport(TransportError::RequestFailed(
            "refused".into(),
        )));
        assert_eq!(
            n.description,
            "Failed to send transcript to Zapier. Please try again."
        );

        let n = Notification::from(&WorkflowError::Store(ProfileError::Write {
            uid: "u1".into(),
            source: DatabaseError::Query("disk full".into()),
        }));
        assert_eq!(n.description, "Failed to save profile information.");
    }

    #[test]
    fn auth_errors_use_their_message() {
        let n = Notification::from(&AuthError::InvalidCredentials);
        assert!(n.is_error());
        assert_eq!(n.description, "Invalid email or password.");
    }

    #[test]
    fn serializes_variant_snake_case() {
        let json = serde_json::to_value(Notification::profile_saved()).unwrap();
        assert_eq!(json["variant"], "default");
        assert_eq!(json["title"], "Saved");
        let json = serde_json::to_value(Notification::logout_failed()).unwrap();
        assert_eq!(json["variant"], "destructive");
    }
}
