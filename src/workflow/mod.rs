//! Submission workflow — the profile form behind the dashboard.
//!
//! Loads the user's profile when mounted, lets the user edit and save it, and
//! forwards meeting transcripts to the user's automation webhook.

pub mod state;
pub mod submission;

pub use state::{FormUpdate, ProfileForm, WorkflowPhase};
pub use submission::{SubmissionOutcome, SubmissionWorkflow, WorkflowDeps, WorkflowSnapshot};
