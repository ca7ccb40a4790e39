//! Task lists and the task generation seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The fixed list shown after every accepted submission until a real
/// generation backend is plugged in.
pub const PLACEHOLDER_TASKS: [&str; 5] = [
    "Schedule follow-up meeting with key stakeholders",
    "Create action item summary document",
    "Send meeting notes to all participants",
    "Research discussed solutions and prepare recommendations",
    "Set up project timeline based on meeting decisions",
];

/// Ordered list of short task descriptions.
///
/// Only ever replaced wholesale; there is no API for incremental edits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskList(Vec<String>);

impl TaskList {
    pub fn new(items: Vec<String>) -> Self {
        Self(items)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn items(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for TaskList {
    fn from(items: Vec<String>) -> Self {
        Self(items)
    }
}

/// What a generator gets to work with.
#[derive(Debug, Clone)]
pub struct TaskContext<'a> {
    pub transcript: &'a str,
    pub role: &'a str,
    pub goal: &'a str,
}

/// Turns a meeting transcript into an ordered task list.
#[async_trait]
pub trait TaskGenerator: Send + Sync {
    async fn generate(&self, context: TaskContext<'_>) -> TaskList;
}

/// Ignores its input and returns [`PLACEHOLDER_TASKS`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderTaskGenerator;

#[async_trait]
impl TaskGenerator for PlaceholderTaskGenerator {
    async fn generate(&self, _context: TaskContext<'_>) -> TaskList {
        TaskList::new(PLACEHOLDER_TASKS.iter().map(|t| t.to_string()).collect())
    }
}
