//! Error types for Meeting Assist, one enum per failure domain.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Identity provider failures. Every variant renders as a message that can be
/// shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password.")]
    InvalidCredentials,

    #[error("An account with this email already exists.")]
    AccountExists,

    #[error("Please enter a valid email address.")]
    InvalidEmail,

    #[error("Password is too weak: {0}")]
    WeakPassword(String),

    #[error("Sign-in was cancelled.")]
    ProviderCancelled,

    #[error("Network error while contacting the identity provider: {0}")]
    Network(String),

    #[error("Identity provider error: {code}")]
    Provider { code: String },
}

/// Profile store failures.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Failed to read profile for {uid}: {source}")]
    Read {
        uid: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Failed to write profile for {uid}: {source}")]
    Write {
        uid: String,
        #[source]
        source: DatabaseError,
    },
}

/// Outbound webhook failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Webhook URL is invalid: {0}")]
    InvalidUrl(String),

    #[error("Webhook request failed: {0}")]
    RequestFailed(String),

    #[error("Webhook responded with status {status}")]
    Rejected { status: u16 },
}

/// Submission workflow failures, surfaced to the user as notifications.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("A {action} is already in progress")]
    Busy { action: &'static str },

    #[error("Workflow has been torn down")]
    TornDown,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] ProfileError),
}
