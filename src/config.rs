//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::webhook::DeliveryMode;

/// Which identity provider backs sign-in.
#[derive(Debug, Clone)]
pub enum IdentityConfig {
    /// Accounts stored in the local database.
    Local,
    /// Google Identity Toolkit (Firebase Authentication) REST API.
    Firebase {
        api_key: SecretString,
        /// `requestUri` sent with federated sign-in.
        request_uri: String,
    },
}

/// Outbound webhook settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub mode: DeliveryMode,
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::FireAndForget,
            timeout: Duration::from_secs(15),
        }
    }
}

/// Limits on open dashboard sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// A session untouched for this long is closed.
    pub idle_ttl: Duration,
    /// Open sessions allowed per user; the least recently used is closed first.
    pub max_per_user: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(60 * 60),
            max_per_user: 5,
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub identity: IdentityConfig,
    pub webhook: WebhookConfig,
    pub sessions: SessionConfig,
    /// Allowed browser origin for CORS. `None` allows any origin.
    pub cors_origin: Option<String>,
}

impl AppConfig {
    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("MEETING_ASSIST_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "MEETING_ASSIST_PORT".into(),
                message: format!("'{raw}' is not a valid port"),
            })?,
            None => 8080,
        };

        let db_path = lookup("MEETING_ASSIST_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/meeting-assist.db"));

        let identity = match lookup("MEETING_ASSIST_IDENTITY").as_deref() {
            None | Some("local") => IdentityConfig::Local,
            Some("firebase") => {
                let api_key = lookup("FIREBASE_API_KEY")
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| ConfigError::MissingEnvVar("FIREBASE_API_KEY".into()))?;
                IdentityConfig::Firebase {
                    api_key: SecretString::from(api_key),
                    request_uri: lookup("FIREBASE_REQUEST_URI")
                        .unwrap_or_else(|| "http://localhost".to_string()),
                }
            }
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "MEETING_ASSIST_IDENTITY".into(),
                    message: format!("expected 'local' or 'firebase', got '{other}'"),
                });
            }
        };

        let mode = match lookup("MEETING_ASSIST_WEBHOOK_MODE") {
            Some(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: "MEETING_ASSIST_WEBHOOK_MODE".into(),
                message,
            })?,
            None => DeliveryMode::FireAndForget,
        };

        let timeout_secs = positive(&lookup, "MEETING_ASSIST_WEBHOOK_TIMEOUT_SECS", 15)?;
        let idle_mins = positive(&lookup, "MEETING_ASSIST_SESSION_IDLE_MINS", 60)?;
        let max_per_user = positive(&lookup, "MEETING_ASSIST_MAX_SESSIONS_PER_USER", 5)?;

        let cors_origin = lookup("MEETING_ASSIST_CORS_ORIGIN").filter(|s| !s.is_empty());

        Ok(Self {
            port,
            db_path,
            identity,
            webhook: WebhookConfig {
                mode,
                timeout: Duration::from_secs(timeout_secs),
            },
            sessions: SessionConfig {
                idle_ttl: Duration::from_secs(idle_mins.saturating_mul(60)),
                max_per_user: max_per_user as usize,
            },
            cors_origin,
        })
    }
}

/// Read a strictly positive integer, falling back to `default` when unset.
fn positive<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: "must be greater than zero".into(),
        }),
        Ok(value) => Ok(value),
        Err(_) => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("'{raw}' is not a positive integer"),
        }),
    }
}
