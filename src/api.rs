//! REST endpoints for sign-in and the dashboard.
//!
//! Sign-in opens a session and returns a bearer token; every dashboard route
//! resolves that token to a [`SessionShell`] in the registry.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AuthError, ConfigError, ProfileError, WorkflowError};
use crate::identity::{FederatedCredential, Identity, IdentityProvider, SessionContext};
use crate::notification::Notification;
use crate::shell::{DashboardView, SessionRegistry, SessionShell};
use crate::tasks::TaskList;
use crate::webhook::DeliveryReceipt;
use crate::workflow::{FormUpdate, WorkflowDeps};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub deps: WorkflowDeps,
    pub sessions: Arc<SessionRegistry>,
}

/// Build the API router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/signin", post(sign_in))
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/federated", post(federated_sign_in))
        .route("/api/auth/signout", post(sign_out))
        .route("/api/dashboard", get(dashboard))
        .route("/api/dashboard/form", patch(update_form))
        .route("/api/profile/save", post(save_profile))
        .route("/api/transcripts", post(submit_transcript))
        .with_state(state)
}

/// CORS for the browser client. `None` allows any origin.
pub fn cors_layer(origin: Option<&str>) -> Result<CorsLayer, ConfigError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
    match origin {
        Some(origin) => {
            let value = HeaderValue::from_str(origin).map_err(|e| ConfigError::InvalidValue {
                key: "MEETING_ASSIST_CORS_ORIGIN".into(),
                message: e.to_string(),
            })?;
            Ok(layer.allow_origin(value))
        }
        None => Ok(layer.allow_origin(Any)),
    }
}

// ── Errors ──────────────────────────────────────────────────────────────

/// An error response carrying the notification to show.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    notification: Notification,
}

impl ApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            notification: Notification::error("Please sign in to continue."),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({
                "error": self.notification.description,
                "notification": self.notification,
            })),
        )
            .into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let status = match &err {
            WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::NotSignedIn | WorkflowError::TornDown => StatusCode::UNAUTHORIZED,
            WorkflowError::Busy { .. } => StatusCode::CONFLICT,
            WorkflowError::Transport(_) => StatusCode::BAD_GATEWAY,
            WorkflowError::Store(ProfileError::Write { .. } | ProfileError::Read { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        Self {
            status,
            notification: Notification::from(&err),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match &err {
            AuthError::InvalidEmail | AuthError::WeakPassword(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AuthError::AccountExists => StatusCode::CONFLICT,
            AuthError::Network(_) => StatusCode::BAD_GATEWAY,
            AuthError::InvalidCredentials
            | AuthError::ProviderCancelled
            | AuthError::Provider { .. } => StatusCode::UNAUTHORIZED,
        };
        Self {
            status,
            notification: Notification::from(&err),
        }
    }
}

/// Resolve `Authorization: Bearer <token>` to an open session.
async fn session_for(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Uuid, Arc<SessionShell>), ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or_else(ApiError::unauthorized)?;
    let shell = state
        .sessions
        .get(&token)
        .await
        .ok_or_else(ApiError::unauthorized)?;
    Ok((token, shell))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "meeting-assist"
    }))
}

// ── Auth ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PasswordCredentials {
    email: String,
    password: String,
}

impl PasswordCredentials {
    fn password(self) -> SecretString {
        SecretString::from(self.password)
    }
}

#[derive(Serialize)]
struct SignedIn {
    token: Uuid,
    identity: Identity,
}

async fn sign_in(
    State(state): State<AppState>,
    Json(body): Json<PasswordCredentials>,
) -> Result<Json<SignedIn>, ApiError> {
    let session = Arc::new(SessionContext::new(Arc::clone(&state.identity)));
    let email = body.email.clone();
    let outcome = session
        .sign_in_with_password(&email, &body.password())
        .await;
    open_session(&state, session, outcome).await
}

async fn sign_up(
    State(state): State<AppState>,
    Json(body): Json<PasswordCredentials>,
) -> Result<Json<SignedIn>, ApiError> {
    let session = Arc::new(SessionContext::new(Arc::clone(&state.identity)));
    let email = body.email.clone();
    let outcome = session
        .sign_up_with_password(&email, &body.password())
        .await;
    open_session(&state, session, outcome).await
}

async fn federated_sign_in(
    State(state): State<AppState>,
    Json(credential): Json<FederatedCredential>,
) -> Result<Json<SignedIn>, ApiError> {
    let session = Arc::new(SessionContext::new(Arc::clone(&state.identity)));
    let outcome = session.sign_in_with_federated(&credential).await;
    open_session(&state, session, outcome).await
}

async fn open_session(
    state: &AppState,
    session: Arc<SessionContext>,
    outcome: Result<Identity, AuthError>,
) -> Result<Json<SignedIn>, ApiError> {
    let identity = outcome?;
    let shell = SessionShell::open(session, state.deps.clone()).await;
    let (token, _) = state.sessions.insert(shell).await;
    info!(uid = %identity.uid, "Session opened");
    Ok(Json(SignedIn { token, identity }))
}

async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (token, shell) = match session_for(&state, &headers).await {
        Ok(found) => found,
        Err(e) => return e.into_response(),
    };
    let (signed_out, notification) = shell.sign_out().await;
    if signed_out {
        state.sessions.remove(&token).await;
        Json(serde_json::json!({ "notification": notification })).into_response()
    } else {
        ApiError {
            status: StatusCode::BAD_GATEWAY,
            notification,
        }
        .into_response()
    }
}

// ── Dashboard ───────────────────────────────────────────────────────────

async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DashboardView>, ApiError> {
    let (_, shell) = session_for(&state, &headers).await?;
    Ok(Json(shell.view().await))
}

async fn update_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<FormUpdate>,
) -> Result<Json<DashboardView>, ApiError> {
    let (_, shell) = session_for(&state, &headers).await?;
    shell.update_form(update).await?;
    Ok(Json(shell.view().await))
}

#[derive(Serialize)]
struct Saved {
    notification: Notification,
    view: DashboardView,
}

async fn save_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Saved>, ApiError> {
    let (_, shell) = session_for(&state, &headers).await?;
    let notification = shell.save_profile().await?;
    Ok(Json(Saved {
        notification,
        view: shell.view().await,
    }))
}

#[derive(Deserialize, Default)]
struct SubmitRequest {
    /// Replaces the form's transcript before submitting.
    #[serde(default)]
    transcript: Option<String>,
}

#[derive(Serialize)]
struct Submitted {
    notification: Notification,
    tasks: TaskList,
    receipt: DeliveryReceipt,
}

async fn submit_transcript(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<Submitted>, ApiError> {
    let (_, shell) = session_for(&state, &headers).await?;
    if let Some(transcript) = body.transcript {
        shell
            .update_form(FormUpdate {
                transcript: Some(transcript),
                ..Default::default()
            })
            .await?;
    }
    let outcome = shell.submit().await?;
    debug!(tasks = outcome.tasks.len(), "Returning task list");
    Ok(Json(Submitted {
        notification: outcome.notification,
        tasks: outcome.tasks,
        receipt: outcome.receipt,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::identity::session::tests::ScriptedProvider;
    use crate::store::LibSqlBackend;
    use crate::tasks::PlaceholderTaskGenerator;
    use crate::workflow::submission::tests::RecordingNotifier;

    async fn state() -> AppState {
        AppState {
            identity: Arc::new(ScriptedProvider::default()),
            deps: WorkflowDeps {
                store: Arc::new(LibSqlBackend::new_memory().await.unwrap()),
                notifier: Arc::new(RecordingNotifier::default()),
                generator: Arc::new(PlaceholderTaskGenerator),
            },
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = api_routes(state().await);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn dashboard_requires_token() {
        let app = api_routes(state().await);
        let response = app
            .clone()
            .oneshot(Request::get("/api/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get("/api/dashboard")
                    .header("authorization", format!("Bearer {}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(response).await["error"],
            "Please sign in to continue."
        );
    }

    #[tokio::test]
    async fn sign_in_returns_token_for_dashboard() {
        let state = state().await;
        let app = api_routes(state.clone());
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/auth/signin")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"email":"ada@example.com","password":"hunter22"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let token = body["token"].as_str().unwrap().to_string();
        assert_eq!(body["identity"]["uid"], "uid-ada");
        assert_eq!(state.sessions.len().await, 1);

        let response = app
            .oneshot(
                Request::get("/api/dashboard")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let view = json_body(response).await;
        assert_eq!(view["greeting_name"], "Ada");
        assert_eq!(view["phase"], "ready");
        assert_eq!(view["form"]["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn repeated_sign_ins_stay_within_session_cap() {
        let state = state().await;
        let app = api_routes(state.clone());
        for _ in 0..20 {
            let response = app
                .clone()
                .oneshot(
                    Request::post("/api/auth/signin")
                        .header("content-type", "application/json")
                        .body(Body::from(
                            r#"{"email":"ada@example.com","password":"hunter22"}"#,
                        ))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(
            state.sessions.len().await,
            crate::config::SessionConfig::default().max_per_user
        );
    }

    #[tokio::test]
    async fn failed_sign_up_is_conflict() {
        let state = state().await;
        let response = api_routes(state.clone())
            .oneshot(
                Request::post("/api/auth/signup")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"email":"ada@example.com","password":"hunter22"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(state.sessions.is_empty().await);
    }

    #[test]
    fn workflow_errors_map_to_statuses() {
        let status = |e: WorkflowError| ApiError::from(e).status;
        assert_eq!(
            status(WorkflowError::Validation("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(WorkflowError::Busy {
                action: "submission"
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(WorkflowError::Transport(
                crate::error::TransportError::Rejected { status: 500 }
            )),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(WorkflowError::Store(ProfileError::Write {
                uid: "u".into(),
                source: crate::error::DatabaseError::Query("x".into()),
            })),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status(WorkflowError::NotSignedIn), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn cors_rejects_bad_origin() {
        assert!(cors_layer(Some("https://app.example.com")).is_ok());
        assert!(cors_layer(None).is_ok());
        assert!(cors_layer(Some("bad\norigin")).is_err());
    }
}
