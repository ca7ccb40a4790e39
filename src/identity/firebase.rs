//! Firebase Authentication adapter over the Identity Toolkit REST API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{FederatedCredential, Identity, IdentityProvider};
use crate::error::AuthError;

const DEFAULT_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Successful sign-in / sign-up response (subset).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct FirebaseIdentity {
    api_key: SecretString,
    base_url: String,
    request_uri: String,
    client: reqwest::Client,
}

impl FirebaseIdentity {
    pub fn new(api_key: SecretString, request_uri: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_uri: request_uri.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the adapter at a different Identity Toolkit endpoint (emulator, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/accounts:{method}?key={}",
            self.base_url,
            self.api_key.expose_secret()
        )
    }

    async fn call(
        &self,
        method: &str,
        body: serde_json::Value,
        fallback_email: &str,
    ) -> Result<Identity, AuthError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| network_failure(method, "unreachable", e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let code = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|env| env.error.message)
                .unwrap_or_else(|_| format!("HTTP_{}", status.as_u16()));
            debug!(method, status = status.as_u16(), code = %code, "Identity Toolkit error");
            return Err(map_error_code(&code));
        }

        let parsed: AuthResponse = resp
            .json()
            .await
            .map_err(|e| network_failure(method, "invalid response", e))?;

        Ok(Identity {
            uid: parsed.local_id,
            email: parsed
                .email
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| fallback_email.to_string()),
            display_name: parsed.display_name.filter(|n| !n.is_empty()),
        })
    }
}

/// Request URLs carry the API key, so reqwest errors are stripped of them
/// before they are logged or surfaced.
fn network_failure(method: &str, what: &str, e: reqwest::Error) -> AuthError {
    let e = e.without_url();
    warn!(method, error = %e, "Identity Toolkit {what}");
    AuthError::Network(format!("Identity Toolkit {what}: {e}"))
}

/// Map an Identity Toolkit error message to an [`AuthError`].
///
/// Messages look like `EMAIL_EXISTS` or `WEAK_PASSWORD : Password should be
/// at least 6 characters`.
fn map_error_code(message: &str) -> AuthError {
    let (code, detail) = match message.split_once(" : ") {
        Some((code, detail)) => (code.trim(), detail.trim()),
        None => (message.trim(), ""),
    };
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED" => {
            AuthError::InvalidCredentials
        }
        "EMAIL_EXISTS" => AuthError::AccountExists,
        "INVALID_EMAIL" | "MISSING_EMAIL" => AuthError::InvalidEmail,
        "WEAK_PASSWORD" | "MISSING_PASSWORD" => AuthError::WeakPassword(if detail.is_empty() {
            "Password should be at least 6 characters".to_string()
        } else {
            detail.to_string()
        }),
        other => AuthError::Provider {
            code: other.to_string(),
        },
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    fn name(&self) -> &str {
        "firebase"
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Identity, AuthError> {
        let body = serde_json::json!({
            "email": email,
            "password": password.expose_secret(),
            "returnSecureToken": true,
        });
        self.call("signInWithPassword", body, email).await
    }

    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Identity, AuthError> {
        let body = serde_json::json!({
            "email": email,
            "password": password.expose_secret(),
            "returnSecureToken": true,
        });
        self.call("signUp", body, email).await
    }

    async fn sign_in_with_federated(
        &self,
        credential: &FederatedCredential,
    ) -> Result<Identity, AuthError> {
        if credential.id_token.trim().is_empty() {
            return Err(AuthError::ProviderCancelled);
        }
        let post_body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("id_token", &credential.id_token)
            .append_pair("providerId", &credential.provider_id)
            .finish();
        let body = serde_json::json!({
            "postBody": post_body,
            "requestUri": self.request_uri,
            "returnIdpCredential": true,
            "returnSecureToken": true,
        });
        self.call("signInWithIdp", body, "").await
    }

    async fn sign_out(&self, identity: &Identity) -> Result<(), AuthError> {
        // Firebase tokens are held client-side; there is nothing to revoke.
        debug!(uid = %identity.uid, "Firebase sign-out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;
    use crate::notification::Notification;

    /// Minimal stand-in for the Identity Toolkit endpoints.
    async fn fake_toolkit(
        Path(method): Path<String>,
        Json(body): Json<serde_json::Value>,
    ) -> axum::response::Response {
        let error = |message: &str| {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": {"code": 400, "message": message}})),
            )
                .into_response()
        };
        match method.as_str() {
            "accounts:signInWithPassword" => {
                if body["password"] == "correct-horse" {
                    Json(serde_json::json!({
                        "localId": "fb-uid-1",
                        "email": body["email"],
                        "displayName": "Ada Lovelace",
                        "idToken": "tok",
                        "registered": true,
                    }))
                    .into_response()
                } else {
                    error("INVALID_LOGIN_CREDENTIALS")
                }
            }
            "accounts:signUp" => {
                if body["email"] == "taken@example.com" {
                    error("EMAIL_EXISTS")
                } else if body["password"].as_str().map(str::len).unwrap_or(0) < 6 {
                    error("WEAK_PASSWORD : Password should be at least 6 characters")
                } else {
                    Json(serde_json::json!({"localId": "fb-uid-2", "email": body["email"]}))
                        .into_response()
                }
            }
            "accounts:signInWithIdp" => {
                let post_body = body["postBody"].as_str().unwrap_or_default();
                let pairs: Vec<(String, String)> =
                    url::form_urlencoded::parse(post_body.as_bytes())
                        .into_owned()
                        .collect();
                let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
                if keys != ["id_token", "providerId"] {
                    return error("INVALID_IDP_RESPONSE");
                }
                // Echo the decoded provider so callers can see what arrived.
                Json(serde_json::json!({
                    "localId": "fb-uid-3",
                    "email": "grace@example.com",
                    "displayName": pairs[1].1,
                }))
                .into_response()
            }
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn start_fake() -> FirebaseIdentity {
        let app = Router::new().route("/v1/{method}", post(fake_toolkit));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        FirebaseIdentity::new(SecretString::from("test-key"), "http://localhost")
            .with_base_url(format!("http://127.0.0.1:{port}/v1/"))
    }

    #[test]
    fn error_codes_map_to_auth_errors() {
        assert_eq!(map_error_code("EMAIL_NOT_FOUND"), AuthError::InvalidCredentials);
        assert_eq!(map_error_code("INVALID_PASSWORD"), AuthError::InvalidCredentials);
        assert_eq!(map_error_code("EMAIL_EXISTS"), AuthError::AccountExists);
        assert_eq!(map_error_code("INVALID_EMAIL"), AuthError::InvalidEmail);
        assert_eq!(
            map_error_code("WEAK_PASSWORD : Password should be at least 6 characters"),
            AuthError::WeakPassword("Password should be at least 6 characters".into())
        );
        assert_eq!(
            map_error_code("TOO_MANY_ATTEMPTS_TRY_LATER"),
            AuthError::Provider {
                code: "TOO_MANY_ATTEMPTS_TRY_LATER".into()
            }
        );
    }

    #[test]
    fn api_url_includes_method_and_key() {
        let fb = FirebaseIdentity::new(SecretString::from("k123"), "http://localhost");
        assert_eq!(
            fb.api_url("signUp"),
            "https://identitytoolkit.googleapis.com/v1/accounts:signUp?key=k123"
        );
    }

    #[tokio::test]
    async fn password_sign_in_round_trip() {
        let fb = start_fake().await;
        let identity = fb
            .sign_in_with_password("ada@example.com", &SecretString::from("correct-horse"))
            .await
            .unwrap();
        assert_eq!(identity.uid, "fb-uid-1");
        assert_eq!(identity.email, "ada@example.com");
        assert_eq!(identity.display_name.as_deref(), Some("Ada Lovelace"));

        let err = fb
            .sign_in_with_password("ada@example.com", &SecretString::from("wrong"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn sign_up_errors_are_mapped() {
        let fb = start_fake().await;
        let err = fb
            .sign_up_with_password("taken@example.com", &SecretString::from("long-enough"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::AccountExists);

        let err = fb
            .sign_up_with_password("new@example.com", &SecretString::from("abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::WeakPassword(_)));

        let identity = fb
            .sign_up_with_password("new@example.com", &SecretString::from("long-enough"))
            .await
            .unwrap();
        assert_eq!(identity.uid, "fb-uid-2");
        assert!(identity.display_name.is_none());
    }

    #[tokio::test]
    async fn federated_sign_in() {
        let fb = start_fake().await;
        let identity = fb
            .sign_in_with_federated(&FederatedCredential {
                provider_id: "google.com".into(),
                id_token: "google-id-token".into(),
            })
            .await
            .unwrap();
        assert_eq!(identity.email, "grace@example.com");
        assert_eq!(identity.display_name.as_deref(), Some("google.com"));
    }

    #[tokio::test]
    async fn federated_post_body_is_form_encoded() {
        let fb = start_fake().await;
        let identity = fb
            .sign_in_with_federated(&FederatedCredential {
                provider_id: "google.com&evil=1".into(),
                id_token: "a+b=c&d".into(),
            })
            .await
            .unwrap();
        assert_eq!(identity.display_name.as_deref(), Some("google.com&evil=1"));
    }

    #[tokio::test]
    async fn empty_federated_token_is_cancelled() {
        let fb = FirebaseIdentity::new(SecretString::from("k"), "http://localhost");
        let err = fb
            .sign_in_with_federated(&FederatedCredential {
                provider_id: "google.com".into(),
                id_token: "  ".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::ProviderCancelled);
    }

    #[tokio::test]
    async fn unreachable_provider_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let fb = FirebaseIdentity::new(SecretString::from("SUPER-SECRET-KEY"), "http://localhost")
            .with_base_url(format!("http://127.0.0.1:{port}/v1"));
        let err = fb
            .sign_in_with_password("ada@example.com", &SecretString::from("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Network(_)));

        let notice = Notification::from(&err);
        assert!(!notice.description.contains("SUPER-SECRET-KEY"));
        assert!(!err.to_string().contains("SUPER-SECRET-KEY"));
        assert!(!format!("{err:?}").contains("key="));
    }

    #[tokio::test]
    async fn malformed_success_body_hides_api_key() {
        let app = Router::new().route(
            "/v1/{method}",
            post(|| async { (StatusCode::OK, "not json") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let fb = FirebaseIdentity::new(SecretString::from("SUPER-SECRET-KEY"), "http://localhost")
            .with_base_url(format!("http://127.0.0.1:{port}/v1"));
        let err = fb
            .sign_up_with_password("ada@example.com", &SecretString::from("long-enough"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Network(_)));
        assert!(!err.to_string().contains("SUPER-SECRET-KEY"));
    }
}
