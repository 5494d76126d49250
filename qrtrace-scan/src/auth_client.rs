//! Backend authentication client
//!
//! Login produces an [`AuthSession`] that callers pass explicitly to anything
//! needing credentials; nothing is stored globally.

use std::time::Duration;

use qrtrace_common::{AuthSession, UserProfile};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::http::{build_client, error_message, join_url};

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const PROFILE_PATH: &str = "/api/auth/profile";

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Network error: {0}")]
    Network(String),

    /// Wrong credentials or rejected token
    #[error("Authentication rejected: {0}")]
    Rejected(String),

    #[error("Request failed ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Malformed auth response: {0}")]
    MalformedBody(String),

    /// Session was logged out or carries no token
    #[error("Session is not active; log in again")]
    InactiveSession,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    #[serde(default)]
    user: UserProfile,
}

/// Unwrap `{ "data": {...} }` envelopes
fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Client for the backend's auth endpoints
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let http = build_client(timeout).map_err(|e| AuthError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, AuthError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected(error_message(&body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        response
            .json::<Value>()
            .await
            .map(unwrap_envelope)
            .map_err(|e| AuthError::MalformedBody(e.to_string()))
    }

    /// Log in and create a session
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let url = join_url(&self.base_url, LOGIN_PATH);
        tracing::debug!(email = %email, url = %url, "Logging in");

        let response = self
            .http
            .post(&url)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let body = Self::read_json(response).await?;
        let login: LoginResponse =
            serde_json::from_value(body).map_err(|e| AuthError::MalformedBody(e.to_string()))?;
        if login.token.trim().is_empty() {
            return Err(AuthError::MalformedBody("empty token".to_string()));
        }

        tracing::info!(email = %login.user.email, role = %login.user.role, "Logged in");
        Ok(AuthSession::new(login.token, login.user))
    }

    /// Fetch the profile of the session's user
    pub async fn profile(&self, session: &AuthSession) -> Result<UserProfile, AuthError> {
        let token = session.bearer_token().ok_or(AuthError::InactiveSession)?;
        let url = join_url(&self.base_url, PROFILE_PATH);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let body = Self::read_json(response).await?;
        // Profile comes back bare or as { user: {...} }
        let user = match body {
            Value::Object(mut map) if map.get("user").is_some_and(Value::is_object) => {
                map.remove("user").unwrap_or(Value::Null)
            }
            other => other,
        };
        serde_json::from_value(user).map_err(|e| AuthError::MalformedBody(e.to_string()))
    }
}
