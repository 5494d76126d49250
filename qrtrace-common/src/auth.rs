//! Explicit authentication session
//!
//! The backend issues a bearer token at login. Instead of keeping token and
//! user in ambient storage, callers hold an [`AuthSession`] and pass it to
//! every backend call that needs credentials. Logout invalidates the value;
//! an invalidated session never yields a token again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Dashboard user as returned by login / profile endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// farmer, manufacturer, lab, distributor, admin, ...
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Credentials for one logged-in user, created at login
#[derive(Clone)]
pub struct AuthSession {
    token: String,
    user: UserProfile,
    created_at: DateTime<Utc>,
    invalidated_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    pub fn new(token: impl Into<String>, user: UserProfile) -> Self {
        Self {
            token: token.into(),
            user,
            created_at: Utc::now(),
            invalidated_at: None,
        }
    }

    /// Session from a token obtained elsewhere (CLI flag, environment)
    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(token, UserProfile::default())
    }

    /// Bearer token, or `None` once invalidated or if blank
    pub fn bearer_token(&self) -> Option<&str> {
        if self.is_active() {
            Some(self.token.as_str())
        } else {
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.invalidated_at.is_none() && !self.token.trim().is_empty()
    }

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    /// Replace the cached profile after a profile refresh
    pub fn set_user(&mut self, user: UserProfile) {
        self.user = user;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Logout; idempotent
    pub fn invalidate(&mut self) {
        if self.invalidated_at.is_none() {
            self.invalidated_at = Some(Utc::now());
        }
    }
}

// Keeps the token out of logs
impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("user", &self.user.email)
            .field("role", &self.user.role)
            .field("created_at", &self.created_at)
            .field("active", &self.is_active())
            .finish()
    }
}
