//! Shared HTTP plumbing for backend clients

use std::time::Duration;

use serde_json::Value;

const USER_AGENT: &str = concat!("qrtrace-scan/", env!("CARGO_PKG_VERSION"));

/// Build the reqwest client used for backend calls
pub fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// Join a base URL and a path without doubling or dropping the slash
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Human-readable message from an error response body
///
/// The backend answers errors with `{"message": ..}` or `{"error": ..}`;
/// anything else is returned as trimmed text.
pub fn error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error"] {
            match map.get(key) {
                Some(Value::String(msg)) if !msg.trim().is_empty() => return msg.trim().to_string(),
                Some(Value::Object(inner)) => {
                    if let Some(msg) = inner.get("message").and_then(Value::as_str) {
                        return msg.trim().to_string();
                    }
                }
                _ => {}
            }
        }
    }
    body.trim().to_string()
}
