//! Account and login wire types.
//!
//! The backend's response envelopes are not uniform across endpoints:
//! login may return `{success, data: {token, user}}` or `{success, token}`
//! depending on the surface that endpoint was built for. Extraction is an
//! ordered list of strategies; the first one that produces a value wins.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct UserProfile {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// "patient" or "doctor"; absent for service accounts.
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Paths at which a credential may appear in a response payload, tried in
/// order.
const TOKEN_PATHS: &[&[&str]] = &[&["data", "token"], &["token"], &["data", "accessToken"]];

/// Paths at which a user profile may appear, tried in order.
const PROFILE_PATHS: &[&[&str]] = &[&["data", "user"], &["user"], &["data"]];

fn lookup<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(payload, |value, segment| value.get(segment))
}

/// Pull the bearer credential out of a login or refresh payload.
pub fn extract_token(payload: &Value) -> Option<String> {
    TOKEN_PATHS
        .iter()
        .filter_map(|path| lookup(payload, path))
        .find_map(|value| value.as_str())
        .map(str::to_string)
        .filter(|token| !token.trim().is_empty())
}

/// Pull the user profile out of a login or profile payload, if one was
/// included.
pub fn extract_profile(payload: &Value) -> Option<UserProfile> {
    PROFILE_PATHS
        .iter()
        .filter_map(|path| lookup(payload, path))
        .find_map(|value| serde_json::from_value(value.clone()).ok())
}
