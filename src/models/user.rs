// User data returned by the backend's who-am-I endpoint

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Authenticated user as reported by `GET /auth/user_info`.
///
/// Only `name` is guaranteed; everything else the provider sends is kept in
/// `extra` so a session round-trip loses nothing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl UserData {
    /// Convenience constructor for a user with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            avatar_url: None,
            extra: HashMap::new(),
        }
    }
}
