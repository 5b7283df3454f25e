// Organization data returned by the backend's org lookup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of `GET /org/fetch`.
///
/// The install flow branches on `total` alone: zero means no organization is
/// installed yet. Provider-specific fields ride along in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrgData {
    #[serde(default)]
    pub total: u64,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl OrgData {
    /// Whether an organization still needs to be installed.
    pub fn needs_install(&self) -> bool {
        self.total == 0
    }
}
