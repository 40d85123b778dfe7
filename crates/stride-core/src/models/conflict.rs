//! Sync conflict model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::sync_meta::{EntityKind, LocalOperation};
use crate::error::Error;

/// Divergent local/server versions of one entity awaiting a user decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// Collection the entity belongs to
    pub kind: EntityKind,
    /// Entity involved in the conflict
    pub id: String,
    /// Human readable explanation from the server
    #[serde(default)]
    pub message: String,
    /// Entity as this device sent it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_version: Option<serde_json::Value>,
    /// Entity as the server holds it; absent when the server has no copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<serde_json::Value>,
    /// Operation this device attempted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_operation: Option<LocalOperation>,
}

impl SyncConflict {
    /// Key used to pair conflicts with resolution choices
    pub fn key(&self) -> (EntityKind, String) {
        (self.kind, self.id.clone())
    }
}

/// Side chosen by the user for a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Local,
    Server,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Server => f.write_str("server"),
        }
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "mine" => Ok(Self::Local),
            "server" | "theirs" | "remote" => Ok(Self::Server),
            other => Err(Error::InvalidInput(format!(
                "resolution must be 'local' or 'server', got '{other}'"
            ))),
        }
    }
}
