//! Shared cross-platform state types.

use serde::Serialize;

/// Unified sync state published by the sync engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// No round has run yet in this process
    #[default]
    Idle,
    /// No sync server configured
    Offline,
    /// A round is in flight
    Syncing,
    /// Last round completed
    Synced,
    /// Last round failed; retried on the next trigger
    Error,
    /// Waiting for the user to resolve conflicts
    Conflicted,
}
