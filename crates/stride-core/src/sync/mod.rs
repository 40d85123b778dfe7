//! Offline-first synchronization core.
//!
//! Local mutations land in a deduplicating [`ChangeQueue`]; the
//! [`SyncService`] drains it through a [`SyncTransport`], merges server
//! snapshots with [`merge`], and routes conflicts to the user through
//! [`ConflictResolver`]. [`spawn_polling`] drives periodic rounds.

mod conflicts;
mod engine;
mod events;
mod lifecycle;
pub mod merge;
mod protocol;
mod queue;
#[cfg(test)]
pub(crate) mod testing;
mod transport;

pub use conflicts::ConflictResolver;
pub use engine::{BlockReason, SyncOutcome, SyncReport, SyncService, SyncTrigger};
pub use events::SyncEvent;
pub use lifecycle::{spawn_polling, Backoff, PollingHandle};
pub use protocol::{QueueEntry, SyncChanges, SyncMeta, SyncRequest, SyncResponse};
pub use queue::{ChangeQueue, QueueChange};
pub use transport::{HttpSyncTransport, SyncTransport, TransportError};
