//! stride-core - Core library for Stride
//!
//! This crate contains the entity models, the local libSQL store, and the
//! offline-first sync engine (change queue, transport, merge, conflict
//! resolution, polling) shared by the CLI and any other Stride client.

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::SyncSettings;
pub use error::{Error, Result};
pub use models::{
    EntityKind, Goal, GlobalGoal, Habit, LocalOperation, Milestone, ReviewState, SyncConflict,
    SyncEntity, SyncMetadata,
};
pub use services::Tracker;
pub use state::SyncState;
