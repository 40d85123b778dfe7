//! Data models for Stride

mod conflict;
mod global_goal;
mod goal;
mod habit;
mod milestone;
mod review;
mod sync_meta;

pub use conflict::{Resolution, SyncConflict};
pub use global_goal::{GlobalGoal, GlobalGoalStatus};
pub use goal::Goal;
pub use habit::{Habit, HabitFrequency};
pub use milestone::Milestone;
pub use review::ReviewState;
pub use sync_meta::{EntityKind, LocalOperation, SyncEntity, SyncMetadata};
