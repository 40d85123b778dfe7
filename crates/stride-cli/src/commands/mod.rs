pub mod common;
pub mod config;
pub mod conflicts;
pub mod export;
pub mod goal;
pub mod habit;
pub mod milestone;
pub mod plan;
pub mod review;
pub mod sync;
