//! Client-facing services shared by every Stride front end.

mod tracker;

pub use tracker::Tracker;
