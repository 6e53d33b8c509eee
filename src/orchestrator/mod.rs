//! Run orchestration.

pub mod controller;

pub use controller::{Phase, RunController};
