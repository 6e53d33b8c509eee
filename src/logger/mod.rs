//! Structured activity log: JSONL writer plus a channel-fed logger thread.

pub mod activity;
pub mod jsonl;

pub use activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
