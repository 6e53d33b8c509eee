//! Core types: errors, configuration, env handling, signals.

pub mod config;
pub mod env_file;
pub mod errors;
pub mod signals;
