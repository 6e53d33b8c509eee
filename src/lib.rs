#![forbid(unsafe_code)]

//! Spot Test Orchestrator (sto): runs disruptive spot-node test suites against a
//! live Kubernetes cluster and produces one consistent report per run.
//!
//! A run is a four-phase state machine:
//! 1. **Preflight**: cluster reachability, initial snapshot, eviction monitor start
//! 2. **Execution**: Terratest, Bash and Python suites, strictly sequential
//! 3. **Remediation**: ghost scale-set instances and stuck NotReady nodes
//! 4. **Reporting**: JSON (durable), HTML and Markdown
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use spot_test_orchestrator::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use spot_test_orchestrator::core::config::Config;
//! use spot_test_orchestrator::orchestrator::RunController;
//! ```

pub mod prelude;

pub mod cluster;
pub mod core;
pub mod logger;
pub mod model;
pub mod monitor;
pub mod orchestrator;
pub mod remediation;
pub mod report;
pub mod runners;
