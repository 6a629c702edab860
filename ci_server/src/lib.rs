//! Pipeline lifecycle manager for a CI service.
//!
//! Keeps each pipeline's SCM webhook consistent with its stored trigger
//! configuration, provisions SonarQube quality gates, and aggregates
//! execution records into per-day statistics.

pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod models;
pub mod quality_gate;
pub mod routes;
pub mod scm;
pub mod slug;
pub mod store;

pub use config::ManagerConfig;
pub use error::{ManagerError, Result};
pub use manager::{PipelineManager, PipelineService, RecentCounts};
