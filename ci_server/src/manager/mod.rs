//! Pipeline lifecycle management.
//!
//! [`PipelineManager`] is the surface the HTTP layer talks to. The concrete
//! [`PipelineService`] keeps each pipeline's SCM webhook in step with its
//! stored trigger configuration and computes execution statistics.

pub mod pipeline;
pub mod stats;
pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::pipeline::Pipeline;
use crate::models::project::QueryParams;
use crate::models::stats::PipelineStatusStats;

pub use pipeline::PipelineService;
pub use webhook::WebhookCoordinator;

/// How many recent execution records to attach to each returned pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecentCounts {
    pub recent: usize,
    pub recent_success: usize,
    pub recent_failed: usize,
}

impl RecentCounts {
    pub fn is_empty(&self) -> bool {
        self.recent == 0 && self.recent_success == 0 && self.recent_failed == 0
    }
}

#[async_trait]
pub trait PipelineManager: Send + Sync {
    async fn create_pipeline(&self, project: &str, pipeline: Pipeline) -> Result<Pipeline>;

    async fn get_pipeline(&self, project: &str, name: &str, counts: RecentCounts)
        -> Result<Pipeline>;

    async fn get_pipeline_by_id(&self, id: &str) -> Result<Pipeline>;

    /// One page of the project's pipelines and the total before pagination.
    async fn list_pipelines(
        &self,
        project: &str,
        query: &QueryParams,
        counts: RecentCounts,
    ) -> Result<(Vec<Pipeline>, usize)>;

    async fn update_pipeline(&self, project: &str, name: &str, pipeline: Pipeline)
        -> Result<Pipeline>;

    async fn delete_pipeline(&self, project: &str, name: &str) -> Result<()>;

    async fn clear_pipelines_of_project(&self, project: &str) -> Result<()>;

    async fn get_statistics(
        &self,
        project: &str,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PipelineStatusStats>;

    async fn find_svn_hooks_pipelines(&self, repo_id: &str) -> Result<Vec<Pipeline>>;
}
