//! Persistence seam for projects, pipelines, execution records and integrations.
//!
//! The manager only depends on the [`DataStore`] trait. A lookup that finds
//! nothing must return [`StoreError::NotFound`] so callers can tell absence
//! apart from backend failures.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::pipeline::Pipeline;
use crate::models::project::{Integration, Project, QueryParams};
use crate::models::record::{PipelineRecord, Status};

pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found in store")]
    NotFound(String),

    #[error("{0} already stored")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn create_project(&self, project: Project) -> StoreResult<Project>;

    async fn find_project_by_name(&self, name: &str) -> StoreResult<Project>;

    /// Insert a pipeline, assigning an id when it has none.
    async fn create_pipeline(&self, pipeline: Pipeline) -> StoreResult<Pipeline>;

    async fn find_pipeline_by_name(&self, project_id: &str, name: &str) -> StoreResult<Pipeline>;

    async fn find_pipeline_by_id(&self, id: &str) -> StoreResult<Pipeline>;

    /// One page of a project's pipelines plus the total before pagination.
    async fn find_pipelines_by_project_id(
        &self,
        project_id: &str,
        query: &QueryParams,
    ) -> StoreResult<(Vec<Pipeline>, usize)>;

    /// Pipelines whose SVN post-commit trigger points at the given repository id.
    async fn find_svn_hooks_pipelines(&self, repo_id: &str) -> StoreResult<Vec<Pipeline>>;

    async fn update_pipeline(&self, pipeline: &Pipeline) -> StoreResult<()>;

    async fn delete_pipeline_by_id(&self, id: &str) -> StoreResult<()>;

    /// Newest-first records of a pipeline, optionally restricted to one status.
    async fn find_recent_records_by_pipeline_id(
        &self,
        pipeline_id: &str,
        status: Option<Status>,
        limit: usize,
    ) -> StoreResult<Vec<PipelineRecord>>;

    /// Records with `start <= start_time < end`.
    async fn find_pipeline_records_by_start_time(
        &self,
        pipeline_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<PipelineRecord>>;

    async fn delete_pipeline_records_by_pipeline_id(&self, pipeline_id: &str) -> StoreResult<()>;

    async fn get_integration(&self, name: &str) -> StoreResult<Integration>;
}
