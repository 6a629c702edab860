//! In-process [`DataStore`] backed by hash maps.
//!
//! Serves single-node deployments and the test suite. Every method takes the
//! lock for the duration of one call, which gives per-call atomicity and
//! last-write-wins semantics for concurrent pipeline updates.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{DataStore, StoreError, StoreResult};
use crate::models::pipeline::{new_pipeline_id, Pipeline};
use crate::models::project::{Integration, Project, QueryParams};
use crate::models::record::{PipelineRecord, Status};

#[derive(Debug, Default)]
struct Tables {
    projects: HashMap<String, Project>,
    pipelines: HashMap<String, Pipeline>,
    records: HashMap<String, PipelineRecord>,
    integrations: HashMap<String, Integration>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    /// Record an execution. Records are written by the runner, not the manager.
    pub fn insert_record(&self, record: PipelineRecord) -> StoreResult<()> {
        self.write()?.records.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn insert_integration(&self, integration: Integration) -> StoreResult<()> {
        self.write()?
            .integrations
            .insert(integration.name.clone(), integration);
        Ok(())
    }

    pub fn record_count(&self, pipeline_id: &str) -> StoreResult<usize> {
        Ok(self
            .read()?
            .records
            .values()
            .filter(|r| r.pipeline_id == pipeline_id)
            .count())
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn create_project(&self, mut project: Project) -> StoreResult<Project> {
        let mut tables = self.write()?;
        if tables.projects.values().any(|p| p.name == project.name) {
            return Err(StoreError::Conflict(format!("project {}", project.name)));
        }
        if project.id.is_empty() {
            project.id = uuid::Uuid::new_v4().simple().to_string();
        }
        project.created_time.get_or_insert_with(Utc::now);
        tables.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn find_project_by_name(&self, name: &str) -> StoreResult<Project> {
        self.read()?
            .projects
            .values()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("project {name}")))
    }

    async fn create_pipeline(&self, mut pipeline: Pipeline) -> StoreResult<Pipeline> {
        let mut tables = self.write()?;
        let id = pipeline.id.get_or_insert_with(new_pipeline_id).clone();
        let duplicate = tables.pipelines.contains_key(&id)
            || tables
                .pipelines
                .values()
                .any(|p| p.project_id == pipeline.project_id && p.name == pipeline.name);
        if duplicate {
            return Err(StoreError::Conflict(format!("pipeline {}", pipeline.name)));
        }
        pipeline = pipeline.without_recent_records();
        tables.pipelines.insert(id, pipeline.clone());
        Ok(pipeline)
    }

    async fn find_pipeline_by_name(&self, project_id: &str, name: &str) -> StoreResult<Pipeline> {
        self.read()?
            .pipelines
            .values()
            .find(|p| p.project_id == project_id && p.name == name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("pipeline {name}")))
    }

    async fn find_pipeline_by_id(&self, id: &str) -> StoreResult<Pipeline> {
        self.read()?
            .pipelines
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("pipeline with id {id}")))
    }

    async fn find_pipelines_by_project_id(
        &self,
        project_id: &str,
        query: &QueryParams,
    ) -> StoreResult<(Vec<Pipeline>, usize)> {
        let tables = self.read()?;
        let filter = query.filter.as_deref().unwrap_or("");
        let mut matched: Vec<&Pipeline> = tables
            .pipelines
            .values()
            .filter(|p| p.project_id == project_id)
            .filter(|p| filter.is_empty() || p.name.contains(filter) || p.alias.contains(filter))
            .collect();
        matched.sort_by(|a, b| b.created_time.cmp(&a.created_time).then(a.name.cmp(&b.name)));

        let total = matched.len();
        let limit = if query.limit == 0 { total } else { query.limit };
        let page = matched
            .into_iter()
            .skip(query.start)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn find_svn_hooks_pipelines(&self, repo_id: &str) -> StoreResult<Vec<Pipeline>> {
        let tables = self.read()?;
        let pipelines: Vec<Pipeline> = tables
            .pipelines
            .values()
            .filter(|p| {
                p.scm_trigger()
                    .and_then(|t| t.post_commit.as_ref())
                    .and_then(|pc| pc.repo_info.as_ref())
                    .is_some_and(|info| info.id == repo_id)
            })
            .cloned()
            .collect();
        if pipelines.is_empty() {
            return Err(StoreError::NotFound(format!("pipelines for svn repo {repo_id}")));
        }
        Ok(pipelines)
    }

    async fn update_pipeline(&self, pipeline: &Pipeline) -> StoreResult<()> {
        let id = pipeline
            .id
            .as_deref()
            .ok_or_else(|| StoreError::NotFound(format!("pipeline {}", pipeline.name)))?;
        let mut tables = self.write()?;
        let stored = tables
            .pipelines
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("pipeline with id {id}")))?;
        *stored = pipeline.clone().without_recent_records();
        Ok(())
    }

    async fn delete_pipeline_by_id(&self, id: &str) -> StoreResult<()> {
        self.write()?
            .pipelines
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("pipeline with id {id}")))
    }

    async fn find_recent_records_by_pipeline_id(
        &self,
        pipeline_id: &str,
        status: Option<Status>,
        limit: usize,
    ) -> StoreResult<Vec<PipelineRecord>> {
        let tables = self.read()?;
        let mut records: Vec<PipelineRecord> = tables
            .records
            .values()
            .filter(|r| r.pipeline_id == pipeline_id)
            .filter(|r| match status {
                Some(s) => r.status == s,
                None => true,
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        records.truncate(limit);
        Ok(records)
    }

    async fn find_pipeline_records_by_start_time(
        &self,
        pipeline_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<PipelineRecord>> {
        let tables = self.read()?;
        let mut records: Vec<PipelineRecord> = tables
            .records
            .values()
            .filter(|r| r.pipeline_id == pipeline_id && r.start_time >= start && r.start_time < end)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(records)
    }

    async fn delete_pipeline_records_by_pipeline_id(&self, pipeline_id: &str) -> StoreResult<()> {
        self.write()?
            .records
            .retain(|_, r| r.pipeline_id != pipeline_id);
        Ok(())
    }

    async fn get_integration(&self, name: &str) -> StoreResult<Integration> {
        self.read()?
            .integrations
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("integration {name}")))
    }
}
