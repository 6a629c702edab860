//! The pipeline lifecycle service.
//!
//! Primary mutations (store writes, webhook registration on create/update)
//! abort the operation on failure. Secondary cleanups (log directories,
//! webhook and quality-gate teardown on delete) are logged and skipped.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;

use super::stats;
use super::webhook::WebhookCoordinator;
use super::{PipelineManager, RecentCounts};
use crate::config::ManagerConfig;
use crate::error::{ManagerError, Result};
use crate::metrics;
use crate::models::pipeline::Pipeline;
use crate::models::project::{Project, QueryParams};
use crate::models::record::Status;
use crate::models::stats::PipelineStatusStats;
use crate::quality_gate::{QualityGate, QualityGateError};
use crate::scm::ScmProviderFactory;
use crate::slug::slugify;
use crate::store::{DataStore, StoreError};

/// Map a store miss to `ContentNotFound(what)`, passing other failures through.
fn not_found(err: StoreError, what: impl Into<String>) -> ManagerError {
    match err {
        StoreError::NotFound(_) => ManagerError::ContentNotFound(what.into()),
        other => ManagerError::Store(other),
    }
}

fn repo_url(pipeline: &Pipeline) -> Option<String> {
    pipeline.main_repo().map(|repo| repo.url.clone())
}

fn stored_id(pipeline: &Pipeline) -> Result<String> {
    pipeline
        .id
        .clone()
        .ok_or_else(|| ManagerError::ContentNotFound(format!("id of pipeline {}", pipeline.name)))
}

pub struct PipelineService {
    store: Arc<dyn DataStore>,
    providers: Arc<dyn ScmProviderFactory>,
    quality_gate: Arc<dyn QualityGate>,
    webhooks: WebhookCoordinator,
    log_home: PathBuf,
    list_concurrency: usize,
}

impl PipelineService {
    pub fn new(
        config: &ManagerConfig,
        store: Arc<dyn DataStore>,
        providers: Arc<dyn ScmProviderFactory>,
        quality_gate: Arc<dyn QualityGate>,
    ) -> Self {
        Self {
            store,
            providers,
            quality_gate,
            webhooks: WebhookCoordinator::new(config.callback_url.clone()),
            log_home: config.log_home.clone(),
            list_concurrency: config.list_concurrency.max(1),
        }
    }

    async fn find_project(&self, name: &str) -> Result<Project> {
        self.store
            .find_project_by_name(name)
            .await
            .map_err(|e| not_found(e, format!("project {name}")))
    }

    async fn find_pipeline(&self, project: &Project, name: &str) -> Result<Pipeline> {
        self.store
            .find_pipeline_by_name(&project.id, name)
            .await
            .map_err(|e| not_found(e, format!("pipeline {name}")))
    }

    /// Pick the stored name for a new pipeline, checking for collisions.
    async fn resolve_name(&self, project: &Project, pipeline: &mut Pipeline) -> Result<()> {
        let derived = pipeline.name.is_empty();
        if derived {
            pipeline.name = slugify(&pipeline.alias, false, None);
            if pipeline.name.is_empty() {
                // nothing usable survives transliteration
                pipeline.name = slugify(&pipeline.alias, true, None);
            }
        }

        match self.store.find_pipeline_by_name(&project.id, &pipeline.name).await {
            Ok(existing) => {
                tracing::warn!(
                    pipeline = %pipeline.name,
                    alias = %pipeline.alias,
                    existing_alias = %existing.alias,
                    "Pipeline name conflict"
                );
                if !derived {
                    return Err(ManagerError::AlreadyExists(format!(
                        "pipeline {}",
                        pipeline.name
                    )));
                }
                pipeline.name = slugify(&pipeline.name, true, None);
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Attach up to `counts` newest records. Failures leave the field empty.
    async fn assign_recent_records(&self, pipeline: &mut Pipeline, counts: RecentCounts) {
        let Some(id) = pipeline.id.clone() else {
            return;
        };

        let queries = [
            (counts.recent, None),
            (counts.recent_success, Some(Status::Success)),
            (counts.recent_failed, Some(Status::Failed)),
        ];
        for (limit, status) in queries {
            if limit == 0 {
                continue;
            }
            match self
                .store
                .find_recent_records_by_pipeline_id(&id, status, limit)
                .await
            {
                Ok(records) => match status {
                    None => pipeline.recent_records = records,
                    Some(Status::Success) => pipeline.recent_success_records = records,
                    Some(_) => pipeline.recent_failed_records = records,
                },
                Err(e) => {
                    tracing::error!(pipeline = %pipeline.name, ?status, error = %e, "Failed to load recent records");
                }
            }
        }
    }

    /// Register the pipeline with its SonarQube project and select the quality gate.
    async fn set_quality_gate(&self, pipeline: &Pipeline) -> Result<()> {
        let Some(sonar) = pipeline.sonar_qube() else {
            return Ok(());
        };
        let gate_id = pipeline.quality_gate_threshold();
        let project_key = stored_id(pipeline)?;
        let integration = self
            .store
            .get_integration(&sonar.name)
            .await
            .map_err(|e| not_found(e, format!("integration {}", sonar.name)))?;
        let server = integration
            .sonar_qube
            .ok_or_else(|| QualityGateError::MissingServer(sonar.name.clone()))?;

        match self
            .quality_gate
            .create_project(&server.address, &server.token, &project_key, &pipeline.alias)
            .await
        {
            Ok(()) => {}
            Err(QualityGateError::AlreadyExists(_)) => {
                tracing::info!(pipeline = %pipeline.name, key = %project_key, "SonarQube project already exists");
            }
            Err(e) => {
                tracing::error!(pipeline = %pipeline.name, error = %e, "Failed to create SonarQube project");
                return Err(e.into());
            }
        }

        self.quality_gate
            .set_quality_gate(&server.address, &server.token, &project_key, gate_id)
            .await
            .inspect_err(|e| {
                tracing::error!(pipeline = %pipeline.name, gate_id, error = %e, "Failed to set quality gate");
            })?;
        Ok(())
    }

    async fn delete_quality_gate(&self, pipeline: &Pipeline, project_key: &str) {
        let Some(sonar) = pipeline.sonar_qube() else {
            return;
        };
        let server = match self.store.get_integration(&sonar.name).await {
            Ok(integration) => integration.sonar_qube,
            Err(e) => {
                tracing::warn!(pipeline = %pipeline.name, integration = %sonar.name, error = %e, "Cannot load SonarQube integration");
                return;
            }
        };
        let Some(server) = server else {
            tracing::warn!(pipeline = %pipeline.name, integration = %sonar.name, "SonarQube integration is empty");
            return;
        };
        if let Err(e) = self
            .quality_gate
            .delete_project(&server.address, &server.token, project_key)
            .await
        {
            tracing::warn!(pipeline = %pipeline.name, error = %e, "Failed to delete SonarQube project");
        }
    }

    /// Remove `{log_home}/{project_id}/{pipeline_id}`. A missing directory is fine.
    async fn remove_logs(&self, project_id: &str, pipeline_id: &str) {
        let dir = self.log_home.join(project_id).join(pipeline_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::debug!(path = %dir.display(), "Removed pipeline logs"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to remove pipeline logs");
            }
        }
    }

    async fn delete_one(&self, project: &Project, pipeline: &Pipeline) -> Result<()> {
        let id = stored_id(pipeline)?;

        self.store
            .delete_pipeline_records_by_pipeline_id(&id)
            .await
            .inspect_err(|e| {
                tracing::error!(pipeline = %pipeline.name, error = %e, "Failed to delete pipeline records");
            })?;
        self.remove_logs(&project.id, &id).await;
        self.store
            .delete_pipeline_by_id(&id)
            .await
            .map_err(|e| not_found(e, format!("pipeline {}", pipeline.name)))?;
        metrics::pipeline_changed("deleted");
        tracing::info!(project = %project.name, pipeline = %pipeline.name, "Deleted pipeline");

        if pipeline.webhook().is_some() {
            match self.providers.provider(&project.scm) {
                Ok(provider) => {
                    let repo = repo_url(pipeline);
                    if let Err(e) = self
                        .webhooks
                        .teardown(pipeline, provider.as_ref(), repo.as_deref())
                        .await
                    {
                        tracing::warn!(pipeline = %pipeline.name, error = %e, "Failed to delete webhook");
                    }
                }
                Err(e) => {
                    tracing::warn!(pipeline = %pipeline.name, scm = %project.scm.scm_type, error = %e, "No SCM provider for webhook cleanup");
                }
            }
        }

        self.delete_quality_gate(pipeline, &id).await;
        Ok(())
    }
}

#[async_trait]
impl PipelineManager for PipelineService {
    async fn create_pipeline(&self, project_name: &str, mut pipeline: Pipeline) -> Result<Pipeline> {
        // Identity, ownership and registration state are server-assigned.
        pipeline.id = None;
        if let Some(trigger) = pipeline.scm_trigger_mut() {
            trigger.webhook = None;
        }
        if pipeline.name.is_empty() && pipeline.alias.is_empty() {
            return Err(ManagerError::validation(
                "name",
                "pipeline name and alias can not both be empty",
            ));
        }

        let project = self.find_project(project_name).await?;
        self.resolve_name(&project, &mut pipeline).await?;
        pipeline.project_id = project.id.clone();

        let provider = self.providers.provider(&project.scm)?;
        let repo = repo_url(&pipeline);
        self.webhooks
            .reconcile(
                &mut pipeline,
                provider.as_ref(),
                project.scm.scm_type,
                repo.as_deref(),
                None,
            )
            .await?;

        let persisted = async {
            if pipeline.quality_gate_threshold() > 0 {
                pipeline.ensure_id();
                self.set_quality_gate(&pipeline).await?;
            }
            pipeline.created_time = Some(Utc::now());
            self.store
                .create_pipeline(pipeline.clone())
                .await
                .map_err(|e| match e {
                    StoreError::Conflict(what) => ManagerError::AlreadyExists(what),
                    other => ManagerError::Store(other),
                })
        }
        .await;

        match persisted {
            Ok(created) => {
                metrics::pipeline_changed("created");
                tracing::info!(project = %project.name, pipeline = %created.name, "Created pipeline");
                Ok(created)
            }
            Err(err) => {
                if let Err(e) = self
                    .webhooks
                    .teardown(&pipeline, provider.as_ref(), repo.as_deref())
                    .await
                {
                    tracing::error!(pipeline = %pipeline.name, error = %e, "Failed to delete webhook of unsaved pipeline");
                }
                Err(err)
            }
        }
    }

    async fn get_pipeline(
        &self,
        project_name: &str,
        name: &str,
        counts: RecentCounts,
    ) -> Result<Pipeline> {
        let project = self.find_project(project_name).await?;
        let mut pipeline = self.find_pipeline(&project, name).await?;
        if !counts.is_empty() {
            self.assign_recent_records(&mut pipeline, counts).await;
        }
        Ok(pipeline)
    }

    async fn get_pipeline_by_id(&self, id: &str) -> Result<Pipeline> {
        self.store
            .find_pipeline_by_id(id)
            .await
            .map_err(|e| not_found(e, format!("pipeline with id {id}")))
    }

    async fn list_pipelines(
        &self,
        project_name: &str,
        query: &QueryParams,
        counts: RecentCounts,
    ) -> Result<(Vec<Pipeline>, usize)> {
        let project = self.find_project(project_name).await?;
        let (mut pipelines, total) = self
            .store
            .find_pipelines_by_project_id(&project.id, query)
            .await?;

        if !counts.is_empty() {
            futures::stream::iter(pipelines.iter_mut())
                .for_each_concurrent(self.list_concurrency, |pipeline| {
                    self.assign_recent_records(pipeline, counts)
                })
                .await;
        }
        Ok((pipelines, total))
    }

    async fn update_pipeline(
        &self,
        project_name: &str,
        name: &str,
        mut update: Pipeline,
    ) -> Result<Pipeline> {
        let project = self.find_project(project_name).await?;
        let current = self.find_pipeline(&project, name).await?;
        let id = stored_id(&current)?;
        let provider = self.providers.provider(&project.scm)?;

        update.name = current.name.clone();
        if let Some(trigger) = update.scm_trigger_mut() {
            trigger.webhook = None;
        }
        let old_repo = repo_url(&current);
        let new_repo = repo_url(&update).or_else(|| old_repo.clone());

        // Quality gate before the webhook swap: a gate failure must leave the stored trigger registered.
        let threshold = update.quality_gate_threshold();
        if update.build.is_some() && threshold > 0 && threshold != current.quality_gate_threshold() {
            update.id = Some(id.clone());
            self.set_quality_gate(&update).await?;
        }

        self.webhooks
            .replace(
                &current,
                &mut update,
                provider.as_ref(),
                project.scm.scm_type,
                old_repo.as_deref(),
                new_repo.as_deref(),
                &id,
            )
            .await?;

        let mut merged = current.clone();
        merged.alias = update.alias;
        merged.description = update.description;
        if !update.owner.is_empty() {
            merged.owner = update.owner;
        }
        if update.build.is_some() {
            merged.build = update.build;
        }
        merged.notification = update.notification;
        merged.annotations = update.annotations;
        merged.auto_trigger = update.auto_trigger;
        merged.updated_time = Some(Utc::now());

        if let Err(e) = self.store.update_pipeline(&merged).await {
            tracing::error!(pipeline = %merged.name, error = %e, "Failed to store updated pipeline");
            self.webhooks
                .revert(
                    &current,
                    &merged,
                    provider.as_ref(),
                    project.scm.scm_type,
                    old_repo.as_deref(),
                    new_repo.as_deref(),
                    &id,
                )
                .await;
            return Err(not_found(e, format!("pipeline {}", merged.name)));
        }
        metrics::pipeline_changed("updated");
        tracing::info!(project = %project.name, pipeline = %merged.name, "Updated pipeline");
        Ok(merged)
    }

    async fn delete_pipeline(&self, project_name: &str, name: &str) -> Result<()> {
        let project = self.find_project(project_name).await?;
        let pipeline = self.find_pipeline(&project, name).await?;
        self.delete_one(&project, &pipeline).await
    }

    async fn clear_pipelines_of_project(&self, project_name: &str) -> Result<()> {
        let project = self.find_project(project_name).await?;
        let (pipelines, _) = self
            .store
            .find_pipelines_by_project_id(&project.id, &QueryParams::default())
            .await?;
        for pipeline in &pipelines {
            self.delete_one(&project, pipeline).await?;
        }
        tracing::info!(project = %project.name, count = pipelines.len(), "Cleared pipelines");
        Ok(())
    }

    async fn get_statistics(
        &self,
        project_name: &str,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PipelineStatusStats> {
        let project = self.find_project(project_name).await?;
        let pipeline = self.find_pipeline(&project, name).await?;
        let id = stored_id(&pipeline)?;
        let records = self
            .store
            .find_pipeline_records_by_start_time(&id, start, end)
            .await?;
        Ok(stats::aggregate(&records, start, end))
    }

    async fn find_svn_hooks_pipelines(&self, repo_id: &str) -> Result<Vec<Pipeline>> {
        self.store
            .find_svn_hooks_pipelines(repo_id)
            .await
            .map_err(|e| not_found(e, format!("pipeline with svn repo id {repo_id}")))
    }
}
