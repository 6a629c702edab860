//! HTTP API for projects, pipelines and pipeline statistics.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::{ManagerError, Result};
use crate::manager::{PipelineManager, RecentCounts};
use crate::models::pipeline::Pipeline;
use crate::models::project::{Project, QueryParams};
use crate::models::stats::PipelineStatusStats;
use crate::store::{DataStore, StoreError};

/// Shared state for route handlers.
#[derive(Clone)]
pub struct RouterState {
    pub manager: Arc<dyn PipelineManager>,
    pub store: Arc<dyn DataStore>,
}

pub fn api_router(state: RouterState) -> Router {
    Router::new()
        // Project API
        .route("/api/projects", post(create_project))
        .route("/api/projects/{project}", get(get_project))
        // Pipeline API
        .route(
            "/api/projects/{project}/pipelines",
            get(list_pipelines)
                .post(create_pipeline)
                .delete(clear_pipelines),
        )
        .route(
            "/api/projects/{project}/pipelines/{pipeline}",
            get(get_pipeline)
                .put(update_pipeline)
                .delete(delete_pipeline),
        )
        .route(
            "/api/projects/{project}/pipelines/{pipeline}/stats",
            get(get_statistics),
        )
        .route("/api/pipelines/{id}", get(get_pipeline_by_id))
        .route("/api/svnhooks/{repo_id}/pipelines", get(find_svn_hooks_pipelines))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ListMeta {
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub metadata: ListMeta,
    pub items: Vec<T>,
}

/// Recent-record counts; zero or negative means none.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentQuery {
    #[serde(default)]
    pub recent_count: i64,
    #[serde(default)]
    pub recent_success_count: i64,
    #[serde(default)]
    pub recent_failed_count: i64,
}

impl RecentQuery {
    fn counts(&self) -> RecentCounts {
        let clamp = |n: i64| usize::try_from(n).unwrap_or(0);
        RecentCounts {
            recent: clamp(self.recent_count),
            recent_success: clamp(self.recent_success_count),
            recent_failed: clamp(self.recent_failed_count),
        }
    }
}

/// Paging for the pipeline list. Recent counts come from a separate `RecentQuery`.
#[derive(Debug, Default, Deserialize)]
pub struct ListPipelinesQuery {
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub limit: usize,
    pub filter: Option<String>,
}

/// Statistics window as Unix timestamps in seconds.
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub start: i64,
    pub end: i64,
}

fn timestamp(field: &str, secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ManagerError::validation(field, "timestamp out of range"))
}

// ── Project API ──

async fn create_project(
    State(state): State<RouterState>,
    Json(project): Json<Project>,
) -> Result<(StatusCode, Json<Project>)> {
    if project.name.is_empty() {
        return Err(ManagerError::validation("name", "project name is required"));
    }
    let name = project.name.clone();
    let created = state.store.create_project(project).await.map_err(|e| match e {
        StoreError::Conflict(_) => ManagerError::AlreadyExists(format!("project {name}")),
        other => other.into(),
    })?;
    tracing::info!(project = %created.name, scm = %created.scm.scm_type, "Created project");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_project(
    State(state): State<RouterState>,
    Path(project): Path<String>,
) -> Result<Json<Project>> {
    state
        .store
        .find_project_by_name(&project)
        .await
        .map(Json)
        .map_err(|e| match e {
            StoreError::NotFound(_) => ManagerError::ContentNotFound(format!("project {project}")),
            other => other.into(),
        })
}

// ── Pipeline API ──

async fn create_pipeline(
    State(state): State<RouterState>,
    Path(project): Path<String>,
    Json(pipeline): Json<Pipeline>,
) -> Result<(StatusCode, Json<Pipeline>)> {
    let created = state.manager.create_pipeline(&project, pipeline).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_pipelines(
    State(state): State<RouterState>,
    Path(project): Path<String>,
    Query(query): Query<ListPipelinesQuery>,
    Query(recent): Query<RecentQuery>,
) -> Result<Json<ListResponse<Pipeline>>> {
    let params = QueryParams {
        start: query.start,
        limit: query.limit,
        filter: query.filter,
    };
    let (items, total) = state
        .manager
        .list_pipelines(&project, &params, recent.counts())
        .await?;
    Ok(Json(ListResponse {
        metadata: ListMeta { total },
        items,
    }))
}

async fn clear_pipelines(
    State(state): State<RouterState>,
    Path(project): Path<String>,
) -> Result<StatusCode> {
    state.manager.clear_pipelines_of_project(&project).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_pipeline(
    State(state): State<RouterState>,
    Path((project, pipeline)): Path<(String, String)>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Pipeline>> {
    state
        .manager
        .get_pipeline(&project, &pipeline, query.counts())
        .await
        .map(Json)
}

async fn update_pipeline(
    State(state): State<RouterState>,
    Path((project, pipeline)): Path<(String, String)>,
    Json(update): Json<Pipeline>,
) -> Result<Json<Pipeline>> {
    state
        .manager
        .update_pipeline(&project, &pipeline, update)
        .await
        .map(Json)
}

async fn delete_pipeline(
    State(state): State<RouterState>,
    Path((project, pipeline)): Path<(String, String)>,
) -> Result<StatusCode> {
    state.manager.delete_pipeline(&project, &pipeline).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_statistics(
    State(state): State<RouterState>,
    Path((project, pipeline)): Path<(String, String)>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<PipelineStatusStats>> {
    let start = timestamp("start", query.start)?;
    let end = timestamp("end", query.end)?;
    if start > end {
        return Err(ManagerError::validation("start", "start must not be after end"));
    }
    state
        .manager
        .get_statistics(&project, &pipeline, start, end)
        .await
        .map(Json)
}

async fn get_pipeline_by_id(
    State(state): State<RouterState>,
    Path(id): Path<String>,
) -> Result<Json<Pipeline>> {
    state.manager.get_pipeline_by_id(&id).await.map(Json)
}

async fn find_svn_hooks_pipelines(
    State(state): State<RouterState>,
    Path(repo_id): Path<String>,
) -> Result<Json<Vec<Pipeline>>> {
    state.manager.find_svn_hooks_pipelines(&repo_id).await.map(Json)
}
