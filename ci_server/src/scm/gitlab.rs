//! GitLab REST v4 provider.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{api_error, parse_repo_url, EventType, ScmError, ScmProvider, ScmResult, WebHook};
use crate::models::pipeline::RepoInfo;
use crate::models::project::{ScmConfig, ScmType};
use crate::models::record::Status;

const DEFAULT_SERVER: &str = "https://gitlab.com";
const PER_PAGE: usize = 100;

pub struct GitLabProvider {
    client: reqwest::Client,
    api_url: String,
    token: String,
    /// Accounts configured with a username authenticate with an OAuth bearer token.
    oauth: bool,
}

#[derive(Debug, Deserialize)]
struct ProjectHook {
    id: u64,
    url: String,
}

#[derive(Debug, Deserialize)]
struct MergeRequest {
    sha: String,
    target_branch: String,
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    path_with_namespace: String,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

impl GitLabProvider {
    pub fn new(client: reqwest::Client, config: &ScmConfig) -> ScmResult<Self> {
        let server = if config.server.is_empty() {
            DEFAULT_SERVER
        } else {
            config.server.trim_end_matches('/')
        };
        if !server.starts_with("http://") && !server.starts_with("https://") {
            return Err(ScmError::InvalidRepoUrl(format!(
                "GitLab server {server} must be an http(s) URL"
            )));
        }

        Ok(Self {
            client,
            api_url: format!("{server}/api/v4"),
            token: config.token.clone(),
            oauth: !config.username.is_empty(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.api_url, path));
        if self.oauth {
            builder.header(AUTHORIZATION, format!("Bearer {}", self.token))
        } else {
            builder.header("PRIVATE-TOKEN", &self.token)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ScmResult<T> {
        let resp = self.request(Method::GET, path).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(ScmType::Gitlab, resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> ScmResult<Vec<T>> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut items = Vec::new();
        for page in 1.. {
            let batch: Vec<T> = self
                .get_json(&format!("{path}{separator}per_page={PER_PAGE}&page={page}"))
                .await?;
            let done = batch.len() < PER_PAGE;
            items.extend(batch);
            if done {
                break;
            }
        }
        Ok(items)
    }

    async fn merge_request(&self, repo_url: &str, number: u64) -> ScmResult<MergeRequest> {
        let project = project_id(repo_url)?;
        self.get_json(&format!("/projects/{project}/merge_requests/{number}"))
            .await
    }
}

/// URL-encoded `namespace/name` path, as GitLab accepts in place of a numeric id.
fn project_id(repo_url: &str) -> ScmResult<String> {
    let (owner, name) = parse_repo_url(repo_url)?;
    Ok(encode_path(&format!("{owner}/{name}")))
}

fn encode_path(path: &str) -> String {
    path.replace('/', "%2F")
}

fn status_state(status: Status) -> (&'static str, &'static str) {
    match status {
        Status::Success => ("success", "The pipeline succeeded"),
        Status::Failed => ("failed", "The pipeline failed"),
        Status::Aborted => ("canceled", "The pipeline was aborted"),
        Status::Running => ("running", "The pipeline is running"),
        Status::Pending | Status::Waiting => ("pending", "The pipeline is pending"),
    }
}

#[async_trait]
impl ScmProvider for GitLabProvider {
    fn scm_type(&self) -> ScmType {
        ScmType::Gitlab
    }

    async fn create_webhook(&self, repo_url: &str, webhook: &WebHook) -> ScmResult<()> {
        webhook.validate()?;
        let project = project_id(repo_url)?;
        let wants = |event: EventType| webhook.events.contains(&event);
        // GitLab enables push events unless told otherwise, so always send the flag.
        let body = serde_json::json!({
            "url": webhook.url,
            "push_events": wants(EventType::Push),
            "tag_push_events": wants(EventType::TagRelease),
            "merge_requests_events": wants(EventType::PullRequest),
            "note_events": wants(EventType::PullRequestComment),
        });

        let resp = self
            .request(Method::POST, &format!("/projects/{project}/hooks"))
            .json(&body)
            .send()
            .await?;
        if resp.status() == StatusCode::FORBIDDEN {
            return Err(ScmError::PermissionDenied {
                provider: ScmType::Gitlab,
                message: resp.text().await.unwrap_or_default(),
            });
        }
        if !resp.status().is_success() {
            return Err(api_error(ScmType::Gitlab, resp).await);
        }

        tracing::debug!(project = %project, url = %webhook.url, "GitLab webhook created");
        Ok(())
    }

    async fn delete_webhook(&self, repo_url: &str, url_prefix: &str) -> ScmResult<()> {
        let project = project_id(repo_url)?;
        let hooks: Vec<ProjectHook> = self.get_all(&format!("/projects/{project}/hooks")).await?;
        let Some(hook) = hooks.into_iter().find(|hook| hook.url.starts_with(url_prefix)) else {
            return Ok(());
        };

        let resp = self
            .request(Method::DELETE, &format!("/projects/{project}/hooks/{}", hook.id))
            .send()
            .await?;
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            return Err(api_error(ScmType::Gitlab, resp).await);
        }
        Ok(())
    }

    async fn retrieve_repo_info(&self, _repo_url: &str) -> ScmResult<RepoInfo> {
        Err(ScmError::NotImplemented("retrieve GitLab repo info".into()))
    }

    async fn get_pull_request_sha(&self, repo_url: &str, number: u64) -> ScmResult<String> {
        Ok(self.merge_request(repo_url, number).await?.sha)
    }

    async fn get_merge_request_target_branch(
        &self,
        repo_url: &str,
        number: u64,
    ) -> ScmResult<String> {
        Ok(self.merge_request(repo_url, number).await?.target_branch)
    }

    async fn create_status(
        &self,
        status: Status,
        target_url: &str,
        repo_url: &str,
        commit_sha: &str,
    ) -> ScmResult<()> {
        let project = project_id(repo_url)?;
        let (state, description) = status_state(status);
        let body = serde_json::json!({
            "state": state,
            "description": description,
            "target_url": target_url,
            "context": super::STATUS_CONTEXT,
        });

        let resp = self
            .request(Method::POST, &format!("/projects/{project}/statuses/{commit_sha}"))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(ScmType::Gitlab, resp).await);
        }
        Ok(())
    }

    async fn list_repos(&self) -> ScmResult<Vec<String>> {
        let projects: Vec<GitLabProject> = self.get_all("/projects?membership=true").await?;
        Ok(projects.into_iter().map(|p| p.path_with_namespace).collect())
    }

    async fn list_branches(&self, repo: &str) -> ScmResult<Vec<String>> {
        let branches: Vec<Named> = self
            .get_all(&format!("/projects/{}/repository/branches", encode_path(repo)))
            .await?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    async fn list_tags(&self, repo: &str) -> ScmResult<Vec<String>> {
        let tags: Vec<Named> = self
            .get_all(&format!("/projects/{}/repository/tags", encode_path(repo)))
            .await?;
        Ok(tags.into_iter().map(|t| t.name).collect())
    }

    async fn check_token(&self) -> bool {
        match self
            .request(Method::GET, "/projects?membership=true&per_page=1")
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "GitLab token check failed");
                false
            }
        }
    }
}
