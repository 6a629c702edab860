//! GitHub REST v3 provider.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{api_error, parse_repo_url, EventType, ScmError, ScmProvider, ScmResult, WebHook};
use crate::models::pipeline::RepoInfo;
use crate::models::project::{ScmConfig, ScmType};
use crate::models::record::Status;

const PER_PAGE: usize = 100;

pub struct GitHubProvider {
    client: reqwest::Client,
    api_url: String,
    token: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct Hook {
    id: u64,
    #[serde(default)]
    config: HookConfig,
}

#[derive(Debug, Default, Deserialize)]
struct HookConfig {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    head: GitRef,
    base: GitRef,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

impl GitHubProvider {
    pub fn new(client: reqwest::Client, api_url: &str, config: &ScmConfig) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.api_url, path))
            .header(ACCEPT, "application/vnd.github+json");
        if !self.token.is_empty() {
            builder.header(AUTHORIZATION, format!("Bearer {}", self.token))
        } else if !self.username.is_empty() {
            builder.basic_auth(&self.username, Some(&self.password))
        } else {
            builder
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ScmResult<T> {
        let resp = self.request(Method::GET, path).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(ScmType::Github, resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn get_all_names(&self, path: &str) -> ScmResult<Vec<String>> {
        let mut names = Vec::new();
        for page in 1.. {
            let batch: Vec<Named> = self
                .get_json(&format!("{path}?per_page={PER_PAGE}&page={page}"))
                .await?;
            let done = batch.len() < PER_PAGE;
            names.extend(batch.into_iter().map(|n| n.name));
            if done {
                break;
            }
        }
        Ok(names)
    }

    async fn pull_request(&self, repo_url: &str, number: u64) -> ScmResult<PullRequest> {
        let repo = repo_path(repo_url)?;
        self.get_json(&format!("/repos/{repo}/pulls/{number}")).await
    }
}

fn repo_path(repo_url: &str) -> ScmResult<String> {
    let (owner, name) = parse_repo_url(repo_url)?;
    Ok(format!("{owner}/{name}"))
}

fn event_name(event: EventType) -> &'static str {
    match event {
        EventType::Push => "push",
        EventType::TagRelease => "release",
        EventType::PullRequest => "pull_request",
        EventType::PullRequestComment => "issue_comment",
    }
}

fn status_state(status: Status) -> (&'static str, &'static str) {
    match status {
        Status::Success => ("success", "The pipeline succeeded"),
        Status::Failed => ("failure", "The pipeline failed"),
        Status::Aborted => ("error", "The pipeline was aborted"),
        Status::Pending | Status::Waiting | Status::Running => ("pending", "The pipeline is running"),
    }
}

#[async_trait]
impl ScmProvider for GitHubProvider {
    fn scm_type(&self) -> ScmType {
        ScmType::Github
    }

    async fn create_webhook(&self, repo_url: &str, webhook: &WebHook) -> ScmResult<()> {
        webhook.validate()?;
        let repo = repo_path(repo_url)?;
        let events: Vec<&str> = webhook.events.iter().copied().map(event_name).collect();
        let body = serde_json::json!({
            "name": "web",
            "active": true,
            "events": events,
            "config": { "url": webhook.url, "content_type": "json" },
        });

        let resp = self
            .request(Method::POST, &format!("/repos/{repo}/hooks"))
            .json(&body)
            .send()
            .await?;
        // GitHub hides repositories the token cannot administer behind a 404.
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ScmError::PermissionDenied {
                provider: ScmType::Github,
                message: resp.text().await.unwrap_or_default(),
            });
        }
        if !resp.status().is_success() {
            return Err(api_error(ScmType::Github, resp).await);
        }

        tracing::debug!(repo = %repo, url = %webhook.url, "GitHub webhook created");
        Ok(())
    }

    async fn delete_webhook(&self, repo_url: &str, url_prefix: &str) -> ScmResult<()> {
        let repo = repo_path(repo_url)?;
        let hooks: Vec<Hook> = self.get_json(&format!("/repos/{repo}/hooks")).await?;
        let Some(hook) = hooks.into_iter().find(|hook| {
            hook.config
                .url
                .as_deref()
                .is_some_and(|url| url.starts_with(url_prefix))
        }) else {
            return Ok(());
        };

        let resp = self
            .request(Method::DELETE, &format!("/repos/{repo}/hooks/{}", hook.id))
            .send()
            .await?;
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            return Err(api_error(ScmType::Github, resp).await);
        }
        Ok(())
    }

    async fn retrieve_repo_info(&self, _repo_url: &str) -> ScmResult<RepoInfo> {
        Err(ScmError::NotImplemented("retrieve GitHub repo info".into()))
    }

    async fn get_pull_request_sha(&self, repo_url: &str, number: u64) -> ScmResult<String> {
        Ok(self.pull_request(repo_url, number).await?.head.sha)
    }

    async fn get_merge_request_target_branch(
        &self,
        repo_url: &str,
        number: u64,
    ) -> ScmResult<String> {
        Ok(self.pull_request(repo_url, number).await?.base.ref_name)
    }

    async fn create_status(
        &self,
        status: Status,
        target_url: &str,
        repo_url: &str,
        commit_sha: &str,
    ) -> ScmResult<()> {
        let repo = repo_path(repo_url)?;
        let (state, description) = status_state(status);
        let body = serde_json::json!({
            "state": state,
            "description": description,
            "target_url": target_url,
            "context": super::STATUS_CONTEXT,
        });

        let resp = self
            .request(Method::POST, &format!("/repos/{repo}/statuses/{commit_sha}"))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(ScmType::Github, resp).await);
        }
        Ok(())
    }

    async fn list_repos(&self) -> ScmResult<Vec<String>> {
        let mut repos = Vec::new();
        for page in 1.. {
            let batch: Vec<Repository> = self
                .get_json(&format!("/user/repos?per_page={PER_PAGE}&page={page}"))
                .await?;
            let done = batch.len() < PER_PAGE;
            repos.extend(batch.into_iter().map(|r| r.full_name));
            if done {
                break;
            }
        }
        Ok(repos)
    }

    async fn list_branches(&self, repo: &str) -> ScmResult<Vec<String>> {
        self.get_all_names(&format!("/repos/{repo}/branches")).await
    }

    async fn list_tags(&self, repo: &str) -> ScmResult<Vec<String>> {
        self.get_all_names(&format!("/repos/{repo}/tags")).await
    }

    async fn check_token(&self) -> bool {
        match self.request(Method::GET, "/user").send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "GitHub token check failed");
                false
            }
        }
    }
}
