//! Source-control providers: the capability set the manager needs from
//! GitHub, GitLab and SVN servers.

pub mod github;
pub mod gitlab;
pub mod svn;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ManagerConfig;
use crate::models::pipeline::RepoInfo;
use crate::models::project::{ScmConfig, ScmType};
use crate::models::record::Status;

pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;
pub use svn::SvnProvider;

/// Context reported with commit statuses.
pub const STATUS_CONTEXT: &str = "continuous-integration/ci-pipeline-manager";

#[derive(Error, Debug)]
pub enum ScmError {
    /// The account behind the token may not perform the operation.
    #[error("{provider} denied access: {message}")]
    PermissionDenied { provider: ScmType, message: String },

    #[error("{0} is not implemented")]
    NotImplemented(String),

    #[error("invalid webhook: {0}")]
    InvalidWebhook(String),

    #[error("invalid repository url: {0}")]
    InvalidRepoUrl(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{provider} API returned {status}: {body}")]
    Api {
        provider: ScmType,
        status: u16,
        body: String,
    },

    #[error("svn command failed: {0}")]
    Command(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ScmResult<T> = std::result::Result<T, ScmError>;

/// Repository event categories a webhook subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    Push,
    TagRelease,
    PullRequest,
    PullRequestComment,
}

/// A webhook registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebHook {
    pub url: String,
    pub events: Vec<EventType>,
}

impl WebHook {
    /// Reject hooks that no provider would accept.
    pub fn validate(&self) -> ScmResult<()> {
        if self.url.is_empty() {
            return Err(ScmError::InvalidWebhook("empty url".into()));
        }
        if self.events.is_empty() {
            return Err(ScmError::InvalidWebhook(format!("{} has no events", self.url)));
        }
        Ok(())
    }
}

#[async_trait]
pub trait ScmProvider: Send + Sync {
    fn scm_type(&self) -> ScmType;

    async fn create_webhook(&self, repo_url: &str, webhook: &WebHook) -> ScmResult<()>;

    /// Delete the first hook whose URL starts with `url_prefix`. No match is not an error.
    async fn delete_webhook(&self, repo_url: &str, url_prefix: &str) -> ScmResult<()>;

    async fn retrieve_repo_info(&self, repo_url: &str) -> ScmResult<RepoInfo>;

    async fn get_pull_request_sha(&self, repo_url: &str, number: u64) -> ScmResult<String>;

    async fn get_merge_request_target_branch(&self, repo_url: &str, number: u64)
        -> ScmResult<String>;

    async fn create_status(
        &self,
        status: Status,
        target_url: &str,
        repo_url: &str,
        commit_sha: &str,
    ) -> ScmResult<()>;

    async fn list_repos(&self) -> ScmResult<Vec<String>>;

    async fn list_branches(&self, repo: &str) -> ScmResult<Vec<String>>;

    async fn list_tags(&self, repo: &str) -> ScmResult<Vec<String>>;

    /// Whether the configured credentials can read repositories.
    async fn check_token(&self) -> bool;
}

/// Builds the provider for a project's source-control configuration.
pub trait ScmProviderFactory: Send + Sync {
    fn provider(&self, config: &ScmConfig) -> ScmResult<Arc<dyn ScmProvider>>;
}

/// Factory producing the HTTP-backed GitHub and GitLab providers and the SVN CLI provider.
#[derive(Clone)]
pub struct DefaultProviderFactory {
    client: reqwest::Client,
    github_api_url: String,
}

impl DefaultProviderFactory {
    pub fn new(config: &ManagerConfig) -> ScmResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ci-pipeline-manager/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            github_api_url: config.github_api_url.clone(),
        })
    }
}

impl ScmProviderFactory for DefaultProviderFactory {
    fn provider(&self, config: &ScmConfig) -> ScmResult<Arc<dyn ScmProvider>> {
        let provider: Arc<dyn ScmProvider> = match config.scm_type {
            ScmType::Github => Arc::new(GitHubProvider::new(
                self.client.clone(),
                &self.github_api_url,
                config,
            )),
            ScmType::Gitlab => Arc::new(GitLabProvider::new(self.client.clone(), config)?),
            ScmType::Svn => Arc::new(SvnProvider::new(config)),
        };
        Ok(provider)
    }
}

/// Split a clone URL into its namespace and repository name.
///
/// `https://gitlab.com/group/sub/app.git` gives `("group/sub", "app")`.
pub fn parse_repo_url(repo_url: &str) -> ScmResult<(String, String)> {
    let invalid = || ScmError::InvalidRepoUrl(repo_url.to_string());
    let path = if let Some((_, rest)) = repo_url.split_once("://") {
        rest.split_once('/').map(|(_, path)| path).ok_or_else(invalid)?
    } else if let Some((_, path)) = repo_url.split_once(':') {
        // scp-like form: git@host:owner/repo.git
        path
    } else {
        return Err(invalid());
    };

    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    match path.rsplit_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
            Ok((owner.to_string(), name.to_string()))
        }
        _ => Err(invalid()),
    }
}

/// Read a non-success response into an [`ScmError::Api`].
pub(crate) async fn api_error(provider: ScmType, resp: reqwest::Response) -> ScmError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    ScmError::Api {
        provider,
        status,
        body,
    }
}
