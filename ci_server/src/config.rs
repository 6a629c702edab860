//! Pipeline manager configuration, loaded from environment variables.

use std::path::PathBuf;

pub const DEFAULT_CALLBACK_URL: &str = "http://127.0.0.1:7099/v1/pipelines";

#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Base URL SCM servers call back on; webhook URLs are derived from it.
    pub callback_url: String,
    /// Root of per-pipeline log directories (`{log_home}/{project_id}/{pipeline_id}`).
    pub log_home: PathBuf,
    /// Upper bound on pipelines whose recent records are fetched at once.
    pub list_concurrency: usize,
    /// GitHub REST endpoint; override for GitHub Enterprise.
    pub github_api_url: String,
    /// Request timeout for SCM and SonarQube HTTP calls.
    pub http_timeout_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            callback_url: DEFAULT_CALLBACK_URL.to_string(),
            log_home: PathBuf::from("/var/lib/ci/logs"),
            list_concurrency: 8,
            github_api_url: "https://api.github.com".to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl ManagerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let callback_url = match std::env::var("CI_CALLBACK_URL") {
            Ok(url) if !url.is_empty() => url,
            _ => {
                tracing::warn!(
                    default = DEFAULT_CALLBACK_URL,
                    "CI_CALLBACK_URL not set -- SCM servers must reach the default address"
                );
                defaults.callback_url
            }
        };
        let log_home = std::env::var("CI_LOG_HOME")
            .map(PathBuf::from)
            .unwrap_or(defaults.log_home);
        let list_concurrency = std::env::var("CI_LIST_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.list_concurrency);
        let github_api_url =
            std::env::var("CI_GITHUB_API_URL").unwrap_or(defaults.github_api_url);
        let http_timeout_secs = std::env::var("CI_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.http_timeout_secs);

        Self::default()
            .with_callback_url(callback_url)
            .with_log_home(log_home)
            .with_list_concurrency(list_concurrency)
            .with_github_api_url(github_api_url)
            .with_http_timeout_secs(http_timeout_secs)
    }

    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_log_home(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_home = path.into();
        self
    }

    pub fn with_list_concurrency(mut self, limit: usize) -> Self {
        self.list_concurrency = limit.max(1);
        self
    }

    pub fn with_github_api_url(mut self, url: impl Into<String>) -> Self {
        self.github_api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_http_timeout_secs(mut self, secs: u64) -> Self {
        self.http_timeout_secs = secs;
        self
    }
}
