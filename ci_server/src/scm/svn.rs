//! Subversion provider backed by the `svn` command-line client.
//!
//! SVN has no webhook API; pipelines subscribe through a post-commit hook
//! keyed by repository UUID instead, so only repository metadata and
//! credential checks are supported.

use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{ScmError, ScmProvider, ScmResult, WebHook};
use crate::models::pipeline::RepoInfo;
use crate::models::project::{ScmConfig, ScmType};
use crate::models::record::Status;

pub struct SvnProvider {
    server: String,
    username: String,
    password: String,
}

impl SvnProvider {
    pub fn new(config: &ScmConfig) -> Self {
        Self {
            server: config.server.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    /// Arguments for an `svn` invocation. The password is never among them;
    /// `run` feeds it through `--password-from-stdin`.
    fn args<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut all = args.to_vec();
        all.push("--non-interactive");
        if !self.username.is_empty() {
            all.extend(["--username", self.username.as_str(), "--password-from-stdin"]);
        }
        all
    }

    async fn run(&self, args: &[&str]) -> ScmResult<Output> {
        let mut child = Command::new("svn")
            .args(self.args(args))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        // stdin is dropped here either way, closing the pipe
        if let Some(mut stdin) = child.stdin.take().filter(|_| !self.username.is_empty()) {
            stdin.write_all(self.password.as_bytes()).await?;
        }
        Ok(child.wait_with_output().await?)
    }

    async fn show_item(&self, item: &str, url: &str) -> ScmResult<String> {
        let output = self.run(&["info", "--show-item", item, url]).await?;
        if !output.status.success() {
            return Err(ScmError::Command(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn unsupported<T>(what: &str) -> ScmResult<T> {
    Err(ScmError::NotImplemented(format!("{what} for SVN")))
}

#[async_trait]
impl ScmProvider for SvnProvider {
    fn scm_type(&self) -> ScmType {
        ScmType::Svn
    }

    async fn create_webhook(&self, _repo_url: &str, _webhook: &WebHook) -> ScmResult<()> {
        unsupported("create webhook")
    }

    async fn delete_webhook(&self, _repo_url: &str, _url_prefix: &str) -> ScmResult<()> {
        unsupported("delete webhook")
    }

    async fn retrieve_repo_info(&self, repo_url: &str) -> ScmResult<RepoInfo> {
        let id = self.show_item("repos-uuid", repo_url).await?;
        let root_url = self.show_item("repos-root-url", repo_url).await?;
        if id.is_empty() {
            return Err(ScmError::NotFound(format!("repository uuid of {repo_url}")));
        }
        Ok(RepoInfo { id, root_url })
    }

    async fn get_pull_request_sha(&self, _repo_url: &str, _number: u64) -> ScmResult<String> {
        unsupported("pull requests")
    }

    async fn get_merge_request_target_branch(
        &self,
        _repo_url: &str,
        _number: u64,
    ) -> ScmResult<String> {
        unsupported("merge requests")
    }

    async fn create_status(
        &self,
        _status: Status,
        _target_url: &str,
        _repo_url: &str,
        _commit_sha: &str,
    ) -> ScmResult<()> {
        unsupported("commit status")
    }

    async fn list_repos(&self) -> ScmResult<Vec<String>> {
        unsupported("list repos")
    }

    async fn list_branches(&self, _repo: &str) -> ScmResult<Vec<String>> {
        unsupported("list branches")
    }

    async fn list_tags(&self, _repo: &str) -> ScmResult<Vec<String>> {
        unsupported("list tags")
    }

    async fn check_token(&self) -> bool {
        match self.run(&["info", self.server.as_str()]).await {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::warn!(error = %e, server = %self.server, "svn info failed");
                false
            }
        }
    }
}
