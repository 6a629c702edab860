//! Keeps the webhook registered on the SCM server in step with a pipeline's
//! SCM trigger.
//!
//! Replacing a webhook is delete-then-create and is not atomic: between the
//! two calls the repository has no webhook for the pipeline, and if creation
//! fails the old registration is restored on a best-effort basis only.

use crate::error::{ManagerError, Result};
use crate::metrics;
use crate::models::pipeline::{Pipeline, ScmTrigger};
use crate::models::project::ScmType;
use crate::scm::{EventType, ScmError, ScmProvider, WebHook};

/// Event types to subscribe to, one per configured sub-trigger.
pub fn collect_events(trigger: &ScmTrigger) -> Vec<EventType> {
    let mut events = Vec::new();
    if trigger.pull_request.is_some() {
        events.push(EventType::PullRequest);
    }
    if trigger.pull_request_comment.is_some() {
        events.push(EventType::PullRequestComment);
    }
    if trigger.tag_release.is_some() {
        events.push(EventType::TagRelease);
    }
    if trigger.push.is_some() {
        events.push(EventType::Push);
    }
    events
}

fn require_repo<'a>(repo_url: Option<&'a str>) -> Result<&'a str> {
    repo_url.filter(|url| !url.is_empty()).ok_or_else(|| {
        ManagerError::validation(
            "build.stages.codeCheckout.mainRepo",
            "an SCM trigger needs a main repository",
        )
    })
}

#[derive(Debug, Clone)]
pub struct WebhookCoordinator {
    callback_url: String,
}

impl WebhookCoordinator {
    pub fn new(callback_url: impl Into<String>) -> Self {
        let callback_url = callback_url.into().trim_end_matches('/').to_string();
        Self { callback_url }
    }

    /// `{callback}/{pipeline_id}/{scm}webhook`, the address SCM servers post events to.
    pub fn webhook_url(&self, scm_type: ScmType, pipeline_id: &str) -> String {
        format!("{}/{}/{}webhook", self.callback_url, pipeline_id, scm_type.as_str())
    }

    /// Register whatever the pipeline's SCM trigger asks for.
    ///
    /// SVN post-commit triggers only resolve the repository identity. Other
    /// triggers get a webhook whose URL is stored back on the trigger. The
    /// pipeline keeps `existing_id` when given so the URL survives updates.
    pub async fn reconcile(
        &self,
        pipeline: &mut Pipeline,
        provider: &dyn ScmProvider,
        scm_type: ScmType,
        repo_url: Option<&str>,
        existing_id: Option<&str>,
    ) -> Result<()> {
        let Some(trigger) = pipeline.scm_trigger() else {
            return Ok(());
        };

        if scm_type == ScmType::Svn && trigger.post_commit.is_some() {
            let repo_url = require_repo(repo_url)?;
            let info = provider.retrieve_repo_info(repo_url).await?;
            tracing::info!(pipeline = %pipeline.name, repo_id = %info.id, "Resolved SVN repository");
            if let Some(post_commit) = pipeline
                .scm_trigger_mut()
                .and_then(|t| t.post_commit.as_mut())
            {
                post_commit.repo_info = Some(info);
            }
            return Ok(());
        }

        let events = collect_events(trigger);
        let repo_url = require_repo(repo_url)?;
        if let Some(id) = existing_id {
            pipeline.id = Some(id.to_string());
        }
        let pipeline_id = pipeline.ensure_id().to_string();
        let hook = WebHook {
            url: self.webhook_url(scm_type, &pipeline_id),
            events,
        };

        match provider.create_webhook(repo_url, &hook).await {
            Ok(()) => {}
            Err(ScmError::PermissionDenied { provider, message }) => {
                tracing::warn!(
                    pipeline = %pipeline.name,
                    %provider,
                    message = %message,
                    "SCM account may not create webhooks"
                );
                return Err(ManagerError::CreateWebhookPermissionDenied(
                    pipeline.name.clone(),
                ));
            }
            Err(e) => {
                tracing::error!(pipeline = %pipeline.name, error = %e, "Failed to create webhook");
                return Err(e.into());
            }
        }

        tracing::info!(pipeline = %pipeline.name, url = %hook.url, "Created webhook");
        metrics::webhook_created(scm_type.as_str());
        if let Some(trigger) = pipeline.scm_trigger_mut() {
            trigger.webhook = Some(hook.url);
        }
        Ok(())
    }

    /// Delete the pipeline's recorded webhook. Returns whether one was recorded.
    pub async fn teardown(
        &self,
        pipeline: &Pipeline,
        provider: &dyn ScmProvider,
        repo_url: Option<&str>,
    ) -> Result<bool> {
        let Some(url) = pipeline.webhook() else {
            return Ok(false);
        };
        let repo_url = require_repo(repo_url)?;
        provider.delete_webhook(repo_url, url).await?;

        tracing::info!(pipeline = %pipeline.name, url = %url, "Deleted webhook");
        metrics::webhook_deleted(provider.scm_type().as_str());
        Ok(true)
    }

    /// Swap `current`'s webhook for the one `updated` asks for.
    ///
    /// A failed delete aborts before anything is created. A failed create
    /// re-registers the old webhook if one was removed, then reports the
    /// create error.
    #[allow(clippy::too_many_arguments)]
    pub async fn replace(
        &self,
        current: &Pipeline,
        updated: &mut Pipeline,
        provider: &dyn ScmProvider,
        scm_type: ScmType,
        old_repo_url: Option<&str>,
        new_repo_url: Option<&str>,
        pipeline_id: &str,
    ) -> Result<()> {
        let removed = self.teardown(current, provider, old_repo_url).await?;

        let err = match self
            .reconcile(updated, provider, scm_type, new_repo_url, Some(pipeline_id))
            .await
        {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        if removed {
            tracing::warn!(pipeline = %current.name, error = %err, "Restoring previous webhook");
            let mut previous = current.clone();
            match self
                .reconcile(&mut previous, provider, scm_type, old_repo_url, Some(pipeline_id))
                .await
            {
                Ok(()) => metrics::webhook_rollback(true),
                Err(rollback_err) => {
                    tracing::warn!(
                        pipeline = %current.name,
                        error = %rollback_err,
                        "Failed to restore previous webhook"
                    );
                    metrics::webhook_rollback(false);
                }
            }
        }
        Err(err)
    }

    /// Undo a `replace` whose result could not be stored: drop `updated`'s
    /// webhook and register `current`'s again. Failures are logged only.
    #[allow(clippy::too_many_arguments)]
    pub async fn revert(
        &self,
        current: &Pipeline,
        updated: &Pipeline,
        provider: &dyn ScmProvider,
        scm_type: ScmType,
        old_repo_url: Option<&str>,
        new_repo_url: Option<&str>,
        pipeline_id: &str,
    ) {
        if let Err(e) = self.teardown(updated, provider, new_repo_url).await {
            tracing::warn!(pipeline = %updated.name, error = %e, "Failed to delete unsaved webhook");
        }
        if current.webhook().is_none() {
            return;
        }

        let mut previous = current.clone();
        match self
            .reconcile(&mut previous, provider, scm_type, old_repo_url, Some(pipeline_id))
            .await
        {
            Ok(()) => metrics::webhook_rollback(true),
            Err(e) => {
                tracing::warn!(pipeline = %current.name, error = %e, "Failed to restore previous webhook");
                metrics::webhook_rollback(false);
            }
        }
    }
}
