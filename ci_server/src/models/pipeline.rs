//! Pipeline definition and its auto-trigger configuration.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::project::ScmType;
use crate::models::record::PipelineRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<Build>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_trigger: Option<AutoTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_time: Option<DateTime<Utc>>,

    /// Attached on read, never persisted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_records: Vec<PipelineRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_success_records: Vec<PipelineRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_failed_records: Vec<PipelineRecord>,
}

impl Pipeline {
    /// Return the pipeline id, generating one first if it has none yet.
    pub fn ensure_id(&mut self) -> &str {
        self.id.get_or_insert_with(new_pipeline_id)
    }

    /// The main repository the pipeline checks out, if configured.
    pub fn main_repo(&self) -> Option<&CodeSource> {
        self.build
            .as_ref()?
            .stages
            .code_checkout
            .as_ref()?
            .main_repo
            .as_ref()
    }

    pub fn scm_trigger(&self) -> Option<&ScmTrigger> {
        self.auto_trigger.as_ref()?.scm_trigger.as_ref()
    }

    pub fn scm_trigger_mut(&mut self) -> Option<&mut ScmTrigger> {
        self.auto_trigger.as_mut()?.scm_trigger.as_mut()
    }

    /// The webhook URL currently registered for this pipeline.
    pub fn webhook(&self) -> Option<&str> {
        self.scm_trigger()?
            .webhook
            .as_deref()
            .filter(|url| !url.is_empty())
    }

    pub fn sonar_qube(&self) -> Option<&SonarQubeScan> {
        self.build.as_ref()?.stages.code_scan.as_ref()?.sonar_qube.as_ref()
    }

    /// Quality gate id requested by the code scan stage; zero when unset.
    pub fn quality_gate_threshold(&self) -> i64 {
        self.sonar_qube()
            .and_then(|sonar| sonar.config.as_ref())
            .map(|config| config.threshold)
            .unwrap_or(0)
    }

    /// Clear the transient record attachments.
    pub fn without_recent_records(mut self) -> Self {
        self.recent_records.clear();
        self.recent_success_records.clear();
        self.recent_failed_records.clear();
        self
    }
}

/// Pipeline identities are 32-char lowercase hex strings.
pub fn new_pipeline_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder_image: Option<String>,
    #[serde(default)]
    pub stages: Stages,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_checkout: Option<CodeCheckout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_scan: Option<CodeScan>,
    /// Execution stages (unit test, package, image build...) are stored as-is.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeCheckout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_repo: Option<CodeSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dep_repos: Vec<CodeSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSource {
    #[serde(rename = "type")]
    pub scm_type: ScmType,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeScan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sonar_qube: Option<SonarQubeScan>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SonarQubeScan {
    /// Name of the SonarQube integration holding the server address and token.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<SonarQubeConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SonarQubeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Quality gate id; values <= 0 disable the gate.
    #[serde(default)]
    pub threshold: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scm_trigger: Option<ScmTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_trigger: Option<CronTrigger>,
}

/// Repository events that start the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScmTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_release: Option<GeneralTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<GeneralTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_comment: Option<CommentTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_commit: Option<PostCommitTrigger>,
    /// URL registered with the provider; set by the server, not by clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralTrigger {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTrigger {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentTrigger {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCommitTrigger {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_info: Option<RepoInfo>,
}

/// SVN repository identity used to route post-commit hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoInfo {
    pub id: String,
    pub root_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronTrigger {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationPolicy {
    #[default]
    Always,
    Success,
    Failure,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub policy: NotificationPolicy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub receivers: Vec<NotificationReceiver>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationReceiver {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub addresses: Vec<String>,
}
