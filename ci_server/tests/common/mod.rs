//! Recording fakes for the SCM and quality-gate seams.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use ci_pipeline_manager::config::ManagerConfig;
use ci_pipeline_manager::manager::PipelineService;
use ci_pipeline_manager::models::pipeline::{
    AutoTrigger, Build, CodeCheckout, CodeSource, Pipeline, RepoInfo, ScmTrigger, Stages,
};
use ci_pipeline_manager::models::project::{Project, ScmConfig, ScmType};
use ci_pipeline_manager::models::record::{PipelineRecord, Status};
use ci_pipeline_manager::quality_gate::{QualityGate, QualityGateError, QualityGateResult};
use ci_pipeline_manager::scm::{ScmError, ScmProvider, ScmProviderFactory, ScmResult, WebHook};
use ci_pipeline_manager::store::{DataStore, MemoryStore};

pub const CALLBACK: &str = "http://ci.test/v1/pipelines";
pub const PROJECT: &str = "demo";
pub const REPO: &str = "https://gitlab.com/acme/app.git";

#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredHook {
    pub repo_url: String,
    pub hook: WebHook,
}

pub struct FakeProvider {
    scm_type: ScmType,
    pub hooks: Mutex<Vec<RegisteredHook>>,
    pub create_calls: AtomicUsize,
    pub fail_next_create: AtomicBool,
    pub deny_create: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FakeProvider {
    pub fn new(scm_type: ScmType) -> Self {
        Self {
            scm_type,
            hooks: Mutex::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
            fail_next_create: AtomicBool::new(false),
            deny_create: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }

    pub fn hooks(&self) -> Vec<RegisteredHook> {
        self.hooks.lock().unwrap().clone()
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScmProvider for FakeProvider {
    fn scm_type(&self) -> ScmType {
        self.scm_type
    }

    async fn create_webhook(&self, repo_url: &str, webhook: &WebHook) -> ScmResult<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        webhook.validate()?;
        if self.deny_create.load(Ordering::SeqCst) {
            return Err(ScmError::PermissionDenied {
                provider: self.scm_type,
                message: "403 Forbidden".into(),
            });
        }
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(ScmError::Api {
                provider: self.scm_type,
                status: 502,
                body: "bad gateway".into(),
            });
        }
        self.hooks.lock().unwrap().push(RegisteredHook {
            repo_url: repo_url.to_string(),
            hook: webhook.clone(),
        });
        Ok(())
    }

    async fn delete_webhook(&self, repo_url: &str, url_prefix: &str) -> ScmResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ScmError::Api {
                provider: self.scm_type,
                status: 500,
                body: "delete failed".into(),
            });
        }
        let mut hooks = self.hooks.lock().unwrap();
        if let Some(pos) = hooks
            .iter()
            .position(|h| h.repo_url == repo_url && h.hook.url.starts_with(url_prefix))
        {
            hooks.remove(pos);
        }
        Ok(())
    }

    async fn retrieve_repo_info(&self, repo_url: &str) -> ScmResult<RepoInfo> {
        if self.scm_type != ScmType::Svn {
            return Err(ScmError::NotImplemented("repo info".into()));
        }
        Ok(RepoInfo {
            id: "uuid-1".into(),
            root_url: repo_url.trim_end_matches("/trunk").to_string(),
        })
    }

    async fn get_pull_request_sha(&self, _: &str, _: u64) -> ScmResult<String> {
        Err(ScmError::NotImplemented("pull requests".into()))
    }

    async fn get_merge_request_target_branch(&self, _: &str, _: u64) -> ScmResult<String> {
        Err(ScmError::NotImplemented("merge requests".into()))
    }

    async fn create_status(&self, _: Status, _: &str, _: &str, _: &str) -> ScmResult<()> {
        Ok(())
    }

    async fn list_repos(&self) -> ScmResult<Vec<String>> {
        Ok(vec![REPO.to_string()])
    }

    async fn list_branches(&self, _: &str) -> ScmResult<Vec<String>> {
        Ok(vec!["main".into()])
    }

    async fn list_tags(&self, _: &str) -> ScmResult<Vec<String>> {
        Ok(vec![])
    }

    async fn check_token(&self) -> bool {
        true
    }
}

pub struct FakeFactory(pub Arc<FakeProvider>);

impl ScmProviderFactory for FakeFactory {
    fn provider(&self, _config: &ScmConfig) -> ScmResult<Arc<dyn ScmProvider>> {
        let provider: Arc<dyn ScmProvider> = self.0.clone();
        Ok(provider)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateCall {
    CreateProject { key: String, name: String },
    SetGate { key: String, gate_id: i64 },
    DeleteProject { key: String },
}

#[derive(Default)]
pub struct FakeGate {
    pub calls: Mutex<Vec<GateCall>>,
    pub project_exists: AtomicBool,
    pub fail_set: AtomicBool,
}

impl FakeGate {
    pub fn calls(&self) -> Vec<GateCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QualityGate for FakeGate {
    async fn create_project(
        &self,
        _address: &str,
        _token: &str,
        project_key: &str,
        display_name: &str,
    ) -> QualityGateResult<()> {
        self.calls.lock().unwrap().push(GateCall::CreateProject {
            key: project_key.into(),
            name: display_name.into(),
        });
        if self.project_exists.load(Ordering::SeqCst) {
            return Err(QualityGateError::AlreadyExists(project_key.into()));
        }
        Ok(())
    }

    async fn set_quality_gate(
        &self,
        _address: &str,
        _token: &str,
        project_key: &str,
        gate_id: i64,
    ) -> QualityGateResult<()> {
        self.calls.lock().unwrap().push(GateCall::SetGate {
            key: project_key.into(),
            gate_id,
        });
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(QualityGateError::Api {
                status: 400,
                body: "no such gate".into(),
            });
        }
        Ok(())
    }

    async fn delete_project(
        &self,
        _address: &str,
        _token: &str,
        project_key: &str,
    ) -> QualityGateResult<()> {
        self.calls.lock().unwrap().push(GateCall::DeleteProject {
            key: project_key.into(),
        });
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<FakeProvider>,
    pub gate: Arc<FakeGate>,
    pub manager: PipelineService,
    pub project: Project,
    pub log_home: PathBuf,
    _logs: TempDir,
}

pub async fn harness(scm_type: ScmType) -> Harness {
    let logs = TempDir::new().unwrap();
    let config = ManagerConfig::default()
        .with_callback_url(format!("{CALLBACK}/"))
        .with_log_home(logs.path())
        .with_list_concurrency(2);

    let store = Arc::new(MemoryStore::new());
    let project = store
        .create_project(Project {
            name: PROJECT.into(),
            scm: ScmConfig {
                scm_type,
                server: "https://scm.test".into(),
                token: "secret".into(),
                ..Default::default()
            },
            ..Default::default()
        })
        .await
        .unwrap();

    let provider = Arc::new(FakeProvider::new(scm_type));
    let gate = Arc::new(FakeGate::default());
    let manager = PipelineService::new(
        &config,
        store.clone(),
        Arc::new(FakeFactory(provider.clone())),
        gate.clone(),
    );

    Harness {
        store,
        provider,
        gate,
        manager,
        project,
        log_home: logs.path().to_path_buf(),
        _logs: logs,
    }
}

pub fn repo_build(url: &str, scm_type: ScmType) -> Build {
    Build {
        builder_image: None,
        stages: Stages {
            code_checkout: Some(CodeCheckout {
                main_repo: Some(CodeSource {
                    scm_type,
                    url: url.to_string(),
                    r#ref: None,
                }),
                dep_repos: vec![],
            }),
            ..Default::default()
        },
    }
}

pub fn triggered_pipeline(name: &str, trigger: ScmTrigger) -> Pipeline {
    Pipeline {
        name: name.to_string(),
        build: Some(repo_build(REPO, ScmType::Gitlab)),
        auto_trigger: Some(AutoTrigger {
            scm_trigger: Some(trigger),
            cron_trigger: None,
        }),
        ..Default::default()
    }
}

pub fn day(d: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, d, hour, 0, 0).unwrap()
}

pub fn record(id: &str, pipeline_id: &str, status: Status, start: DateTime<Utc>) -> PipelineRecord {
    PipelineRecord {
        id: id.to_string(),
        pipeline_id: pipeline_id.to_string(),
        name: id.to_string(),
        status,
        start_time: start,
        end_time: None,
    }
}
