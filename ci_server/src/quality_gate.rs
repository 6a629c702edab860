//! Code-scan quality gates (SonarQube).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QualityGateError {
    /// The project key is already registered. Creation is idempotent for callers.
    #[error("quality gate project {0} already exists")]
    AlreadyExists(String),

    #[error("integration {0} has no SonarQube server configured")]
    MissingServer(String),

    #[error("SonarQube returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type QualityGateResult<T> = std::result::Result<T, QualityGateError>;

#[async_trait]
pub trait QualityGate: Send + Sync {
    async fn create_project(
        &self,
        address: &str,
        token: &str,
        project_key: &str,
        display_name: &str,
    ) -> QualityGateResult<()>;

    async fn set_quality_gate(
        &self,
        address: &str,
        token: &str,
        project_key: &str,
        gate_id: i64,
    ) -> QualityGateResult<()>;

    async fn delete_project(&self, address: &str, token: &str, project_key: &str)
        -> QualityGateResult<()>;
}

pub struct SonarQube {
    client: reqwest::Client,
}

impl SonarQube {
    pub fn new(timeout_secs: u64) -> QualityGateResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    async fn post(
        &self,
        address: &str,
        token: &str,
        path: &str,
        form: &[(&str, &str)],
    ) -> QualityGateResult<reqwest::Response> {
        let url = format!("{}{}", address.trim_end_matches('/'), path);
        let resp = self
            .client
            .post(url)
            // SonarQube user tokens go in the basic-auth username with an empty password.
            .basic_auth(token, Some(""))
            .form(form)
            .send()
            .await?;
        Ok(resp)
    }
}

async fn api_error(resp: reqwest::Response) -> QualityGateError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    QualityGateError::Api { status, body }
}

#[async_trait]
impl QualityGate for SonarQube {
    async fn create_project(
        &self,
        address: &str,
        token: &str,
        project_key: &str,
        display_name: &str,
    ) -> QualityGateResult<()> {
        let name = if display_name.is_empty() {
            project_key
        } else {
            display_name
        };
        let resp = self
            .post(
                address,
                token,
                "/api/projects/create",
                &[("project", project_key), ("name", name)],
            )
            .await?;
        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        if body.contains("key already exists") {
            return Err(QualityGateError::AlreadyExists(project_key.to_string()));
        }
        Err(QualityGateError::Api { status, body })
    }

    async fn set_quality_gate(
        &self,
        address: &str,
        token: &str,
        project_key: &str,
        gate_id: i64,
    ) -> QualityGateResult<()> {
        let gate_id = gate_id.to_string();
        let resp = self
            .post(
                address,
                token,
                "/api/qualitygates/select",
                &[("gateId", gate_id.as_str()), ("projectKey", project_key)],
            )
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(())
    }

    async fn delete_project(
        &self,
        address: &str,
        token: &str,
        project_key: &str,
    ) -> QualityGateResult<()> {
        let resp = self
            .post(address, token, "/api/projects/delete", &[("project", project_key)])
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(())
    }
}
