//! Projects group pipelines and own the source-control configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
    pub scm: ScmConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,
}

/// Credentials and server address for a project's source-control system.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScmConfig {
    #[serde(rename = "type")]
    pub scm_type: ScmType,
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default, skip_serializing)]
    pub token: String,
}

impl std::fmt::Debug for ScmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScmConfig")
            .field("scm_type", &self.scm_type)
            .field("server", &self.server)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScmType {
    #[default]
    Github,
    Gitlab,
    #[serde(rename = "SVN")]
    Svn,
}

impl ScmType {
    /// Lower-cased name used in webhook callback paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScmType::Github => "github",
            ScmType::Gitlab => "gitlab",
            ScmType::Svn => "svn",
        }
    }
}

impl std::fmt::Display for ScmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named connection to an external service used by pipelines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sonar_qube: Option<SonarQubeServer>,
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SonarQubeServer {
    pub address: String,
    #[serde(default, skip_serializing)]
    pub token: String,
}

impl std::fmt::Debug for SonarQubeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SonarQubeServer")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Pagination and filtering for list queries. `limit == 0` lists everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub filter: Option<String>,
}
