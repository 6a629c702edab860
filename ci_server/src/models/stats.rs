//! Aggregated execution statistics. Computed on request, never stored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsStatus {
    pub success: u64,
    pub failed: u64,
    pub aborted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsOverview {
    pub total: u64,
    #[serde(flatten)]
    pub status: StatsStatus,
    pub success_ratio: String,
}

/// Counts for one UTC day; `timestamp` is the day's first second since the epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDetail {
    pub timestamp: i64,
    #[serde(flatten)]
    pub status: StatsStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStatusStats {
    pub overview: StatsOverview,
    pub details: Vec<StatsDetail>,
}
