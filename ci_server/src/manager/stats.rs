//! Day-bucketed execution statistics.

use chrono::{DateTime, Duration, Utc};

use crate::models::record::{PipelineRecord, Status};
use crate::models::stats::{PipelineStatusStats, StatsDetail, StatsOverview, StatsStatus};

const SECONDS_PER_DAY: i64 = 86_400;

/// Epoch seconds of the UTC midnight at or before `t`.
pub fn day_stamp(t: DateTime<Utc>) -> i64 {
    let secs = t.timestamp();
    secs - secs.rem_euclid(SECONDS_PER_DAY)
}

fn count(status: &mut StatsStatus, record: Status) {
    match record {
        Status::Success => status.success += 1,
        Status::Failed => status.failed += 1,
        Status::Aborted => status.aborted += 1,
        Status::Pending | Status::Running | Status::Waiting => {}
    }
}

fn day_buckets(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<StatsDetail> {
    let mut details = Vec::new();
    let mut day = start;
    while day <= end {
        details.push(StatsDetail {
            timestamp: day_stamp(day),
            status: StatsStatus::default(),
        });
        day += Duration::days(1);
    }

    // Stepping from a late hour of `start` can stop one day short of `end`.
    let end_day = day_stamp(end);
    if details.last().is_some_and(|last| last.timestamp != end_day) {
        details.push(StatsDetail {
            timestamp: end_day,
            status: StatsStatus::default(),
        });
    }
    details
}

/// Aggregate `records` into per-day and overall status counts.
///
/// Every record counts toward the overview; only records whose start day has
/// a bucket in `[start, end]` show up in `details`.
pub fn aggregate(
    records: &[PipelineRecord],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> PipelineStatusStats {
    let mut details = day_buckets(start, end);
    let mut overview = StatsOverview {
        total: records.len() as u64,
        status: StatsStatus::default(),
        success_ratio: "0.00%".to_string(),
    };

    for record in records {
        let day = day_stamp(record.start_time);
        if let Some(detail) = details.iter_mut().find(|d| d.timestamp == day) {
            count(&mut detail.status, record.status);
        }
        count(&mut overview.status, record.status);
    }

    if overview.total > 0 {
        let ratio = overview.status.success as f64 / overview.total as f64 * 100.0;
        overview.success_ratio = format!("{ratio:.2}%");
    }

    PipelineStatusStats { overview, details }
}
