#![warn(clippy::all, rust_2018_idioms)]

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use super::types::AssessmentRunDetail;

/// Picks the most recent completed run for each template.
///
/// Runs that have not completed, or that completed more than
/// `max_report_age_days` before `now`, are ignored. Among the remaining runs of
/// a template the latest `started_at` wins (falling back to `completed_at` when
/// the start time is missing). Equal start times are broken by the
/// lexicographically greatest run ARN so the choice never depends on input
/// order.
///
/// Returns one run per template, ordered by template ARN. Templates whose runs
/// are all stale do not appear.
pub fn resolve_latest_runs(
    runs: &[AssessmentRunDetail],
    max_report_age_days: u32,
    now: DateTime<Utc>,
) -> Vec<AssessmentRunDetail> {
    let max_age = Duration::try_days(i64::from(max_report_age_days)).unwrap_or(Duration::MAX);
    let mut latest: BTreeMap<&str, &AssessmentRunDetail> = BTreeMap::new();

    for run in runs {
        let Some(completed_at) = run.completed_at else {
            trace_debug!("Skipping run {} with no completion time", run.arn);
            continue;
        };
        if now - completed_at > max_age {
            trace_debug!(
                "Skipping run {} completed at {} (older than {} days)",
                run.arn,
                completed_at,
                max_report_age_days
            );
            continue;
        }

        match latest.get(run.template_arn.as_str()) {
            Some(current) if !is_newer(run, current) => {}
            _ => {
                latest.insert(run.template_arn.as_str(), run);
            }
        }
    }

    latest.into_values().cloned().collect()
}

fn start_time(run: &AssessmentRunDetail) -> Option<DateTime<Utc>> {
    run.started_at.or(run.completed_at)
}

fn is_newer(candidate: &AssessmentRunDetail, current: &AssessmentRunDetail) -> bool {
    match start_time(candidate).cmp(&start_time(current)) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => candidate.arn > current.arn,
    }
}
