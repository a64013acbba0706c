#![warn(clippy::all, rust_2018_idioms)]

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::account::{AccountOrchestrator, AccountOutcome};
use super::client::InspectorConnector;
use super::credentials::CredentialSource;
use super::regions::inspector_regions;
use super::types::{Collection, Target};

/// Default cutoff, in days, for a completed run to count as current.
pub const DEFAULT_MAX_REPORT_AGE_DAYS: u32 = 60;

/// Collects Inspector findings for every configured account, one account at
/// a time.
pub struct Collector {
    credentials: Arc<dyn CredentialSource>,
    connector: Arc<dyn InspectorConnector>,
    regions: Vec<String>,
    max_report_age_days: u32,
    now: DateTime<Utc>,
}

impl Collector {
    pub fn new(credentials: Arc<dyn CredentialSource>, connector: Arc<dyn InspectorConnector>) -> Self {
        Self {
            credentials,
            connector,
            regions: inspector_regions(),
            max_report_age_days: DEFAULT_MAX_REPORT_AGE_DAYS,
            now: Utc::now(),
        }
    }

    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }

    pub fn with_max_report_age(mut self, days: u32) -> Self {
        self.max_report_age_days = days;
        self
    }

    /// Reference time for the report-age cutoff.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Processes `targets` in order, or the caller's own account when the list
    /// is empty. Every attempted account contributes exactly one entry to
    /// `Collection::errors`, and partial results are always returned.
    pub async fn collect(&self, targets: &[Target]) -> Collection {
        let orchestrator = AccountOrchestrator::new(
            Arc::clone(&self.credentials),
            Arc::clone(&self.connector),
            self.regions.clone(),
            self.max_report_age_days,
            self.now,
        );

        log_info!(
            "Collecting findings for {} account(s) across {} region(s), max report age {} days",
            targets.len().max(1),
            self.regions.len(),
            self.max_report_age_days
        );

        let mut collection = Collection::default();

        if targets.is_empty() {
            let outcome = orchestrator.process_self_account().await;
            record(&mut collection, outcome);
            return collection;
        }

        for target in targets {
            let outcome = orchestrator.process_target(target).await;
            record(&mut collection, outcome);
        }

        collection
    }
}

fn record(collection: &mut Collection, outcome: AccountOutcome) {
    let AccountOutcome { result, errors } = outcome;
    if !errors.is_empty() {
        log_warn!(
            "Account {} finished with {} error(s)",
            errors.target.display_name(),
            errors.errors.len()
        );
    }
    if let Some(result) = result {
        collection.results.push(result);
    }
    collection.errors.push(errors);
}
