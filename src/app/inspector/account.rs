#![warn(clippy::all, rust_2018_idioms)]

use anyhow::anyhow;
use aws_credential_types::provider::SharedCredentialsProvider;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::client::InspectorConnector;
use super::credentials::{AssumeRoleRequest, CredentialSource};
use super::region_worker::process_region;
use super::sdk_errors::is_unrecoverable;
use super::types::{AccountResult, AnnotatedError, RegionResult, Target, TargetErrors};

/// Per-region results of one fan-out, indexed like the input region list.
///
/// A slot is `None` when that region failed. `failures` holds the region
/// errors in region order; `errors` holds template-level problems from
/// regions that otherwise succeeded.
#[derive(Debug, Default)]
pub struct RegionFanOut {
    pub results: Vec<Option<RegionResult>>,
    pub errors: Vec<AnnotatedError>,
    pub failures: Vec<(String, anyhow::Error)>,
}

impl RegionFanOut {
    pub fn completed(&self) -> impl Iterator<Item = &RegionResult> {
        self.results.iter().flatten()
    }

    /// First failure in region order, with the region and the number of
    /// other failed regions attached as context.
    pub fn into_first_failure(mut self) -> Option<anyhow::Error> {
        if self.failures.is_empty() {
            return None;
        }
        let total = self.failures.len();
        let (region, error) = self.failures.remove(0);
        let context = if total > 1 {
            format!("region {} ({} of {} regions failed)", region, total, self.results.len())
        } else {
            format!("region {}", region)
        };
        Some(error.context(context))
    }
}

/// Runs one region worker per region concurrently and waits for all of them,
/// including siblings of a failed region.
pub async fn fan_out_regions(
    connector: Arc<dyn InspectorConnector>,
    credentials: SharedCredentialsProvider,
    regions: &[String],
    max_report_age_days: u32,
    now: DateTime<Utc>,
) -> RegionFanOut {
    let mut handles = Vec::with_capacity(regions.len());

    for region in regions {
        let connector = Arc::clone(&connector);
        let credentials = credentials.clone();
        let region = region.clone();

        let handle = tokio::spawn(async move {
            let api = connector.connect(credentials, &region).await?;
            process_region(api.as_ref(), &region, max_report_age_days, now).await
        });
        handles.push(handle);
    }

    let mut fan_out = RegionFanOut {
        results: vec![None; regions.len()],
        ..Default::default()
    };

    for (index, handle) in handles.into_iter().enumerate() {
        let region = &regions[index];
        match handle.await {
            Ok(Ok(outcome)) => {
                fan_out.errors.extend(outcome.errors);
                fan_out.results[index] = Some(outcome.result);
            }
            Ok(Err(e)) => {
                log_warn!("Region {} failed: {:#}", region, e);
                fan_out.failures.push((region.clone(), e));
            }
            Err(e) => {
                log_error!("Region task for {} panicked: {}", region, e);
                fan_out
                    .failures
                    .push((region.clone(), anyhow!("region task failed: {}", e)));
            }
        }
    }

    trace_info!(
        "Region fan-out finished: {}/{} regions succeeded",
        fan_out.completed().count(),
        regions.len()
    );
    fan_out
}

/// Result of processing one account. `result` is `None` when credentials or
/// region processing failed unrecoverably.
#[derive(Debug)]
pub struct AccountOutcome {
    pub result: Option<AccountResult>,
    pub errors: TargetErrors,
}

/// Resolves credentials for one account and fans the region worker out over
/// every region.
#[derive(Clone)]
pub struct AccountOrchestrator {
    credentials: Arc<dyn CredentialSource>,
    connector: Arc<dyn InspectorConnector>,
    regions: Vec<String>,
    max_report_age_days: u32,
    now: DateTime<Utc>,
}

impl AccountOrchestrator {
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        connector: Arc<dyn InspectorConnector>,
        regions: Vec<String>,
        max_report_age_days: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            credentials,
            connector,
            regions,
            max_report_age_days,
            now,
        }
    }

    /// Processes a configured target account.
    ///
    /// Targets without a role use the ambient session. Otherwise the role is
    /// assumed; an unrecoverable failure ends the account, any other failure
    /// is recorded and the regions are still tried through a provider that
    /// retries the assume-role call lazily.
    pub async fn process_target(&self, target: &Target) -> AccountOutcome {
        let mut errors = TargetErrors::new(target.clone());
        log_info!("Processing account {}", target.display_name());

        let credentials = if target.role_name.is_empty() && target.role_arn.is_none() {
            match self.credentials.ambient_credentials().await {
                Ok(credentials) => credentials,
                Err(e) => {
                    errors.push("failed to get credentials for the current session", e);
                    return AccountOutcome { result: None, errors };
                }
            }
        } else {
            let request = AssumeRoleRequest::for_target(target);
            match self.credentials.assume_role(&request).await {
                Ok(credentials) => credentials,
                Err(e) => {
                    let unrecoverable = is_unrecoverable(&e);
                    log_error!(
                        "Failed to assume role {} ({}): {:#}",
                        request.role_arn,
                        if unrecoverable { "unrecoverable" } else { "continuing" },
                        e
                    );
                    errors.push(format!("failed to assume role: {}", request.role_arn), e);
                    if unrecoverable {
                        return AccountOutcome { result: None, errors };
                    }
                    match self.credentials.deferred_assume_role(&request).await {
                        Ok(credentials) => credentials,
                        Err(e) => {
                            errors.push(format!("failed to assume role: {}", request.role_arn), e);
                            return AccountOutcome { result: None, errors };
                        }
                    }
                }
            }
        };

        self.process_regions(credentials, &target.id, &target.alias, errors)
            .await
    }

    /// Processes the account behind the ambient session.
    pub async fn process_self_account(&self) -> AccountOutcome {
        let mut errors = TargetErrors::new(Target::default());

        let credentials = match self.credentials.ambient_credentials().await {
            Ok(credentials) => credentials,
            Err(e) => {
                log_error!("No credentials for the current session: {:#}", e);
                errors.push("failed to get credentials for the current session", e);
                return AccountOutcome { result: None, errors };
            }
        };

        let account_id = match self.credentials.caller_account_id(&credentials).await {
            Ok(id) => id,
            Err(e) => {
                errors.push("failed to get caller identity", e);
                String::new()
            }
        };

        let account_alias = match self.credentials.account_alias(&credentials).await {
            Ok(alias) => alias.unwrap_or_default(),
            Err(e) => {
                log_warn!("Could not read account alias for {}: {:#}", account_id, e);
                String::new()
            }
        };

        errors.target = Target::new(account_id.clone()).with_alias(account_alias.clone());
        log_info!("Processing account {}", errors.target.display_name());

        self.process_regions(credentials, &account_id, &account_alias, errors)
            .await
    }

    async fn process_regions(
        &self,
        credentials: SharedCredentialsProvider,
        account_id: &str,
        account_alias: &str,
        mut errors: TargetErrors,
    ) -> AccountOutcome {
        let mut fan_out = fan_out_regions(
            Arc::clone(&self.connector),
            credentials,
            &self.regions,
            self.max_report_age_days,
            self.now,
        )
        .await;

        errors.errors.append(&mut fan_out.errors);
        let region_results: Vec<RegionResult> = fan_out.results.iter_mut().filter_map(Option::take).collect();

        if let Some(failure) = fan_out.into_first_failure() {
            let unrecoverable = is_unrecoverable(&failure);
            errors.push("failed to get region results", failure);
            if unrecoverable {
                return AccountOutcome { result: None, errors };
            }
        }

        AccountOutcome {
            result: Some(AccountResult {
                account_id: account_id.to_string(),
                account_alias: account_alias.to_string(),
                region_results,
            }),
            errors,
        }
    }
}
