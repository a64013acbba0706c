//! Target → template → run → finding walk for a single region.
//!
//! Listing targets or templates is all-or-nothing for the region. Failures
//! while handling one template are recorded and the walk moves on to the next
//! template.

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::client::InspectorApi;
use super::latest_runs::resolve_latest_runs;
use super::pagination::{
    describe_in_batches, paginate, DESCRIBE_BATCH_SIZE, FINDINGS_BATCH_SIZE, FINDINGS_PAGE_SIZE,
    LIST_PAGE_SIZE,
};
use super::sdk_errors::categorize_error;
use super::types::{AnnotatedError, Finding, RegionResult, RegionTemplateResult, RunResult};

/// Placeholder used when a template's name cannot be described.
pub const UNKNOWN_TEMPLATE_NAME: &str = "-";

/// ListAssessmentTemplates accepts at most this many target ARNs per filter.
const TARGET_ARNS_PER_FILTER: usize = 50;

/// A region's results plus the template-level failures that were skipped.
#[derive(Debug)]
pub struct RegionOutcome {
    pub result: RegionResult,
    pub errors: Vec<AnnotatedError>,
}

/// Runs the full collection walk for `region` through `api`.
///
/// Returns `Err` only when targets or templates cannot be listed.
pub async fn process_region(
    api: &dyn InspectorApi,
    region: &str,
    max_report_age_days: u32,
    now: DateTime<Utc>,
) -> Result<RegionOutcome> {
    RegionWorker::new(api, region, max_report_age_days, now).run().await
}

struct RegionWorker<'a> {
    api: &'a dyn InspectorApi,
    region: &'a str,
    max_report_age_days: u32,
    now: DateTime<Utc>,
    rules_package_names: Option<HashMap<String, String>>,
    errors: Vec<AnnotatedError>,
}

impl<'a> RegionWorker<'a> {
    fn new(api: &'a dyn InspectorApi, region: &'a str, max_report_age_days: u32, now: DateTime<Utc>) -> Self {
        Self {
            api,
            region,
            max_report_age_days,
            now,
            rules_package_names: None,
            errors: Vec::new(),
        }
    }

    async fn run(mut self) -> Result<RegionOutcome> {
        let api = self.api;
        let region = self.region;

        let target_arns = paginate(Some(LIST_PAGE_SIZE), |token, max| {
            api.list_assessment_targets(token, max)
        })
        .await
        .into_result()
        .with_context(|| format!("Failed to list assessment targets in {}", region))?;

        if target_arns.is_empty() {
            trace_debug!("No assessment targets in {}", region);
            return Ok(RegionOutcome {
                result: RegionResult::empty(region),
                errors: self.errors,
            });
        }

        let mut template_arns = Vec::new();
        for targets in target_arns.chunks(TARGET_ARNS_PER_FILTER) {
            let listed = paginate(Some(LIST_PAGE_SIZE), |token, max| {
                api.list_assessment_templates(targets, token, max)
            })
            .await
            .into_result()
            .with_context(|| format!("Failed to list assessment templates in {}", region))?;
            template_arns.extend(listed);
        }

        log_info!(
            "Region {}: {} assessment targets, {} assessment templates",
            region,
            target_arns.len(),
            template_arns.len()
        );

        let mut template_results = Vec::new();
        for template_arn in &template_arns {
            match self.process_template(template_arn).await {
                Ok(Some(result)) => template_results.push(result),
                Ok(None) => {}
                Err(e) => {
                    log_error!(
                        "Skipping template {} in {} ({}): {:#}",
                        template_arn,
                        region,
                        categorize_error(&e).short_label(),
                        e
                    );
                    self.errors.push(AnnotatedError::new(
                        format!("failed to process assessment template {} in {}", template_arn, region),
                        e,
                    ));
                }
            }
        }

        Ok(RegionOutcome {
            result: RegionResult {
                region: region.to_string(),
                template_results,
            },
            errors: self.errors,
        })
    }

    /// `Ok(None)` when the template has no runs inside the age window.
    async fn process_template(&mut self, template_arn: &str) -> Result<Option<RegionTemplateResult>> {
        let api = self.api;
        let template_filter = [template_arn.to_string()];

        let run_arns = paginate(Some(LIST_PAGE_SIZE), |token, max| {
            api.list_assessment_runs(&template_filter, token, max)
        })
        .await
        .into_result()
        .context("Failed to list assessment runs")?;

        if run_arns.is_empty() {
            trace_debug!("Template {} has no runs", template_arn);
            return Ok(None);
        }

        let run_details = describe_in_batches(&run_arns, DESCRIBE_BATCH_SIZE, |batch| {
            api.describe_assessment_runs(batch)
        })
        .await
        .into_result()
        .context("Failed to describe assessment runs")?;

        let latest = resolve_latest_runs(&run_details, self.max_report_age_days, self.now);
        if latest.is_empty() {
            log_debug!(
                "Template {} has {} runs but none completed in the last {} days",
                template_arn,
                run_details.len(),
                self.max_report_age_days
            );
            return Ok(None);
        }

        let template_name = self.template_name(template_arn).await;

        let mut runs = Vec::with_capacity(latest.len());
        for run in latest {
            let findings = self.run_findings(&run.arn).await?;
            trace_info!("Run {} ({}) has {} findings", run.name, run.arn, findings.len());
            runs.push(RunResult {
                run_arn: run.arn,
                findings,
            });
        }

        Ok(Some(RegionTemplateResult {
            template_arn: template_arn.to_string(),
            template_name,
            runs,
        }))
    }

    async fn template_name(&self, template_arn: &str) -> String {
        match self
            .api
            .describe_assessment_templates(vec![template_arn.to_string()])
            .await
        {
            Ok(templates) => templates
                .into_iter()
                .next()
                .map(|t| t.name)
                .unwrap_or_else(|| UNKNOWN_TEMPLATE_NAME.to_string()),
            Err(e) => {
                log_warn!("Could not describe template {}: {:#}", template_arn, e);
                UNKNOWN_TEMPLATE_NAME.to_string()
            }
        }
    }

    async fn run_findings(&mut self, run_arn: &str) -> Result<Vec<Finding>> {
        let api = self.api;
        let run_filter = [run_arn.to_string()];

        let finding_arns = paginate(Some(FINDINGS_PAGE_SIZE), |token, max| {
            api.list_findings(&run_filter, token, max)
        })
        .await
        .into_result()
        .with_context(|| format!("Failed to list findings for run {}", run_arn))?;

        if finding_arns.is_empty() {
            return Ok(Vec::new());
        }

        let mut findings = describe_in_batches(&finding_arns, FINDINGS_BATCH_SIZE, |batch| {
            api.describe_findings(batch)
        })
        .await
        .into_result()
        .with_context(|| format!("Failed to describe findings for run {}", run_arn))?;

        let names = self.rules_package_names().await;
        for finding in &mut findings {
            if let Some(name) = finding.rules_package_arn().and_then(|arn| names.get(arn)) {
                finding.rules_package_name = name.clone();
            }
        }

        Ok(findings)
    }

    /// Rules package ARN → name, fetched on first use and kept for the rest of
    /// this region. A failed lookup is recorded once and whatever was
    /// described before the failure is used.
    async fn rules_package_names(&mut self) -> &HashMap<String, String> {
        if self.rules_package_names.is_none() {
            let api = self.api;
            let listed = paginate(None, |token, max| api.list_rules_packages(token, max)).await;
            let mut failure = listed.error;

            let described = describe_in_batches(&listed.items, DESCRIBE_BATCH_SIZE, |batch| {
                api.describe_rules_packages(batch)
            })
            .await;
            if failure.is_none() {
                failure = described.error;
            }

            let names: HashMap<String, String> = described
                .items
                .into_iter()
                .map(|p| (p.arn, p.name))
                .collect();

            if let Some(e) = failure {
                log_warn!("Rules package names in {} are incomplete: {:#}", self.region, e);
                self.errors.push(AnnotatedError::new(
                    format!("failed to get rules packages in {}", self.region),
                    e,
                ));
            }
            trace_debug!("Resolved {} rules package names in {}", names.len(), self.region);
            self.rules_package_names = Some(names);
        }

        self.rules_package_names.get_or_insert_with(HashMap::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::inspector::pagination::Page;
    use crate::app::inspector::types::{AssessmentRunDetail, AssessmentTemplateDetail, RulesPackage};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// One target, one template, one run with 150 findings across two list pages.
    #[derive(Default)]
    struct SingleTemplateApi {
        no_targets: bool,
        fail_templates: bool,
        fail_runs: bool,
        fail_rules_packages: bool,
        rules_package_calls: AtomicUsize,
        describe_findings_calls: AtomicUsize,
        page_sizes: Mutex<Vec<(&'static str, Option<i32>)>>,
    }

    impl SingleTemplateApi {
        fn record(&self, call: &'static str, max_results: Option<i32>) {
            self.page_sizes.lock().unwrap().push((call, max_results));
        }

        fn page_sizes_for(&self, call: &str) -> Vec<Option<i32>> {
            self.page_sizes
                .lock()
                .unwrap()
                .iter()
                .filter(|(name, _)| *name == call)
                .map(|(_, size)| *size)
                .collect()
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[async_trait]
    impl InspectorApi for SingleTemplateApi {
        async fn list_assessment_targets(&self, _: Option<String>, max: Option<i32>) -> Result<Page<String>> {
            self.record("targets", max);
            if self.no_targets {
                return Ok(Page::last(Vec::new()));
            }
            Ok(Page::last(vec!["target-1".to_string()]))
        }

        async fn list_assessment_templates(
            &self,
            _: &[String],
            _: Option<String>,
            max: Option<i32>,
        ) -> Result<Page<String>> {
            self.record("templates", max);
            if self.fail_templates {
                return Err(anyhow!("AccessDeniedException: inspector:ListAssessmentTemplates"));
            }
            Ok(Page::last(vec!["template-1".to_string()]))
        }

        async fn list_assessment_runs(
            &self,
            _: &[String],
            _: Option<String>,
            max: Option<i32>,
        ) -> Result<Page<String>> {
            self.record("runs", max);
            if self.fail_runs {
                return Err(anyhow!("AccessDeniedException: not allowed"));
            }
            Ok(Page::last(vec!["run-1".to_string()]))
        }

        async fn describe_assessment_runs(&self, arns: Vec<String>) -> Result<Vec<AssessmentRunDetail>> {
            Ok(arns
                .into_iter()
                .map(|arn| AssessmentRunDetail {
                    arn,
                    name: "weekly".to_string(),
                    template_arn: "template-1".to_string(),
                    started_at: Some(now() - Duration::days(2)),
                    completed_at: Some(now() - Duration::days(1)),
                })
                .collect())
        }

        async fn describe_assessment_templates(&self, _: Vec<String>) -> Result<Vec<AssessmentTemplateDetail>> {
            Err(anyhow!("AccessDeniedException: describe denied"))
        }

        async fn list_findings(
            &self,
            _: &[String],
            next_token: Option<String>,
            max: Option<i32>,
        ) -> Result<Page<String>> {
            self.record("findings", max);
            match next_token {
                None => Ok(Page::new(
                    (0..100).map(|i| format!("finding-{}", i)).collect(),
                    Some("page-2".to_string()),
                )),
                Some(_) => Ok(Page::last((100..150).map(|i| format!("finding-{}", i)).collect())),
            }
        }

        async fn describe_findings(&self, arns: Vec<String>) -> Result<Vec<Finding>> {
            self.describe_findings_calls.fetch_add(1, Ordering::SeqCst);
            Ok(arns
                .into_iter()
                .map(|arn| Finding::new(arn).with_rules_package_arn("rp-cve"))
                .collect())
        }

        async fn list_rules_packages(&self, next_token: Option<String>, max: Option<i32>) -> Result<Page<String>> {
            self.record("rules_packages", max);
            self.rules_package_calls.fetch_add(1, Ordering::SeqCst);
            match (self.fail_rules_packages, next_token) {
                (false, _) => Ok(Page::last(vec!["rp-cve".to_string()])),
                (true, None) => Ok(Page::new(vec!["rp-cve".to_string()], Some("page-2".to_string()))),
                (true, Some(_)) => Err(anyhow!("ThrottlingException: rate exceeded")),
            }
        }

        async fn describe_rules_packages(&self, arns: Vec<String>) -> Result<Vec<RulesPackage>> {
            Ok(arns
                .into_iter()
                .map(|arn| RulesPackage {
                    arn,
                    name: "Common Vulnerabilities and Exposures".to_string(),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_findings_are_collected_and_named() {
        let api = SingleTemplateApi::default();
        let outcome = process_region(&api, "eu-west-1", 60, now()).await.unwrap();

        assert!(outcome.errors.is_empty());
        let templates = &outcome.result.template_results;
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].template_name, UNKNOWN_TEMPLATE_NAME);
        assert_eq!(templates[0].runs.len(), 1);

        let findings = &templates[0].runs[0].findings;
        assert_eq!(findings.len(), 150);
        assert!(findings
            .iter()
            .all(|f| f.rules_package_name == "Common Vulnerabilities and Exposures"));
        assert_eq!(api.describe_findings_calls.load(Ordering::SeqCst), 2);
        assert_eq!(api.rules_package_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_template_failure_is_recorded_not_fatal() {
        let api = SingleTemplateApi {
            fail_runs: true,
            ..Default::default()
        };
        let outcome = process_region(&api, "eu-west-1", 60, now()).await.unwrap();

        assert!(outcome.result.template_results.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].description.contains("template-1"));
        assert!(format!("{:#}", outcome.errors[0].error).contains("AccessDeniedException"));
    }

    #[tokio::test]
    async fn test_stale_runs_drop_template() {
        let api = SingleTemplateApi::default();
        let later = now() + Duration::days(30);
        let outcome = process_region(&api, "eu-west-1", 7, later).await.unwrap();
        assert!(outcome.result.template_results.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn test_no_targets_yields_empty_region() {
        let api = SingleTemplateApi {
            no_targets: true,
            ..Default::default()
        };
        let outcome = process_region(&api, "eu-west-1", 60, now()).await.unwrap();

        assert_eq!(outcome.result, RegionResult::empty("eu-west-1"));
        assert!(outcome.errors.is_empty());
        assert!(api.page_sizes_for("templates").is_empty());
    }

    #[tokio::test]
    async fn test_template_listing_failure_fails_region() {
        let api = SingleTemplateApi {
            fail_templates: true,
            ..Default::default()
        };
        let error = process_region(&api, "eu-west-1", 60, now()).await.unwrap_err();

        assert_eq!(error.to_string(), "Failed to list assessment templates in eu-west-1");
        assert!(format!("{:#}", error).contains("AccessDeniedException"));
        assert!(api.page_sizes_for("runs").is_empty());
    }

    #[tokio::test]
    async fn test_rules_package_failure_recorded_once_and_partial_names_used() {
        let api = SingleTemplateApi {
            fail_rules_packages: true,
            ..Default::default()
        };
        let outcome = process_region(&api, "eu-west-1", 60, now()).await.unwrap();

        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].description, "failed to get rules packages in eu-west-1");
        assert!(format!("{:#}", outcome.errors[0].error).contains("ThrottlingException"));

        let findings = &outcome.result.template_results[0].runs[0].findings;
        assert_eq!(findings.len(), 150);
        assert!(findings
            .iter()
            .all(|f| f.rules_package_name == "Common Vulnerabilities and Exposures"));
        assert_eq!(api.rules_package_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_listing_page_sizes() {
        let api = SingleTemplateApi::default();
        process_region(&api, "eu-west-1", 60, now()).await.unwrap();

        assert_eq!(api.page_sizes_for("targets"), vec![Some(10)]);
        assert_eq!(api.page_sizes_for("templates"), vec![Some(10)]);
        assert_eq!(api.page_sizes_for("runs"), vec![Some(10)]);
        assert_eq!(api.page_sizes_for("findings"), vec![Some(100), Some(100)]);
        assert_eq!(api.page_sizes_for("rules_packages"), vec![None]);
    }
}
