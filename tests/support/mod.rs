//! Hand-written doubles for the credential and Inspector seams.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use air::app::inspector::pagination::Page;
use air::app::inspector::{
    AssessmentRunDetail, AssessmentTemplateDetail, AssumeRoleRequest, CredentialSource, Finding,
    InspectorApi, InspectorConnector, RulesPackage,
};

pub fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn static_credentials(key: &str) -> SharedCredentialsProvider {
    SharedCredentialsProvider::new(Credentials::from_keys(key, "secret", None))
}

pub fn regions(names: &[&str]) -> Vec<String> {
    names.iter().map(|r| r.to_string()).collect()
}

/// How one region's mock API behaves.
#[derive(Clone, Debug)]
pub enum RegionBehavior {
    /// One template with one current run holding this many High findings.
    Findings(usize),
    /// Listing targets fails with `message` after `delay_ms`.
    Fail { message: String, delay_ms: u64 },
}

/// Inspector API for one region driven by a [`RegionBehavior`].
pub struct FixtureApi {
    region: String,
    behavior: RegionBehavior,
}

impl FixtureApi {
    pub fn new(region: &str, behavior: RegionBehavior) -> Self {
        Self {
            region: region.to_string(),
            behavior,
        }
    }

    fn template_arn(&self) -> String {
        format!("arn:aws:inspector:{}:111111111111:target/t/template/weekly", self.region)
    }

    fn finding_count(&self) -> usize {
        match self.behavior {
            RegionBehavior::Findings(n) => n,
            RegionBehavior::Fail { .. } => 0,
        }
    }
}

#[async_trait]
impl InspectorApi for FixtureApi {
    async fn list_assessment_targets(&self, _: Option<String>, _: Option<i32>) -> Result<Page<String>> {
        if let RegionBehavior::Fail { message, delay_ms } = &self.behavior {
            tokio::time::sleep(std::time::Duration::from_millis(*delay_ms)).await;
            return Err(anyhow!("{}", message));
        }
        Ok(Page::last(vec![format!("arn:{}:target", self.region)]))
    }

    async fn list_assessment_templates(
        &self,
        _: &[String],
        _: Option<String>,
        _: Option<i32>,
    ) -> Result<Page<String>> {
        Ok(Page::last(vec![self.template_arn()]))
    }

    async fn list_assessment_runs(
        &self,
        _: &[String],
        _: Option<String>,
        _: Option<i32>,
    ) -> Result<Page<String>> {
        Ok(Page::last(vec![format!("{}/run/latest", self.template_arn())]))
    }

    async fn describe_assessment_runs(&self, arns: Vec<String>) -> Result<Vec<AssessmentRunDetail>> {
        Ok(arns
            .into_iter()
            .map(|arn| AssessmentRunDetail {
                arn,
                name: "weekly run".to_string(),
                template_arn: self.template_arn(),
                started_at: Some(now() - Duration::days(3)),
                completed_at: Some(now() - Duration::days(2)),
            })
            .collect())
    }

    async fn describe_assessment_templates(&self, arns: Vec<String>) -> Result<Vec<AssessmentTemplateDetail>> {
        Ok(arns
            .into_iter()
            .map(|arn| AssessmentTemplateDetail {
                arn,
                name: "weekly".to_string(),
            })
            .collect())
    }

    async fn list_findings(
        &self,
        _: &[String],
        _: Option<String>,
        _: Option<i32>,
    ) -> Result<Page<String>> {
        Ok(Page::last(
            (0..self.finding_count())
                .map(|i| format!("arn:{}:finding/{}", self.region, i))
                .collect(),
        ))
    }

    async fn describe_findings(&self, arns: Vec<String>) -> Result<Vec<Finding>> {
        Ok(arns
            .into_iter()
            .map(|arn| {
                Finding::new(arn)
                    .with_title("CVE-2024-0001 - openssl")
                    .with_severity("High")
                    .with_rules_package_arn("arn:rp/cve")
            })
            .collect())
    }

    async fn list_rules_packages(&self, _: Option<String>, _: Option<i32>) -> Result<Page<String>> {
        Ok(Page::last(vec!["arn:rp/cve".to_string()]))
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

/// Connector handing out [`FixtureApi`]s. Regions without an explicit
/// behavior return `default` findings.
pub struct MockConnector {
    behaviors: HashMap<String, RegionBehavior>,
    default: usize,
    pub connections: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(default_findings: usize) -> Self {
        Self {
            behaviors: HashMap::new(),
            default: default_findings,
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn with_region(mut self, region: &str, behavior: RegionBehavior) -> Self {
        self.behaviors.insert(region.to_string(), behavior);
        self
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

#[async_trait]
impl InspectorConnector for MockConnector {
    async fn connect(
        &self,
        _credentials: SharedCredentialsProvider,
        region: &str,
    ) -> Result<Arc<dyn InspectorApi>> {
        self.connections.lock().unwrap().push(region.to_string());
        let behavior = self
            .behaviors
            .get(region)
            .cloned()
            .unwrap_or(RegionBehavior::Findings(self.default));
        Ok(Arc::new(FixtureApi::new(region, behavior)))
    }
}

/// Credential source with scripted failures.
#[derive(Default)]
pub struct MockCredentialSource {
    pub account_id: String,
    pub alias: Option<String>,
    pub ambient_error: Option<String>,
    pub caller_error: Option<String>,
    pub alias_error: Option<String>,
    /// AssumeRole failures keyed by role ARN.
    pub assume_errors: HashMap<String, String>,
    pub assume_calls: AtomicUsize,
    pub deferred_calls: AtomicUsize,
    pub ambient_calls: AtomicUsize,
}

impl MockCredentialSource {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            ..Default::default()
        }
    }

    pub fn failing_assume(mut self, role_arn: &str, message: &str) -> Self {
        self.assume_errors.insert(role_arn.to_string(), message.to_string());
        self
    }
}

#[async_trait]
impl CredentialSource for MockCredentialSource {
    async fn ambient_credentials(&self) -> Result<SharedCredentialsProvider> {
        self.ambient_calls.fetch_add(1, Ordering::SeqCst);
        match &self.ambient_error {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(static_credentials("AMBIENT")),
        }
    }

    async fn caller_account_id(&self, _: &SharedCredentialsProvider) -> Result<String> {
        match &self.caller_error {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(self.account_id.clone()),
        }
    }

    async fn account_alias(&self, _: &SharedCredentialsProvider) -> Result<Option<String>> {
        match &self.alias_error {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(self.alias.clone()),
        }
    }

    async fn assume_role(&self, request: &AssumeRoleRequest) -> Result<SharedCredentialsProvider> {
        self.assume_calls.fetch_add(1, Ordering::SeqCst);
        match self.assume_errors.get(&request.role_arn) {
            Some(message) => Err(anyhow!("{}", message).context("AssumeRole failed")),
            None => Ok(static_credentials("ASSUMED")),
        }
    }

    async fn deferred_assume_role(&self, _: &AssumeRoleRequest) -> Result<SharedCredentialsProvider> {
        self.deferred_calls.fetch_add(1, Ordering::SeqCst);
        Ok(static_credentials("DEFERRED"))
    }
}
