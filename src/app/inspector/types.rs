#![warn(clippy::all, rust_2018_idioms)]

//! Result tree and error records produced by an Inspector collection pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One account to scan, as configured in `targets.yml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default, rename = "roleName")]
    pub role_name: String,
    #[serde(default, rename = "roleExternalId")]
    pub role_external_id: String,
    /// Overrides the role ARN built from `id` and `role_name`.
    #[serde(default, rename = "roleArn", skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
}

impl Target {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_role(mut self, role_name: impl Into<String>, external_id: impl Into<String>) -> Self {
        self.role_name = role_name.into();
        self.role_external_id = external_id.into();
        self
    }

    pub fn with_role_arn(mut self, role_arn: impl Into<String>) -> Self {
        self.role_arn = Some(role_arn.into());
        self
    }

    pub fn role_arn(&self) -> String {
        match &self.role_arn {
            Some(arn) if !arn.is_empty() => arn.clone(),
            _ => format!("arn:aws:iam::{}:role/{}", self.id, self.role_name),
        }
    }

    /// Alias when set, otherwise the account id.
    pub fn display_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.id
        } else {
            &self.alias
        }
    }
}

/// Run detail fields needed for latest-run resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentRunDetail {
    pub arn: String,
    pub name: String,
    pub template_arn: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentTemplateDetail {
    pub arn: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesPackage {
    pub arn: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateIp {
    pub private_dns_name: Option<String>,
    pub private_ip_address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub group_name: Option<String>,
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub network_interface_id: Option<String>,
    pub subnet_id: Option<String>,
    pub vpc_id: Option<String>,
    pub private_dns_name: Option<String>,
    pub private_ip_address: Option<String>,
    pub private_ip_addresses: Vec<PrivateIp>,
    pub public_dns_name: Option<String>,
    pub public_ip: Option<String>,
    pub ipv6_addresses: Vec<String>,
    pub security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAttributes {
    pub schema_version: i32,
    pub agent_id: Option<String>,
    pub ami_id: Option<String>,
    pub auto_scaling_group: Option<String>,
    pub hostname: Option<String>,
    pub ipv4_addresses: Vec<String>,
    pub tags: Vec<Tag>,
    pub network_interfaces: Vec<NetworkInterface>,
}

impl AssetAttributes {
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .and_then(|t| t.value.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAttributes {
    pub schema_version: i32,
    pub assessment_run_arn: Option<String>,
    pub rules_package_arn: Option<String>,
}

/// A normalized Inspector finding.
///
/// Every field except `rules_package_name` and `comment` is copied from the
/// API record; those two start empty and are filled in by the region worker
/// and the severity filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub arn: String,
    pub schema_version: i32,
    pub id: Option<String>,
    pub service: Option<String>,
    pub severity: Option<String>,
    pub numeric_severity: Option<f64>,
    pub confidence: Option<i32>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub recommendation: Option<String>,
    pub asset_type: Option<String>,
    pub asset_attributes: Option<AssetAttributes>,
    pub service_attributes: Option<ServiceAttributes>,
    pub attributes: Vec<Attribute>,
    pub user_attributes: Vec<Attribute>,
    pub indicator_of_compromise: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub rules_package_name: String,
    pub comment: String,
}

impl Finding {
    pub fn new(arn: impl Into<String>) -> Self {
        Self {
            arn: arn.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    pub fn with_rules_package_arn(mut self, arn: impl Into<String>) -> Self {
        self.service_attributes
            .get_or_insert_with(ServiceAttributes::default)
            .rules_package_arn = Some(arn.into());
        self
    }

    pub fn rules_package_arn(&self) -> Option<&str> {
        self.service_attributes
            .as_ref()
            .and_then(|s| s.rules_package_arn.as_deref())
    }
}

/// One resolved run and its findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_arn: String,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionTemplateResult {
    pub template_arn: String,
    pub template_name: String,
    pub runs: Vec<RunResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionResult {
    pub region: String,
    pub template_results: Vec<RegionTemplateResult>,
}

impl RegionResult {
    pub fn empty(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            template_results: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountResult {
    pub account_id: String,
    pub account_alias: String,
    pub region_results: Vec<RegionResult>,
}

impl AccountResult {
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.region_results
            .iter()
            .flat_map(|r| r.template_results.iter())
            .flat_map(|t| t.runs.iter())
            .flat_map(|r| r.findings.iter())
    }

    pub fn findings_mut(&mut self) -> impl Iterator<Item = &mut Finding> {
        self.region_results
            .iter_mut()
            .flat_map(|r| r.template_results.iter_mut())
            .flat_map(|t| t.runs.iter_mut())
            .flat_map(|r| r.findings.iter_mut())
    }
}

/// Full result tree, in account-processing order.
pub type AccountsResults = Vec<AccountResult>;

pub fn has_findings(results: &[AccountResult]) -> bool {
    results.iter().any(|a| a.findings().next().is_some())
}

/// Finding counts per severity, for log output.
pub fn severity_counts(results: &[AccountResult]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for finding in results.iter().flat_map(|a| a.findings()) {
        let severity = finding.severity.clone().unwrap_or_else(|| "-".to_string());
        *counts.entry(severity).or_insert(0) += 1;
    }
    counts
}

/// A failure paired with a human readable description of what was attempted.
#[derive(Debug)]
pub struct AnnotatedError {
    pub description: String,
    pub error: anyhow::Error,
}

impl AnnotatedError {
    pub fn new(description: impl Into<String>, error: anyhow::Error) -> Self {
        Self {
            description: description.into(),
            error,
        }
    }
}

impl fmt::Display for AnnotatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.description, self.error)
    }
}

/// Errors recorded while processing one account. Every attempted account gets
/// exactly one of these, even when `errors` is empty.
#[derive(Debug)]
pub struct TargetErrors {
    pub target: Target,
    pub errors: Vec<AnnotatedError>,
}

impl TargetErrors {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            errors: Vec::new(),
        }
    }

    pub fn push(&mut self, description: impl Into<String>, error: anyhow::Error) {
        self.errors.push(AnnotatedError::new(description, error));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn any_target_errors(errors: &[TargetErrors]) -> bool {
    errors.iter().any(|t| !t.is_empty())
}

/// Output of a full collection pass.
#[derive(Debug, Default)]
pub struct Collection {
    pub results: AccountsResults,
    pub errors: Vec<TargetErrors>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_arn_is_built_from_id_and_role_name() {
        let target = Target::new("123456789012").with_role("audit", "ext");
        assert_eq!(target.role_arn(), "arn:aws:iam::123456789012:role/audit");
    }

    #[test]
    fn test_explicit_role_arn_wins() {
        let target = Target::new("123456789012")
            .with_role("audit", "")
            .with_role_arn("arn:aws:iam::123456789012:role/path/custom");
        assert_eq!(target.role_arn(), "arn:aws:iam::123456789012:role/path/custom");
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        assert_eq!(Target::new("111").display_name(), "111");
        assert_eq!(Target::new("111").with_alias("prod").display_name(), "prod");
    }

    #[test]
    fn test_has_findings_walks_whole_tree() {
        let mut account = AccountResult {
            account_id: "1".into(),
            account_alias: String::new(),
            region_results: vec![RegionResult {
                region: "eu-west-1".into(),
                template_results: vec![RegionTemplateResult {
                    template_arn: "t".into(),
                    template_name: "n".into(),
                    runs: vec![RunResult {
                        run_arn: "r".into(),
                        findings: vec![],
                    }],
                }],
            }],
        };
        assert!(!has_findings(std::slice::from_ref(&account)));

        account.region_results[0].template_results[0].runs[0]
            .findings
            .push(Finding::new("f").with_severity("High"));
        assert!(has_findings(std::slice::from_ref(&account)));
        assert_eq!(severity_counts(&[account]).get("High"), Some(&1));
    }

    #[test]
    fn test_any_target_errors() {
        let ok = TargetErrors::new(Target::new("1"));
        let mut failed = TargetErrors::new(Target::new("2"));
        assert!(!any_target_errors(std::slice::from_ref(&ok)));
        failed.push("failed to assume role", anyhow::anyhow!("AccessDenied"));
        assert!(any_target_errors(&[ok, failed]));
    }
}
