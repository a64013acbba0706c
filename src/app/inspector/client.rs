//! Inspector API seam and its AWS SDK implementation.

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_inspector as inspector;
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::pagination::Page;
use super::sdk_errors::SdkResultExt;
use super::types::{
    AssessmentRunDetail, AssessmentTemplateDetail, AssetAttributes, Attribute, Finding,
    NetworkInterface, PrivateIp, RulesPackage, SecurityGroup, ServiceAttributes, Tag,
};

/// The subset of the Inspector API used by the region worker.
///
/// Listing calls take the previous page's token and a page size and return a
/// [`Page`] of ARNs. Describe calls take one batch of ARNs; batching is the
/// caller's job.
#[async_trait]
pub trait InspectorApi: Send + Sync {
    async fn list_assessment_targets(
        &self,
        next_token: Option<String>,
        max_results: Option<i32>,
    ) -> Result<Page<String>>;

    async fn list_assessment_templates(
        &self,
        target_arns: &[String],
        next_token: Option<String>,
        max_results: Option<i32>,
    ) -> Result<Page<String>>;

    async fn list_assessment_runs(
        &self,
        template_arns: &[String],
        next_token: Option<String>,
        max_results: Option<i32>,
    ) -> Result<Page<String>>;

    async fn describe_assessment_runs(&self, run_arns: Vec<String>) -> Result<Vec<AssessmentRunDetail>>;

    async fn describe_assessment_templates(
        &self,
        template_arns: Vec<String>,
    ) -> Result<Vec<AssessmentTemplateDetail>>;

    async fn list_findings(
        &self,
        run_arns: &[String],
        next_token: Option<String>,
        max_results: Option<i32>,
    ) -> Result<Page<String>>;

    async fn describe_findings(&self, finding_arns: Vec<String>) -> Result<Vec<Finding>>;

    async fn list_rules_packages(
        &self,
        next_token: Option<String>,
        max_results: Option<i32>,
    ) -> Result<Page<String>>;

    async fn describe_rules_packages(&self, rules_package_arns: Vec<String>) -> Result<Vec<RulesPackage>>;
}

/// Builds a regional [`InspectorApi`] for one set of credentials.
#[async_trait]
pub trait InspectorConnector: Send + Sync {
    async fn connect(
        &self,
        credentials: SharedCredentialsProvider,
        region: &str,
    ) -> Result<Arc<dyn InspectorApi>>;
}

/// Connector producing [`SdkInspectorClient`]s.
#[derive(Debug, Clone, Default)]
pub struct SdkInspectorConnector;

#[async_trait]
impl InspectorConnector for SdkInspectorConnector {
    async fn connect(
        &self,
        credentials: SharedCredentialsProvider,
        region: &str,
    ) -> Result<Arc<dyn InspectorApi>> {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .load()
            .await;

        trace_debug!("Created Inspector client for region {}", region);
        Ok(Arc::new(SdkInspectorClient::new(inspector::Client::new(&config))))
    }
}

/// [`InspectorApi`] backed by the AWS SDK client.
#[derive(Clone)]
pub struct SdkInspectorClient {
    client: inspector::Client,
}

impl SdkInspectorClient {
    pub fn new(client: inspector::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InspectorApi for SdkInspectorClient {
    async fn list_assessment_targets(
        &self,
        next_token: Option<String>,
        max_results: Option<i32>,
    ) -> Result<Page<String>> {
        let response = self
            .client
            .list_assessment_targets()
            .set_next_token(next_token)
            .set_max_results(max_results)
            .send()
            .await
            .sdk_context("ListAssessmentTargets")?;

        Ok(Page::new(
            response.assessment_target_arns().to_vec(),
            response.next_token().map(str::to_string),
        ))
    }

    async fn list_assessment_templates(
        &self,
        target_arns: &[String],
        next_token: Option<String>,
        max_results: Option<i32>,
    ) -> Result<Page<String>> {
        let response = self
            .client
            .list_assessment_templates()
            .set_assessment_target_arns(Some(target_arns.to_vec()))
            .set_next_token(next_token)
            .set_max_results(max_results)
            .send()
            .await
            .sdk_context("ListAssessmentTemplates")?;

        Ok(Page::new(
            response.assessment_template_arns().to_vec(),
            response.next_token().map(str::to_string),
        ))
    }

    async fn list_assessment_runs(
        &self,
        template_arns: &[String],
        next_token: Option<String>,
        max_results: Option<i32>,
    ) -> Result<Page<String>> {
        let response = self
            .client
            .list_assessment_runs()
            .set_assessment_template_arns(Some(template_arns.to_vec()))
            .set_next_token(next_token)
            .set_max_results(max_results)
            .send()
            .await
            .sdk_context("ListAssessmentRuns")?;

        Ok(Page::new(
            response.assessment_run_arns().to_vec(),
            response.next_token().map(str::to_string),
        ))
    }

    async fn describe_assessment_runs(&self, run_arns: Vec<String>) -> Result<Vec<AssessmentRunDetail>> {
        let response = self
            .client
            .describe_assessment_runs()
            .set_assessment_run_arns(Some(run_arns))
            .send()
            .await
            .sdk_context("DescribeAssessmentRuns")?;

        Ok(response
            .assessment_runs()
            .iter()
            .map(AssessmentRunDetail::from)
            .collect())
    }

    async fn describe_assessment_templates(
        &self,
        template_arns: Vec<String>,
    ) -> Result<Vec<AssessmentTemplateDetail>> {
        let response = self
            .client
            .describe_assessment_templates()
            .set_assessment_template_arns(Some(template_arns))
            .send()
            .await
            .sdk_context("DescribeAssessmentTemplates")?;

        Ok(response
            .assessment_templates()
            .iter()
            .map(|t| AssessmentTemplateDetail {
                arn: t.arn().to_string(),
                name: t.name().to_string(),
            })
            .collect())
    }

    async fn list_findings(
        &self,
        run_arns: &[String],
        next_token: Option<String>,
        max_results: Option<i32>,
    ) -> Result<Page<String>> {
        let response = self
            .client
            .list_findings()
            .set_assessment_run_arns(Some(run_arns.to_vec()))
            .set_next_token(next_token)
            .set_max_results(max_results)
            .send()
            .await
            .sdk_context("ListFindings")?;

        Ok(Page::new(
            response.finding_arns().to_vec(),
            response.next_token().map(str::to_string),
        ))
    }

    async fn describe_findings(&self, finding_arns: Vec<String>) -> Result<Vec<Finding>> {
        let requested = finding_arns.len();
        let response = self
            .client
            .describe_findings()
            .set_finding_arns(Some(finding_arns))
            .send()
            .await
            .sdk_context("DescribeFindings")?;

        if !response.failed_items().is_empty() {
            log_warn!(
                "DescribeFindings could not describe {} of {} findings",
                response.failed_items().len(),
                requested
            );
        }

        Ok(response.findings().iter().map(Finding::from).collect())
    }

    async fn list_rules_packages(
        &self,
        next_token: Option<String>,
        max_results: Option<i32>,
    ) -> Result<Page<String>> {
        let response = self
            .client
            .list_rules_packages()
            .set_next_token(next_token)
            .set_max_results(max_results)
            .send()
            .await
            .sdk_context("ListRulesPackages")?;

        Ok(Page::new(
            response.rules_package_arns().to_vec(),
            response.next_token().map(str::to_string),
        ))
    }

    async fn describe_rules_packages(&self, rules_package_arns: Vec<String>) -> Result<Vec<RulesPackage>> {
        let response = self
            .client
            .describe_rules_packages()
            .set_rules_package_arns(Some(rules_package_arns))
            .send()
            .await
            .sdk_context("DescribeRulesPackages")?;

        Ok(response
            .rules_packages()
            .iter()
            .map(|p| RulesPackage {
                arn: p.arn().to_string(),
                name: p.name().to_string(),
            })
            .collect())
    }
}

fn to_utc(dt: &aws_smithy_types::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

impl From<&inspector::types::AssessmentRun> for AssessmentRunDetail {
    fn from(run: &inspector::types::AssessmentRun) -> Self {
        Self {
            arn: run.arn().to_string(),
            name: run.name().to_string(),
            template_arn: run.assessment_template_arn().to_string(),
            started_at: run.started_at().and_then(to_utc),
            completed_at: run.completed_at().and_then(to_utc),
        }
    }
}

impl From<&inspector::types::Attribute> for Attribute {
    fn from(attr: &inspector::types::Attribute) -> Self {
        Self {
            key: attr.key().to_string(),
            value: attr.value().map(str::to_string),
        }
    }
}

impl From<&inspector::types::Tag> for Tag {
    fn from(tag: &inspector::types::Tag) -> Self {
        Self {
            key: tag.key().to_string(),
            value: tag.value().map(str::to_string),
        }
    }
}

impl From<&inspector::types::PrivateIp> for PrivateIp {
    fn from(ip: &inspector::types::PrivateIp) -> Self {
        Self {
            private_dns_name: ip.private_dns_name().map(str::to_string),
            private_ip_address: ip.private_ip_address().map(str::to_string),
        }
    }
}

impl From<&inspector::types::SecurityGroup> for SecurityGroup {
    fn from(group: &inspector::types::SecurityGroup) -> Self {
        Self {
            group_name: group.group_name().map(str::to_string),
            group_id: group.group_id().map(str::to_string),
        }
    }
}

impl From<&inspector::types::NetworkInterface> for NetworkInterface {
    fn from(eni: &inspector::types::NetworkInterface) -> Self {
        Self {
            network_interface_id: eni.network_interface_id().map(str::to_string),
            subnet_id: eni.subnet_id().map(str::to_string),
            vpc_id: eni.vpc_id().map(str::to_string),
            private_dns_name: eni.private_dns_name().map(str::to_string),
            private_ip_address: eni.private_ip_address().map(str::to_string),
            private_ip_addresses: eni.private_ip_addresses().iter().map(PrivateIp::from).collect(),
            public_dns_name: eni.public_dns_name().map(str::to_string),
            public_ip: eni.public_ip().map(str::to_string),
            ipv6_addresses: eni.ipv6_addresses().to_vec(),
            security_groups: eni.security_groups().iter().map(SecurityGroup::from).collect(),
        }
    }
}

impl From<&inspector::types::AssetAttributes> for AssetAttributes {
    fn from(asset: &inspector::types::AssetAttributes) -> Self {
        Self {
            schema_version: asset.schema_version(),
            agent_id: asset.agent_id().map(str::to_string),
            ami_id: asset.ami_id().map(str::to_string),
            auto_scaling_group: asset.auto_scaling_group().map(str::to_string),
            hostname: asset.hostname().map(str::to_string),
            ipv4_addresses: asset.ipv4_addresses().to_vec(),
            tags: asset.tags().iter().map(Tag::from).collect(),
            network_interfaces: asset
                .network_interfaces()
                .iter()
                .map(NetworkInterface::from)
                .collect(),
        }
    }
}

impl From<&inspector::types::InspectorServiceAttributes> for ServiceAttributes {
    fn from(attrs: &inspector::types::InspectorServiceAttributes) -> Self {
        Self {
            schema_version: attrs.schema_version(),
            assessment_run_arn: attrs.assessment_run_arn().map(str::to_string),
            rules_package_arn: attrs.rules_package_arn().map(str::to_string),
        }
    }
}

/// Copies every field of the API record. The rules package name and comment
/// start empty.
impl From<&inspector::types::Finding> for Finding {
    fn from(f: &inspector::types::Finding) -> Self {
        Self {
            arn: f.arn().to_string(),
            schema_version: f.schema_version(),
            id: f.id().map(str::to_string),
            service: f.service().map(str::to_string),
            severity: f.severity().map(|s| s.as_str().to_string()),
            numeric_severity: Some(f.numeric_severity()),
            confidence: Some(f.confidence()),
            title: f.title().map(str::to_string),
            description: f.description().map(str::to_string),
            recommendation: f.recommendation().map(str::to_string),
            asset_type: f.asset_type().map(|a| a.as_str().to_string()),
            asset_attributes: f.asset_attributes().map(AssetAttributes::from),
            service_attributes: f.service_attributes().map(ServiceAttributes::from),
            attributes: f.attributes().iter().map(Attribute::from).collect(),
            user_attributes: f.user_attributes().iter().map(Attribute::from).collect(),
            indicator_of_compromise: f.indicator_of_compromise(),
            created_at: to_utc(f.created_at()),
            updated_at: to_utc(f.updated_at()),
            rules_package_name: String::new(),
            comment: String::new(),
        }
    }
}
