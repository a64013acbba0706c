#![warn(clippy::all, rust_2018_idioms)]

use chrono::{DateTime, Utc};

use crate::app::inspector::types::{AccountResult, Finding};

/// Shown for a missing instance name or ASG.
pub const MISSING: &str = "-";

/// One spreadsheet row, built from a finding and where it was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportRow {
    pub severity: String,
    pub region: String,
    pub template_name: String,
    pub template_arn: String,
    pub created_at: Option<DateTime<Utc>>,
    pub instance_id: String,
    pub instance_name: String,
    pub ami_id: String,
    pub asg_name: String,
    pub rules_package_arn: String,
    pub rules_package_name: String,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub comment: String,
}

impl ReportRow {
    fn from_finding(region: &str, template_arn: &str, template_name: &str, finding: &Finding) -> Self {
        let asset = finding.asset_attributes.as_ref();
        Self {
            severity: finding.severity.as_deref().unwrap_or_default().to_uppercase(),
            region: region.to_string(),
            template_name: template_name.to_string(),
            template_arn: template_arn.to_string(),
            created_at: finding.created_at,
            instance_id: asset
                .and_then(|a| a.agent_id.clone())
                .unwrap_or_default(),
            instance_name: instance_name(finding).to_string(),
            ami_id: asset.and_then(|a| a.ami_id.clone()).unwrap_or_default(),
            asg_name: asset
                .and_then(|a| a.auto_scaling_group.clone())
                .unwrap_or_else(|| MISSING.to_string()),
            rules_package_arn: finding.rules_package_arn().unwrap_or_default().to_string(),
            rules_package_name: finding.rules_package_name.clone(),
            title: format_title(finding.title.as_deref().unwrap_or_default()),
            description: format_description(finding.description.as_deref().unwrap_or_default()),
            recommendation: format_recommendation(finding.recommendation.as_deref().unwrap_or_default()),
            comment: finding.comment.clone(),
        }
    }

    /// Creation date as shown in the DATE column.
    pub fn date(&self) -> String {
        self.created_at
            .map(|t| t.format("%a %b %e %H:%M:%S %Y").to_string())
            .unwrap_or_default()
    }
}

/// Rank used for ordering rows, highest first. Unknown severities sort last.
pub fn severity_rank(severity: &str) -> u8 {
    match severity {
        "HIGH" => 4,
        "MEDIUM" => 3,
        "LOW" => 2,
        "INFORMATIONAL" => 1,
        _ => 0,
    }
}

/// Flattens an account's findings into rows sorted by severity. Rows of
/// equal severity keep region, template and run order.
pub fn account_rows(account: &AccountResult) -> Vec<ReportRow> {
    let mut rows: Vec<ReportRow> = account
        .region_results
        .iter()
        .flat_map(|region| {
            region.template_results.iter().flat_map(move |template| {
                template.runs.iter().flat_map(move |run| {
                    run.findings.iter().map(move |finding| {
                        ReportRow::from_finding(
                            &region.region,
                            &template.template_arn,
                            &template.template_name,
                            finding,
                        )
                    })
                })
            })
        })
        .collect();

    rows.sort_by(|a, b| severity_rank(&b.severity).cmp(&severity_rank(&a.severity)));
    rows
}

/// Value of the instance's `Name` tag, or `-`.
pub fn instance_name(finding: &Finding) -> &str {
    finding
        .asset_attributes
        .as_ref()
        .and_then(|a| a.tag_value("Name"))
        .unwrap_or(MISSING)
}

fn join_trimmed_lines<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    lines
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\r\n")
}

pub fn format_title(input: &str) -> String {
    join_trimmed_lines(input.split('\n'))
}

/// Like [`format_title`], also dropping a leading `Description` label from
/// each line.
pub fn format_description(input: &str) -> String {
    join_trimmed_lines(
        input
            .split('\n')
            .map(|line| line.strip_prefix("Description").unwrap_or(line)),
    )
}

pub fn format_recommendation(input: &str) -> String {
    join_trimmed_lines(input.split('\n'))
}
