#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt::Write as _;
use std::sync::Arc;

use super::config::{load_config, AppConfig};
use super::email::email_report;
use super::filters::apply_filters;
use super::inspector::types::{any_target_errors, has_findings, severity_counts, TargetErrors};
use super::inspector::{AwsCredentialSource, Collector, SdkInspectorConnector};
use super::report::generate_spreadsheet;

pub const NO_FINDINGS_MESSAGE: &str = "No findings found.";
const SUMMARY_HEADER: &str = "Errors encountered during processing...";

/// One full pass: load configuration, collect findings from every target,
/// apply filters, write and optionally email the report, then print the
/// error summary.
///
/// Collection errors never fail the run; they end up in the summary. Errors
/// from configuration loading or from the reporting steps are returned.
pub async fn run(app: &AppConfig) -> Result<()> {
    let started = Utc::now();
    let source = AwsCredentialSource::from_environment().await;
    let sdk_config = source.sdk_config().clone();

    let config = load_config(app, &sdk_config)
        .await
        .with_context(|| format!("Failed to load configuration from {}", app.config_path))?;

    let collector = Collector::new(Arc::new(source), Arc::new(SdkInspectorConnector))
        .with_max_report_age(app.max_report_age)
        .with_now(started);
    let mut collection = collector.collect(&config.targets).await;

    if has_findings(&collection.results) {
        for (severity, count) in severity_counts(&collection.results) {
            log_info!("{} {} finding(s)", count, severity);
        }

        apply_filters(&mut collection.results, &config.filters).context("Failed to apply filters")?;

        let report_path = generate_spreadsheet(&collection.results, &app.output_dir, started)
            .context("Failed to generate report")?;
        println!("Report written to {}", report_path.display());

        if let Some(email) = &config.report.email {
            email_report(&sdk_config, &report_path, email, app.delete_after_email)
                .await
                .context("Failed to email report")?;
            println!("Report emailed to {}", email.recipients.join(", "));
        }
    } else {
        println!("{}", NO_FINDINGS_MESSAGE);
    }

    if any_target_errors(&collection.errors) {
        print!("{}", format_error_summary(&collection.errors));
    }

    log_info!(
        "Finished in {}s",
        (Utc::now() - started).num_seconds()
    );
    Ok(())
}

/// Renders recorded errors per account. Accounts without errors are omitted.
pub fn format_error_summary(errors: &[TargetErrors]) -> String {
    let mut out = String::new();
    if !any_target_errors(errors) {
        return out;
    }

    let _ = writeln!(out, "{}", SUMMARY_HEADER);
    for target_errors in errors.iter().filter(|t| !t.is_empty()) {
        let target = &target_errors.target;
        let _ = writeln!(out, "Account: {} ({})", target.id, target.alias);
        for error in &target_errors.errors {
            let _ = writeln!(out, "  Issue: {}", error.description);
            let _ = writeln!(out, "  Detail: {:#}", error.error);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::inspector::types::Target;
    use anyhow::anyhow;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_summary_lists_only_failed_accounts() {
        let mut failed = TargetErrors::new(Target::new("111111111111").with_alias("prod"));
        failed.push(
            "failed to assume role",
            anyhow!("AccessDenied: not authorized").context("AssumeRole failed"),
        );
        failed.push("failed to get region results", anyhow!("boom"));
        let clean = TargetErrors::new(Target::new("222222222222").with_alias("dev"));

        let summary = format_error_summary(&[failed, clean]);
        assert_eq!(
            summary,
            "Errors encountered during processing...\n\
             Account: 111111111111 (prod)\n  \
             Issue: failed to assume role\n  \
             Detail: AssumeRole failed: AccessDenied: not authorized\n  \
             Issue: failed to get region results\n  \
             Detail: boom\n"
        );
    }

    #[test]
    fn test_error_summary_empty_without_errors() {
        let clean = TargetErrors::new(Target::new("222222222222"));
        assert_eq!(format_error_summary(&[clean]), "");
        assert_eq!(format_error_summary(&[]), "");
    }
}
