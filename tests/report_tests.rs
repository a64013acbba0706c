#[cfg(test)]
mod report_tests {
    use air::app::config::{parse_filters, Filter};
    use air::app::filters::apply_filters;
    use air::app::inspector::{
        severity_counts, AccountResult, Finding, RegionResult, RegionTemplateResult, RunResult,
        Target, TargetErrors,
    };
    use air::app::report::{account_rows, generate_spreadsheet, report_file_name};
    use air::app::runner::format_error_summary;
    use anyhow::anyhow;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;

    fn results() -> Vec<AccountResult> {
        let findings = vec![
            Finding::new("f1").with_title("TLS 1.0 enabled").with_severity("High"),
            Finding::new("f2").with_title("CVE-2024-1234").with_severity("Medium"),
            Finding::new("f3").with_title("Root login over SSH").with_severity("Low"),
        ];
        vec![AccountResult {
            account_id: "123456789012".to_string(),
            account_alias: "prod".to_string(),
            region_results: vec![RegionResult {
                region: "us-east-1".to_string(),
                template_results: vec![RegionTemplateResult {
                    template_arn: "arn:template".to_string(),
                    template_name: "weekly".to_string(),
                    runs: vec![RunResult {
                        run_arn: "arn:run".to_string(),
                        findings,
                    }],
                }],
            }],
        }]
    }

    #[test]
    fn test_filters_then_rows_reflect_overrides() {
        let mut results = results();
        let filters: Vec<Filter> = parse_filters(
            "- title-match: \"^TLS\"\n  severity: Informational\n  comment: internal only\n",
        )
        .unwrap();

        assert_eq!(apply_filters(&mut results, &filters).unwrap(), 1);

        let rows = account_rows(&results[0]);
        let order: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.severity.as_str(), r.title.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("MEDIUM", "CVE-2024-1234"),
                ("LOW", "Root login over SSH"),
                ("INFORMATIONAL", "TLS 1.0 enabled"),
            ]
        );
        assert_eq!(rows[2].comment, "internal only");

        let counts = severity_counts(&results);
        assert_eq!(counts.get("Informational"), Some(&1));
    }

    #[test]
    fn test_spreadsheet_written_to_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("reports");
        let now: DateTime<Utc> = DateTime::parse_from_rfc3339("2024-06-01T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let path = generate_spreadsheet(&results(), &output, now).unwrap();

        assert!(path.is_absolute());
        assert!(path.exists());
        assert!(path.ends_with(report_file_name(now)));
        assert_eq!(report_file_name(now), "inspector_report_20240601083000.xlsx");
    }

    #[test]
    fn test_summary_format() {
        let mut errors = TargetErrors::new(Target::new("123456789012").with_alias("prod"));
        errors.push("failed to get region results", anyhow!("ThrottlingException: slow down"));

        let summary = format_error_summary(&[errors]);
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Errors encountered during processing...",
                "Account: 123456789012 (prod)",
                "  Issue: failed to get region results",
                "  Detail: ThrottlingException: slow down",
            ]
        );
    }
}
