#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatPattern, Note, Workbook, Worksheet};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::rows::{account_rows, ReportRow};
use crate::app::inspector::types::AccountResult;

const HEADERS: [&str; 11] = [
    "SEVERITY",
    "REGION",
    "TEMPLATE",
    "DATE",
    "INSTANCE ID",
    "INSTANCE NAME",
    "ASG",
    "RULES PACKAGE",
    "TITLE",
    "DESCRIPTION",
    "RECOMMENDATION",
];

const COLUMN_WIDTHS: [f64; 11] = [15.0, 13.5, 26.0, 22.5, 19.0, 24.0, 20.0, 44.0, 60.0, 70.0, 150.0];

/// Autofilter covers SEVERITY through RULES PACKAGE.
const AUTOFILTER_LAST_COLUMN: u16 = 7;

const MAX_SHEET_NAME_LEN: usize = 31;

struct Styles {
    header: Format,
    high: Format,
    medium: Format,
    low: Format,
    informational: Format,
    centered: Format,
}

impl Styles {
    fn new() -> Self {
        let severity = |rgb: u32| {
            Format::new()
                .set_bold()
                .set_font_name("Calibri")
                .set_font_size(12)
                .set_font_color(Color::RGB(rgb))
                .set_align(FormatAlign::Center)
        };

        Self {
            header: Format::new()
                .set_bold()
                .set_font_name("Calibri")
                .set_font_size(14)
                .set_font_color(Color::RGB(0xf2f2f2))
                .set_background_color(Color::RGB(0x000066))
                .set_pattern(FormatPattern::Solid)
                .set_align(FormatAlign::Center),
            high: severity(0xcc0000),
            medium: severity(0xcc6600),
            low: severity(0x003399),
            informational: severity(0x000000),
            centered: Format::new()
                .set_font_name("Calibri")
                .set_font_size(12)
                .set_align(FormatAlign::Center)
                .set_text_wrap(),
        }
    }

    fn for_severity(&self, severity: &str) -> Option<&Format> {
        match severity {
            "HIGH" => Some(&self.high),
            "MEDIUM" => Some(&self.medium),
            "LOW" => Some(&self.low),
            "INFORMATIONAL" | "IGNORED" => Some(&self.informational),
            _ => None,
        }
    }
}

/// Report file name for a run started at `now`.
pub fn report_file_name(now: DateTime<Utc>) -> String {
    format!("inspector_report_{}.xlsx", now.format("%Y%m%d%H%M%S"))
}

/// Writes one sheet per account that has findings into
/// `<output_dir>/inspector_report_<timestamp>.xlsx` and returns its absolute
/// path.
pub fn generate_spreadsheet(
    results: &[AccountResult],
    output_dir: &Path,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    let styles = Styles::new();
    let mut workbook = Workbook::new();
    let mut used_names = HashSet::new();
    let mut sheets = 0;

    for account in results {
        let rows = account_rows(account);
        if rows.is_empty() {
            trace_debug!("No rows for account {}", account.account_id);
            continue;
        }

        let base = if account.account_alias.is_empty() {
            &account.account_id
        } else {
            &account.account_alias
        };
        let name = unique_sheet_name(base, &mut used_names);

        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&name)
            .with_context(|| format!("Failed to name sheet '{}'", name))?;
        write_account_sheet(worksheet, &rows, &styles)
            .with_context(|| format!("Failed to write sheet '{}'", name))?;

        log_debug!("Wrote {} rows to sheet '{}'", rows.len(), name);
        sheets += 1;
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
    let path = output_dir.join(report_file_name(now));
    workbook
        .save(&path)
        .with_context(|| format!("Failed to save report {}", path.display()))?;

    let path = std::fs::canonicalize(&path).unwrap_or(path);
    log_info!("Saved report with {} sheet(s) to {}", sheets, path.display());
    Ok(path)
}

fn write_account_sheet(worksheet: &mut Worksheet, rows: &[ReportRow], styles: &Styles) -> Result<()> {
    for (col, (header, width)) in HEADERS.iter().zip(COLUMN_WIDTHS).enumerate() {
        let col = col as u16;
        worksheet.write_string_with_format(0, col, *header, &styles.header)?;
        worksheet.set_column_width(col, width)?;
    }

    for (index, row) in rows.iter().enumerate() {
        let r = index as u32 + 1;

        match styles.for_severity(&row.severity) {
            Some(format) => worksheet.write_string_with_format(r, 0, &row.severity, format)?,
            None => worksheet.write_string(r, 0, &row.severity)?,
        };
        if !row.comment.is_empty() {
            worksheet.insert_note(r, 0, &Note::new(&row.comment).set_author("-"))?;
        }

        worksheet.write_string_with_format(r, 1, &row.region, &styles.centered)?;
        worksheet.write_string(r, 2, &row.template_name)?;
        worksheet.write_string(r, 3, row.date())?;
        worksheet.write_string_with_format(r, 4, &row.instance_id, &styles.centered)?;
        worksheet.write_string_with_format(r, 5, &row.instance_name, &styles.centered)?;
        worksheet.write_string_with_format(r, 6, &row.asg_name, &styles.centered)?;
        worksheet.write_string(r, 7, &row.rules_package_name)?;
        worksheet.write_string(r, 8, &row.title)?;
        worksheet.write_string(r, 9, &row.description)?;
        worksheet.write_string(r, 10, &row.recommendation)?;
    }

    worksheet.autofilter(0, 0, rows.len() as u32, AUTOFILTER_LAST_COLUMN)?;
    Ok(())
}

/// Makes `base` a legal sheet name and unique within `used`.
pub fn unique_sheet_name(base: &str, used: &mut HashSet<String>) -> String {
    let clean = sanitize_sheet_name(base);
    let mut candidate = clean.clone();
    let mut n = 2;
    while !used.insert(candidate.to_lowercase()) {
        let suffix = format!(" ({})", n);
        let keep = MAX_SHEET_NAME_LEN.saturating_sub(suffix.chars().count());
        candidate = format!("{}{}", clean.chars().take(keep).collect::<String>(), suffix);
        n += 1;
    }
    candidate
}

/// Replaces characters Excel rejects and truncates to 31 characters.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            other => other,
        })
        .take(MAX_SHEET_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim_matches('\'').to_string();
    if cleaned.trim().is_empty() {
        "account".to_string()
    } else {
        cleaned
    }
}
