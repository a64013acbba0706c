//! Spreadsheet report of collected findings.
//!
//! [`rows`] turns each account's findings into display rows sorted by
//! severity; [`spreadsheet`] writes those rows into one workbook sheet per
//! account.

pub mod rows;
pub mod spreadsheet;

pub use rows::{account_rows, ReportRow};
pub use spreadsheet::{generate_spreadsheet, report_file_name};
