//! Core application modules for AIR.
//!
//! # Module Organization
//!
//! - [`inspector`] - multi-account, multi-region Inspector collection
//! - [`config`] - application settings and YAML configuration files
//! - [`filters`] - severity overrides by finding title
//! - [`report`] - spreadsheet generation
//! - [`email`] - report delivery through SES or SMTP
//! - [`runner`] - one complete collection and reporting pass

pub mod config;
pub mod email;
pub mod filters;
pub mod inspector;
pub mod report;
pub mod runner;
