//! AIR - AWS Inspector Reporter
//!
//! Collects findings from AWS Inspector (Classic) across many accounts and
//! every Inspector region, keeps only each assessment template's latest
//! current run, and writes the results to a spreadsheet that can be emailed.
//!
//! # Architecture Overview
//!
//! - **Collection** ([`app::inspector`]): credentials per account, concurrent
//!   region workers, pagination and batching of the Inspector API
//! - **Configuration** ([`app::config`]): targets, filters and report settings
//!   from a local directory or S3
//! - **Post-processing** ([`app::filters`], [`app::report`], [`app::email`])
//! - **Entry point** ([`app::runner::run`]): one complete pass, used by the
//!   `air` binary
//!
//! Failures while collecting are recorded per account rather than aborting
//! the pass; see [`app::inspector::types::TargetErrors`].

#![warn(clippy::all, rust_2018_idioms)]

// Include logging macros first
#[macro_use]
pub mod logging_macros;

pub mod app;
