#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashMap;

use super::config::Filter;
use super::inspector::types::AccountResult;

/// Compiled title patterns, keyed by their source text. Built once per
/// filtering pass.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: HashMap<String, Regex>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, pattern: &str) -> Result<&Regex> {
        if !self.compiled.contains_key(pattern) {
            let regex = Regex::new(pattern)
                .with_context(|| format!("invalid title-match pattern '{}'", pattern))?;
            self.compiled.insert(pattern.to_string(), regex);
        }
        self.compiled
            .get(pattern)
            .with_context(|| format!("pattern '{}' missing from cache", pattern))
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Overrides severity and comment on every finding whose title matches a
/// filter. The first matching filter wins. Returns how many findings changed.
pub fn apply_filters(results: &mut [AccountResult], filters: &[Filter]) -> Result<usize> {
    let active: Vec<&Filter> = filters.iter().filter(|f| !f.title_match.is_empty()).collect();
    if active.is_empty() {
        return Ok(0);
    }

    let mut cache = PatternCache::new();
    let mut updated = 0;

    for account in results.iter_mut() {
        for finding in account.findings_mut() {
            let Some(title) = finding.title.as_deref() else {
                continue;
            };

            let mut matched = None;
            for filter in &active {
                if cache.get(&filter.title_match)?.is_match(title) {
                    matched = Some(*filter);
                    break;
                }
            }

            if let Some(filter) = matched {
                trace_debug!("Filter '{}' matched finding {}", filter.title_match, finding.arn);
                finding.severity = Some(filter.severity.clone());
                finding.comment = filter.comment.clone();
                updated += 1;
            }
        }
    }

    log_info!(
        "Applied {} filter(s) with {} pattern(s): {} finding(s) updated",
        active.len(),
        cache.len(),
        updated
    );
    Ok(updated)
}
