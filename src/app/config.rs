//! Application settings and the YAML configuration files.
//!
//! The configuration path is either a local directory or an S3 location of
//! the form `s3://bucket/prefix`. It may hold `targets.yml`, `filters.yml`
//! and `report.yml`; each is optional.

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{bail, Context, Result};
use aws_config::SdkConfig;
use aws_types::region::Region;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::email::EmailConfig;
use super::inspector::driver::DEFAULT_MAX_REPORT_AGE_DAYS;
use super::inspector::sdk_errors::SdkResultExt;
use super::inspector::types::Target;

pub const TARGETS_FILE_NAME: &str = "targets.yml";
pub const FILTERS_FILE_NAME: &str = "filters.yml";
pub const REPORT_FILE_NAME: &str = "report.yml";

/// Region assumed for buckets whose location constraint is empty.
const DEFAULT_BUCKET_REGION: &str = "us-east-1";

/// Runtime settings, from the command line or the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub debug: bool,
    pub config_path: String,
    pub output_dir: PathBuf,
    pub max_report_age: u32,
    pub delete_after_email: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            config_path: "config".to_string(),
            output_dir: PathBuf::from("."),
            max_report_age: DEFAULT_MAX_REPORT_AGE_DAYS,
            delete_after_email: false,
        }
    }
}

/// Severity override: findings whose title matches `title_match` get
/// `severity` and `comment`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, rename = "title-match")]
    pub title_match: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub comment: String,
}

/// Contents of `report.yml`. Email is sent only when `email` is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedConfig {
    pub targets: Vec<Target>,
    pub filters: Vec<Filter>,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    Local(PathBuf),
    S3 { bucket: String, prefix: String },
}

impl ConfigLocation {
    pub fn parse(path: &str) -> Result<Self> {
        let Some(rest) = path.strip_prefix("s3://") else {
            return Ok(ConfigLocation::Local(PathBuf::from(path)));
        };
        let (bucket, prefix) = match rest.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix.trim_matches('/')),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            bail!("invalid S3 config path '{}': missing bucket", path);
        }
        Ok(ConfigLocation::S3 {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        })
    }

    fn object_key(prefix: &str, file_name: &str) -> String {
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", prefix, file_name)
        }
    }
}

/// Reads all three files from `app.config_path`, then applies the
/// `AIR_EMAIL_*` environment override.
pub async fn load_config(app: &AppConfig, sdk_config: &SdkConfig) -> Result<LoadedConfig> {
    let location = ConfigLocation::parse(&app.config_path)?;

    let targets = read_config_file(&location, TARGETS_FILE_NAME, sdk_config).await?;
    let filters = read_config_file(&location, FILTERS_FILE_NAME, sdk_config).await?;
    let report = read_config_file(&location, REPORT_FILE_NAME, sdk_config).await?;

    let mut loaded = LoadedConfig {
        targets: targets.as_deref().map(parse_targets).transpose()?.unwrap_or_default(),
        filters: filters.as_deref().map(parse_filters).transpose()?.unwrap_or_default(),
        report: report.as_deref().map(parse_report).transpose()?.unwrap_or_default(),
    };

    if let Some(email) = email_from_env(|key| std::env::var(key).ok()) {
        log_debug!("Using email settings from environment");
        loaded.report.email = Some(email);
    }

    log_info!(
        "Loaded {} target(s) and {} filter(s) from {}; email {}",
        loaded.targets.len(),
        loaded.filters.len(),
        app.config_path,
        if loaded.report.email.is_some() { "enabled" } else { "disabled" }
    );
    Ok(loaded)
}

async fn read_config_file(
    location: &ConfigLocation,
    file_name: &str,
    sdk_config: &SdkConfig,
) -> Result<Option<String>> {
    match location {
        ConfigLocation::Local(dir) => read_local_file(&dir.join(file_name)),
        ConfigLocation::S3 { bucket, prefix } => {
            let key = ConfigLocation::object_key(prefix, file_name);
            read_s3_object(sdk_config, bucket, &key).await
        }
    }
}

/// `Ok(None)` when the file does not exist.
pub fn read_local_file(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        log_debug!("Config file {} not found", path.display());
        return Ok(None);
    }
    std::fs::read_to_string(path)
        .map(Some)
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn read_s3_object(sdk_config: &SdkConfig, bucket: &str, key: &str) -> Result<Option<String>> {
    let region = bucket_region(sdk_config, bucket).await?;
    let config = aws_sdk_s3::config::Builder::from(sdk_config)
        .region(Region::new(region))
        .build();
    let s3 = aws_sdk_s3::Client::from_conf(config);

    let response = match s3.get_object().bucket(bucket).key(key).send().await {
        Ok(response) => response,
        Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
            log_debug!("Config object s3://{}/{} not found", bucket, key);
            return Ok(None);
        }
        Err(e) => {
            return Err(e)
                .sdk_context("GetObject")
                .with_context(|| format!("Failed to load s3://{}/{}", bucket, key));
        }
    };

    let bytes = response
        .body
        .collect()
        .await
        .with_context(|| format!("Failed to read s3://{}/{}", bucket, key))?
        .into_bytes();
    String::from_utf8(bytes.to_vec())
        .map(Some)
        .with_context(|| format!("s3://{}/{} is not valid UTF-8", bucket, key))
}

async fn bucket_region(sdk_config: &SdkConfig, bucket: &str) -> Result<String> {
    let s3 = aws_sdk_s3::Client::new(sdk_config);
    let response = s3
        .get_bucket_location()
        .bucket(bucket)
        .send()
        .await
        .sdk_context("GetBucketLocation")
        .with_context(|| format!("Failed to find region of bucket {}", bucket))?;

    let region = match response.location_constraint().map(|c| c.as_str()) {
        None | Some("") => DEFAULT_BUCKET_REGION,
        Some("EU") => "eu-west-1",
        Some(other) => other,
    };
    Ok(region.to_string())
}

fn parse_yaml_list<T: serde::de::DeserializeOwned>(content: &str, what: &str) -> Result<Vec<T>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: Option<Vec<T>> =
        serde_yaml::from_str(content).with_context(|| format!("Failed to parse {}", what))?;
    Ok(parsed.unwrap_or_default())
}

pub fn parse_targets(content: &str) -> Result<Vec<Target>> {
    let targets: Vec<Target> = parse_yaml_list(content, TARGETS_FILE_NAME)?;
    if let Some(target) = targets.iter().find(|t| t.id.trim().is_empty()) {
        bail!("target with alias '{}' in {} has no id", target.alias, TARGETS_FILE_NAME);
    }
    Ok(targets)
}

pub fn parse_filters(content: &str) -> Result<Vec<Filter>> {
    parse_yaml_list(content, FILTERS_FILE_NAME)
}

pub fn parse_report(content: &str) -> Result<ReportConfig> {
    if content.trim().is_empty() {
        return Ok(ReportConfig::default());
    }
    let parsed: Option<ReportConfig> =
        serde_yaml::from_str(content).with_context(|| format!("Failed to parse {}", REPORT_FILE_NAME))?;
    Ok(parsed.unwrap_or_default())
}

/// SES settings from `AIR_EMAIL_*`, used only when the provider is SES and
/// region, source, recipients and subject are all set.
pub fn email_from_env<F>(lookup: F) -> Option<EmailConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if !var("AIR_EMAIL_PROVIDER")?.eq_ignore_ascii_case("ses") {
        return None;
    }
    let region = var("AIR_EMAIL_AWS_REGION")?;
    let source = var("AIR_EMAIL_SOURCE")?;
    let recipients = var("AIR_EMAIL_RECIPIENTS")?;
    let subject = var("AIR_EMAIL_SUBJECT")?;

    Some(EmailConfig {
        provider: "ses".to_string(),
        region,
        source,
        subject,
        recipients: recipients
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect(),
        ..Default::default()
    })
}
