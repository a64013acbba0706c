//! Report delivery by email, through SES or an SMTP relay.

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{anyhow, bail, Context, Result};
use aws_config::SdkConfig;
use aws_sdk_ses::primitives::Blob;
use aws_sdk_ses::types::RawMessage;
use aws_types::region::Region;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{Message, SmtpTransport, Transport};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::app::inspector::sdk_errors::SdkResultExt;

pub const DEFAULT_SUBJECT: &str = "AWS Inspector Report";
const BODY: &str = "attached";
const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const SMTPS_PORT: u16 = 465;

static ADDRESS_PATTERN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailProvider {
    Ses,
    Smtp,
}

impl FromStr for EmailProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ses" => Ok(EmailProvider::Ses),
            "smtp" => Ok(EmailProvider::Smtp),
            other => Err(anyhow!("email provider '{}' not supported", other)),
        }
    }
}

impl fmt::Display for EmailProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailProvider::Ses => write!(f, "ses"),
            EmailProvider::Smtp => write!(f, "smtp"),
        }
    }
}

/// Email settings from `report.yml` or the `AIR_EMAIL_*` environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub host: String,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

/// Accepts `port: 587` as well as `port: "587"`.
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(port)) => Ok(Some(port)),
        Some(Port::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Port::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{}'", text))),
    }
}

impl EmailConfig {
    pub fn subject_or_default(&self) -> &str {
        if self.subject.is_empty() {
            DEFAULT_SUBJECT
        } else {
            &self.subject
        }
    }

    /// Checks provider, source and recipient addresses.
    pub fn validate(&self) -> Result<EmailProvider> {
        if self.provider.trim().is_empty() {
            bail!("email provider not specified");
        }
        if self.source.trim().is_empty() {
            bail!("email source not specified");
        }
        let provider: EmailProvider = self.provider.parse()?;

        if self.recipients.is_empty() {
            bail!("no email recipients specified");
        }
        for recipient in &self.recipients {
            validate_address(recipient)?;
        }
        validate_address(&self.source)?;

        match provider {
            EmailProvider::Ses if self.region.trim().is_empty() => {
                bail!("email region not specified for provider ses")
            }
            EmailProvider::Smtp if self.host.trim().is_empty() => {
                bail!("email host not specified for provider smtp")
            }
            _ => Ok(provider),
        }
    }
}

/// The bare address of `"Name <addr>"`, or the input unchanged.
pub fn extract_address(input: &str) -> &str {
    match (input.find('<'), input.find('>')) {
        (Some(start), Some(end)) if start < end => &input[start + 1..end],
        (Some(start), None) => &input[start + 1..],
        _ => input,
    }
}

fn validate_address(input: &str) -> Result<()> {
    let pattern = ADDRESS_PATTERN
        .as_ref()
        .map_err(|e| anyhow!("address pattern failed to compile: {}", e))?;
    let address = extract_address(input).trim();
    if pattern.is_match(address) {
        Ok(())
    } else {
        Err(anyhow!("invalid email address '{}'", address))
    }
}

/// Builds the MIME message carrying `report_path` as an attachment.
pub fn build_message(config: &EmailConfig, report_path: &Path) -> Result<Message> {
    let from: Mailbox = config
        .source
        .parse()
        .with_context(|| format!("invalid email source '{}'", config.source))?;

    let mut builder = Message::builder().from(from).subject(config.subject_or_default());
    for recipient in &config.recipients {
        let to: Mailbox = recipient
            .parse()
            .with_context(|| format!("invalid email recipient '{}'", recipient))?;
        builder = builder.to(to);
    }

    let file_name = report_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "inspector_report.xlsx".to_string());
    let content = std::fs::read(report_path)
        .with_context(|| format!("Failed to read report {}", report_path.display()))?;
    let content_type = ContentType::parse(XLSX_CONTENT_TYPE)
        .map_err(|e| anyhow!("invalid attachment content type: {}", e))?;

    let message = builder
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::html(BODY.to_string()))
                .singlepart(Attachment::new(file_name).body(content, content_type)),
        )
        .context("Failed to build email message")?;
    Ok(message)
}

/// Sends the report and optionally deletes it afterwards. When sending fails
/// the report is deleted before the error is returned.
pub async fn email_report(
    sdk_config: &SdkConfig,
    report_path: &Path,
    config: &EmailConfig,
    delete_after: bool,
) -> Result<()> {
    let provider = config.validate()?;
    let message = build_message(config, report_path)?;

    log_info!(
        "Emailing report {} to {} recipient(s) via {}",
        report_path.display(),
        config.recipients.len(),
        provider
    );

    let sent = match provider {
        EmailProvider::Ses => send_with_ses(sdk_config, config, message).await,
        EmailProvider::Smtp => send_with_smtp(config, message).await,
    };

    if let Err(e) = sent {
        if let Err(delete_err) = std::fs::remove_file(report_path) {
            log_warn!("Failed to delete report {}: {}", report_path.display(), delete_err);
        }
        return Err(e);
    }

    if delete_after {
        std::fs::remove_file(report_path)
            .with_context(|| format!("Failed to delete report {}", report_path.display()))?;
    }
    Ok(())
}

async fn send_with_ses(sdk_config: &SdkConfig, config: &EmailConfig, message: Message) -> Result<()> {
    let ses_config = aws_sdk_ses::config::Builder::from(sdk_config)
        .region(Region::new(config.region.clone()))
        .build();
    let client = aws_sdk_ses::Client::from_conf(ses_config);

    let raw = RawMessage::builder()
        .data(Blob::new(message.formatted()))
        .build()
        .context("Failed to build raw email")?;

    let response = client
        .send_raw_email()
        .source(config.source.clone())
        .set_destinations(Some(config.recipients.clone()))
        .raw_message(raw)
        .send()
        .await
        .sdk_context("SendRawEmail")?;

    log_debug!("SES accepted message {:?}", response.message_id());
    Ok(())
}

async fn send_with_smtp(config: &EmailConfig, message: Message) -> Result<()> {
    let host = config.host.clone();
    let port = config.port;
    let credentials = SmtpCredentials::new(config.username.clone(), config.password.clone());

    tokio::task::spawn_blocking(move || -> Result<()> {
        let builder = match port {
            Some(SMTPS_PORT) | None => SmtpTransport::relay(&host),
            Some(_) => SmtpTransport::starttls_relay(&host),
        }
        .with_context(|| format!("Failed to configure SMTP relay {}", host))?;

        let mut builder = builder.credentials(credentials);
        if let Some(port) = port {
            builder = builder.port(port);
        }

        builder
            .build()
            .send(&message)
            .with_context(|| format!("Failed to send email via {}", host))?;
        Ok(())
    })
    .await
    .context("SMTP send task failed")?
}
