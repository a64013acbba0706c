#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_credential_types::Credentials;
use aws_smithy_types::error::display::DisplayErrorContext;
use std::time::SystemTime;

use super::sdk_errors::{format_sdk_error, SdkResultExt, NO_CREDENTIAL_PROVIDERS};
use super::types::Target;

/// Session name used for every assumed role.
pub const SESSION_NAME: &str = "air";

/// Region used for STS and IAM when the environment does not name one.
pub const FALLBACK_REGION: &str = "us-east-1";

/// Parameters of one AssumeRole exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub external_id: Option<String>,
    pub session_name: String,
}

impl AssumeRoleRequest {
    pub fn for_target(target: &Target) -> Self {
        Self {
            role_arn: target.role_arn(),
            external_id: Some(target.role_external_id.clone()).filter(|id| !id.is_empty()),
            session_name: SESSION_NAME.to_string(),
        }
    }
}

/// Where account credentials and identity come from.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Credentials resolved from the ambient session, frozen as static keys.
    async fn ambient_credentials(&self) -> Result<SharedCredentialsProvider>;

    /// Account id of the principal behind `credentials`.
    async fn caller_account_id(&self, credentials: &SharedCredentialsProvider) -> Result<String>;

    /// First IAM account alias, if any.
    async fn account_alias(&self, credentials: &SharedCredentialsProvider) -> Result<Option<String>>;

    /// Performs the AssumeRole call immediately.
    async fn assume_role(&self, request: &AssumeRoleRequest) -> Result<SharedCredentialsProvider>;

    /// A provider that retries AssumeRole each time credentials are needed.
    /// Used after a recoverable failure so region calls can still try.
    async fn deferred_assume_role(&self, request: &AssumeRoleRequest) -> Result<SharedCredentialsProvider>;
}

/// [`CredentialSource`] backed by the default AWS provider chain, STS and IAM.
#[derive(Clone)]
pub struct AwsCredentialSource {
    base: SdkConfig,
}

impl AwsCredentialSource {
    pub fn new(base: SdkConfig) -> Self {
        Self { base }
    }

    /// Loads the default provider chain with a region fallback for STS.
    pub async fn from_environment() -> Self {
        let region = RegionProviderChain::default_provider().or_else(FALLBACK_REGION);
        let base = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        Self::new(base)
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.base
    }

    fn sts_client(&self, credentials: Option<&SharedCredentialsProvider>) -> aws_sdk_sts::Client {
        let mut builder = aws_sdk_sts::config::Builder::from(&self.base);
        if let Some(credentials) = credentials {
            builder = builder.credentials_provider(credentials.clone());
        }
        aws_sdk_sts::Client::from_conf(builder.build())
    }
}

#[async_trait]
impl CredentialSource for AwsCredentialSource {
    async fn ambient_credentials(&self) -> Result<SharedCredentialsProvider> {
        let provider = self
            .base
            .credentials_provider()
            .ok_or_else(|| anyhow!("{}: no credentials provider is configured", NO_CREDENTIAL_PROVIDERS))?;

        let credentials = provider
            .provide_credentials()
            .await
            .map_err(|e| anyhow!("{}: {}", NO_CREDENTIAL_PROVIDERS, DisplayErrorContext(&e)))?;

        log_debug!(
            "Resolved ambient credentials (expires: {:?})",
            credentials.expiry()
        );
        Ok(SharedCredentialsProvider::new(credentials))
    }

    async fn caller_account_id(&self, credentials: &SharedCredentialsProvider) -> Result<String> {
        let identity = self
            .sts_client(Some(credentials))
            .get_caller_identity()
            .send()
            .await
            .sdk_context("GetCallerIdentity")?;

        identity
            .account()
            .map(str::to_string)
            .context("GetCallerIdentity returned no account id")
    }

    async fn account_alias(&self, credentials: &SharedCredentialsProvider) -> Result<Option<String>> {
        let config = aws_sdk_iam::config::Builder::from(&self.base)
            .credentials_provider(credentials.clone())
            .build();
        let iam = aws_sdk_iam::Client::from_conf(config);

        match iam.list_account_aliases().send().await {
            Ok(response) => Ok(response.account_aliases().first().cloned()),
            Err(e) => {
                let message = format_sdk_error(&e);
                if message.starts_with("AccessDenied") {
                    Err(anyhow!(
                        "{} (missing permission: iam:ListAccountAliases)",
                        message
                    ))
                } else {
                    Err(anyhow!(message).context("ListAccountAliases failed"))
                }
            }
        }
    }

    async fn assume_role(&self, request: &AssumeRoleRequest) -> Result<SharedCredentialsProvider> {
        log_debug!("Assuming role {}", request.role_arn);

        let response = self
            .sts_client(None)
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .set_external_id(request.external_id.clone())
            .send()
            .await
            .sdk_context("AssumeRole")?;

        let issued = response
            .credentials()
            .with_context(|| format!("AssumeRole returned no credentials for {}", request.role_arn))?;

        let credentials = Credentials::new(
            issued.access_key_id(),
            issued.secret_access_key(),
            Some(issued.session_token().to_string()),
            SystemTime::try_from(*issued.expiration()).ok(),
            "air-assume-role",
        );
        Ok(SharedCredentialsProvider::new(credentials))
    }

    async fn deferred_assume_role(&self, request: &AssumeRoleRequest) -> Result<SharedCredentialsProvider> {
        let mut builder = AssumeRoleProvider::builder(request.role_arn.clone())
            .session_name(request.session_name.clone())
            .configure(&self.base);
        if let Some(external_id) = &request.external_id {
            builder = builder.external_id(external_id.clone());
        }
        let provider = builder.build().await;
        Ok(SharedCredentialsProvider::new(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_for_target_uses_constructed_arn() {
        let target = Target::new("210987654321").with_role("InspectorAudit", "s3cr3t");
        let request = AssumeRoleRequest::for_target(&target);
        assert_eq!(request.role_arn, "arn:aws:iam::210987654321:role/InspectorAudit");
        assert_eq!(request.external_id.as_deref(), Some("s3cr3t"));
        assert_eq!(request.session_name, SESSION_NAME);
    }

    #[test]
    fn test_empty_external_id_is_omitted() {
        let target = Target::new("210987654321").with_role("InspectorAudit", "");
        assert_eq!(AssumeRoleRequest::for_target(&target).external_id, None);
    }
}
