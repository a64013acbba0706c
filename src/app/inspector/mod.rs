//! Multi-account, multi-region AWS Inspector collection.
//!
//! [`driver::Collector`] walks the configured accounts one at a time. For each
//! account [`account::AccountOrchestrator`] resolves credentials and runs
//! [`region_worker::process_region`] concurrently in every region returned by
//! [`regions::inspector_regions`]. The Inspector API itself sits behind
//! [`client::InspectorApi`] so the walk can be driven by the SDK or by a test
//! double.

pub mod account;
pub mod client;
pub mod credentials;
pub mod driver;
pub mod latest_runs;
pub mod pagination;
pub mod region_worker;
pub mod regions;
pub mod sdk_errors;
pub mod types;

pub use client::{InspectorApi, InspectorConnector, SdkInspectorConnector};
pub use credentials::{AssumeRoleRequest, AwsCredentialSource, CredentialSource};
pub use driver::{Collector, DEFAULT_MAX_REPORT_AGE_DAYS};
pub use types::*;
