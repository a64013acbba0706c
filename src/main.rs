#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use air::app::config::AppConfig;
use air::app::inspector::DEFAULT_MAX_REPORT_AGE_DAYS;

const DEFAULT_FILTER: &str = "air=info,aws_config=warn,aws_sigv4=warn,aws_smithy_runtime=warn,aws_smithy_runtime_api=warn,aws_smithy_http=warn,hyper=warn,rustls=warn";
const DEBUG_FILTER: &str = "air=debug,aws_config=info,aws_sigv4=warn,aws_smithy_runtime=info,aws_smithy_runtime_api=warn,aws_smithy_http=warn,hyper=warn,rustls=warn";

/// Collects AWS Inspector findings across accounts and regions into a
/// spreadsheet report.
#[derive(Parser, Debug)]
#[command(name = "air", version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT"), ")"))]
struct Cli {
    /// Directory or s3://bucket/prefix holding targets.yml, filters.yml and report.yml
    #[arg(long, env = "AIR_CONFIG_PATH", default_value = "config")]
    config_path: String,

    /// Directory the report is written to
    #[arg(long, env = "AIR_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Ignore assessment runs completed more than this many days ago
    #[arg(long, env = "AIR_MAX_REPORT_AGE", default_value_t = DEFAULT_MAX_REPORT_AGE_DAYS)]
    max_report_age: u32,

    /// Delete the report after it has been emailed
    #[arg(long, env = "AIR_DELETE_AFTER_EMAIL")]
    delete_after_email: bool,

    /// Enable debug logging
    #[arg(long, env = "AIR_DEBUG")]
    debug: bool,
}

impl From<Cli> for AppConfig {
    fn from(cli: Cli) -> Self {
        AppConfig {
            debug: cli.debug,
            config_path: cli.config_path,
            output_dir: cli.output,
            max_report_age: cli.max_report_age,
            delete_after_email: cli.delete_after_email,
        }
    }
}

/// Logs go to stderr; stdout is kept for the report path and the summary.
/// `RUST_LOG`, when set, replaces the built-in filter.
fn init_logging(debug: bool) -> Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::builder()
            .parse(&directives)
            .with_context(|| format!("Invalid RUST_LOG filter '{}'", directives))?,
        _ => EnvFilter::builder().parse(if debug { DEBUG_FILTER } else { DEFAULT_FILTER })?,
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false),
    );
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    // Bridge log records, including the log_* macros, into tracing.
    tracing_log::LogTracer::init().context("Failed to initialize log-to-tracing bridge")?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.debug) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    let app = AppConfig::from(cli);
    tracing::info!(
        "air {} ({}, {}) starting with config path {}",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_BRANCH"),
        env!("GIT_COMMIT"),
        app.config_path
    );

    match air::app::runner::run(&app).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Run failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
