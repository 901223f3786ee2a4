// Copyright 2026 enecoQ Fetch Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, info};

use enecoq_fetch::auth::{Authenticator, Credentials};
use enecoq_fetch::config::Config;
use enecoq_fetch::driver::chromium::ChromiumDriver;
use enecoq_fetch::error::Error;
use enecoq_fetch::export::OutputFormat;
use enecoq_fetch::fetch::PowerFetcher;
use enecoq_fetch::logging;
use enecoq_fetch::model::ReportingPeriod;
use enecoq_fetch::retry::RetryPolicy;

/// Exit codes: 0 success, 1 authentication error, 2 fetch error,
/// 3 export error, 4 other domain error (reserved), 5 unexpected error,
/// 6 argument validation error.
#[derive(Parser)]
#[command(
    name = "enecoq-fetch",
    about = "Fetch power usage, cost and CO2 figures from the enecoQ web portal",
    version
)]
struct Cli {
    /// Email address for enecoQ authentication
    #[arg(long)]
    email: String,

    /// Password for enecoQ authentication
    #[arg(long)]
    password: String,

    /// Reporting period to fetch
    #[arg(long, value_enum, default_value_t = ReportingPeriod::Month)]
    period: ReportingPeriod,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Output file path (JSON format only)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level: trace, debug, info, warn or error
    #[arg(long)]
    log_level: Option<String>,

    /// Log file path (overrides the configured one)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(message) = validate_arguments(&cli) {
        eprintln!("Invalid argument: {message}");
        std::process::exit(6);
    }

    if let Err(err) = run(cli).await {
        match err.downcast_ref::<Error>() {
            Some(domain) => {
                let label = match domain {
                    Error::Authentication { .. } => "Authentication error",
                    Error::Transient { .. } | Error::Extraction { .. } => "Fetch error",
                    Error::Export { .. } => "Export error",
                };
                eprintln!("{label}: {domain}");
                std::process::exit(domain.exit_code());
            }
            None => {
                eprintln!("Unexpected error: {err:#}");
                std::process::exit(5);
            }
        }
    }
}

fn validate_arguments(cli: &Cli) -> Result<(), String> {
    if !cli.email.contains('@') {
        return Err("invalid email address format".to_string());
    }
    if cli.password.is_empty() {
        return Err("password cannot be empty".to_string());
    }
    if cli.output.is_some() && cli.format != OutputFormat::Json {
        return Err("output path can only be specified with JSON format".to_string());
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(
        Some(&cli.config),
        cli.log_level.as_deref(),
        cli.log_file.as_deref().and_then(|p| p.to_str()),
    );

    logging::setup(&config.log_level, Some(std::path::Path::new(&config.log_file)))?;
    info!("starting enecoQ data fetcher");
    debug!(
        "parameters: period={}, format={:?}, config={}",
        cli.period,
        cli.format,
        cli.config.display()
    );
    debug!(
        "configuration: log_level={}, timeout={}, max_retries={}",
        config.log_level, config.timeout, config.max_retries
    );

    let credentials = Credentials::new(cli.email, cli.password);
    let driver = Arc::new(ChromiumDriver::new(&config));
    let fetcher = PowerFetcher::new(
        driver,
        Authenticator::new(credentials),
        RetryPolicy {
            max_attempts: config.max_retries,
            ..RetryPolicy::default()
        },
    );

    fetcher
        .fetch(cli.period, cli.format, cli.output.as_deref())
        .await?;

    if cli.format == OutputFormat::Json {
        if let Some(path) = &cli.output {
            println!("Data successfully exported to: {}", path.display());
        }
    }
    info!("enecoQ data fetcher completed successfully");

    Ok(())
}
