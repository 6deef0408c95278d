use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use snapshot_migration_aws::adapters::kms::KmsKeyService;
use snapshot_migration_aws::adapters::rds::RdsSnapshotClient;
use snapshot_migration_aws::cli::Cli;
use snapshot_migration_aws::commands::{execute, AppDependencies};
use snapshot_migration_core::telemetry::EventLog;

const COMPONENT: &str = "rds_snapshot_encryptor";

fn event_log(cli: &Cli) -> std::io::Result<EventLog> {
    let log = match &cli.log_file {
        Some(path) => EventLog::stderr_and_file(COMPONENT, path)?,
        None => EventLog::stderr(COMPONENT),
    };
    Ok(log.with_min_level(cli.log_level))
}

async fn aws_dependencies(cli: &Cli) -> AppDependencies {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(profile) = &cli.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(region) = &cli.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }
    let config = loader.load().await;
    AppDependencies {
        client: Arc::new(RdsSnapshotClient::new(aws_sdk_rds::Client::new(&config))),
        key_service: Arc::new(KmsKeyService::new(aws_sdk_kms::Client::new(&config))),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let log = match event_log(&cli) {
        Ok(log) => log,
        Err(error) => {
            eprintln!("failed to open log file: {error}");
            return ExitCode::FAILURE;
        }
    };

    let deps = aws_dependencies(&cli).await;
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    match execute(&cli, deps, log.clone(), interrupt).await {
        Ok(report) => match serde_json::to_string_pretty(&report.document) {
            Ok(text) => {
                println!("{text}");
                if report.has_failures {
                    ExitCode::FAILURE
                } else {
                    ExitCode::SUCCESS
                }
            }
            Err(error) => {
                log.error("report_encoding_failed", json!({"error": error.to_string()}));
                ExitCode::FAILURE
            }
        },
        Err(error) => {
            log.error("command_failed", json!({"error": error.message()}));
            ExitCode::FAILURE
        }
    }
}
