//! warden: schema discovery and read-only query gating.

mod cli;

use anyhow::Context;
use cli::{Cli, Command};
use db_warden::config::Config;
use db_warden::connection::{fetch_schema, ConnectionTester};
use db_warden::db::DriverConnector;
use db_warden::logging;
use db_warden::query::QueryExecutor;
use db_warden::safety::classify_sql;
use serde::Serialize;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => {
            let path = path.clone().unwrap_or_else(logging::default_log_path);
            logging::init_file_logging(&path);
        }
        None => logging::init_stderr_logging(),
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Command::Classify { sql } = &cli.command {
        let classification = classify_sql(sql);
        print_json(&classification)?;
        return Ok(exit_code(classification.allowed));
    }

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let spec = cli.resolve_connection(&config)?;
    info!("Connection: {}", spec.display_string());

    let connector = DriverConnector::new(config.limits);

    match &cli.command {
        Command::Test => {
            let result = ConnectionTester::new(&connector).test(&spec).await;
            print_json(&result)?;
            Ok(exit_code(result.success))
        }
        Command::Schema { text } => {
            let schema = fetch_schema(&connector, &spec)
                .await
                .with_context(|| format!("Schema discovery failed for '{}'", spec.name))?;
            if *text {
                print!("{}", schema.format_for_llm());
            } else {
                print_json(&schema)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Query { sql } => {
            let result = QueryExecutor::new(&connector).execute(&spec, sql).await?;
            print_json(&result)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Classify { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
