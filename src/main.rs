//! promuptime - Uptime report from a metrics server
//!
//! Evaluates success/failure counters for configured endpoints and renders
//! an HTML uptime table. Also exposes ad-hoc query, range query and series
//! listing commands.

mod cli;
mod client;
mod config;
mod uptime;

use clap::Parser;
use cli::{Cli, Commands};
use client::{Client, RangeParams};
use config::{timeout_from_secs, ConfigError, ReportConfig};
use uptime::{Evaluator, Mailer, Report, UptimeRecord};

use chrono::Utc;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("Error: failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() -> Result<(), BoxError> {
    // Stdout carries query output and the report.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("promuptime=info".parse()?))
        .try_init()?;
    Ok(())
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let format = cli.output_format();

    match cli.command.clone().unwrap_or(Commands::Report) {
        Commands::Report => run_report(&cli).await,
        Commands::Query { expr } => {
            let client = adhoc_client(&cli)?;
            let outcome = client.query(&expr).await?;
            if outcome.is_empty() {
                tracing::info!("Query returned no samples");
            }
            print!("{}", format.render(&outcome));
            Ok(())
        }
        Commands::QueryRange {
            expr,
            end,
            range,
            step,
        } => {
            let client = adhoc_client(&cli)?;
            let outcome = client
                .query_range(&expr, RangeParams::new(end, range, step))
                .await?;
            print!("{}", format.render(&outcome));
            Ok(())
        }
        Commands::Metrics => {
            let client = adhoc_client(&cli)?;
            for name in client.metrics().await? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

/// Evaluate every configured endpoint and emit the report.
async fn run_report(cli: &Cli) -> Result<(), BoxError> {
    let mut cfg = ReportConfig::load(&cli.config)?;
    if let Some(server) = &cli.server {
        cfg.server = server.clone();
    }
    if let Some(timeout) = cli.timeout {
        cfg.timeout = timeout;
    }
    cfg.validate()?;

    let timeout = cfg.timeout_duration()?;
    let mailer = cfg.mail()?.map(|m| Mailer::new(&m, timeout)).transpose()?;

    let date = Utc::now().with_timezone(&cfg.tz()?).format("%Y-%m-%d").to_string();
    let client = Client::new(&cfg.server, timeout)?;
    tracing::info!("Querying {} for {} report", client.base_url(), date);

    let mut report = Report::new(cfg.show_count);
    let records = Evaluator::new(&client)
        .run(&cfg.endpoints, &mut report)
        .await?;

    for record in &records {
        print_summary(record);
    }

    tracing::info!("Rendering report with {} rows", report.rows().len());
    let html = report.render_html(&cfg.subject, &date);
    match &cli.output {
        Some(path) => {
            std::fs::write(path, &html)?;
            tracing::info!("Report written to {}", path.display());
        }
        None => println!("{}", html),
    }

    if let Some(mailer) = mailer {
        let subject = format!("{} for {}", cfg.subject, date);
        mailer.send(&subject, &html).await?;
        tracing::info!("Report mailed to {} recipient(s)", mailer.recipients().len());
    }

    Ok(())
}

fn print_summary(record: &UptimeRecord) {
    println!("{}", record.endpoint);
    if record.is_unused() {
        println!("Endpoint not used!");
    } else {
        println!("2xx: {}", record.success_count);
        println!("5xx: {}", record.failure_count);
        println!("uptime: {} %", record.uptime_percent);
    }
}

/// Client for the ad-hoc commands. `--server` wins over the config file.
fn adhoc_client(cli: &Cli) -> Result<Client, BoxError> {
    let (server, timeout) = match &cli.server {
        Some(server) => (server.clone(), cli.timeout.unwrap_or(60.0)),
        None => {
            let cfg = ReportConfig::load(&cli.config)?;
            (cfg.server, cli.timeout.unwrap_or(cfg.timeout))
        }
    };

    if server.trim().is_empty() {
        return Err(ConfigError::MissingServer.into());
    }

    Ok(Client::new(&server, timeout_from_secs(timeout)?)?)
}
