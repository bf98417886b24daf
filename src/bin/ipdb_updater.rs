use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use ipdb_updater::app::{ItemOutcome, UpdateReport, UpdateStatus, Updater};
use ipdb_updater::config::{ConfigLoader, ResolvedConfig};
use ipdb_updater::domain::WritePolicy;
use ipdb_updater::download::Downloader;
use ipdb_updater::error::UpdateError;
use ipdb_updater::http::ReqwestTransport;
use ipdb_updater::output::{JsonOutput, LogProgress, human_bytes};
use ipdb_updater::resolver::VersionResolver;
use ipdb_updater::scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "ipdb-updater")]
#[command(about = "Keeps local IP-geolocation datasets up to date")]
#[command(version, author)]
struct Cli {
    /// Config file (defaults to ./ipdb-updater.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Storage directory, overrides the config file
    #[arg(long, global = true)]
    dir: Option<Utf8PathBuf>,

    /// Write policy, overrides the config file
    #[arg(long, global = true)]
    write_policy: Option<WritePolicy>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Refresh every dataset once")]
    Update,
    #[command(about = "Download a single dataset")]
    Download {
        name: String,
        #[arg(long)]
        url: Option<String>,
    },
    #[command(about = "Show the known dataset sources")]
    Sources,
    #[command(about = "List datasets in the storage directory")]
    List,
    #[command(about = "Refresh now, then daily at the configured time")]
    Run,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<UpdateError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &UpdateError) -> u8 {
    match error {
        UpdateError::FileNotFound(_) | UpdateError::InvalidDatasetName(_) => 2,
        UpdateError::FailedDownload { .. }
        | UpdateError::Transport(_)
        | UpdateError::Decode(_)
        | UpdateError::Resolve(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ConfigLoader::resolve(cli.config.as_deref(), cli.dir.as_deref())?;
    if let Some(policy) = cli.write_policy {
        config.write_policy = policy;
    }

    match cli.command {
        Commands::Update => {
            let updater = build_updater(&config)?;
            let report = updater.run_full_update(&LogProgress);
            if cli.json {
                JsonOutput::print_report(&report).into_diagnostic()?;
            } else {
                print_update_summary(&report);
            }
            Ok(match report.status {
                UpdateStatus::Completed => ExitCode::SUCCESS,
                UpdateStatus::Partial | UpdateStatus::Skipped => ExitCode::from(3),
            })
        }
        Commands::Download { name, url } => {
            let updater = build_updater(&config)?;
            let outcome = updater
                .downloader()
                .download(&name, url.as_deref(), &LogProgress)?;
            if cli.json {
                JsonOutput::print_download(&outcome).into_diagnostic()?;
            } else {
                println!(
                    "{} -> {} ({})",
                    outcome.name,
                    outcome.path,
                    human_bytes(outcome.bytes_written)
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sources => {
            for entry in config.registry.entries() {
                println!("{:<24} {}", entry.name, entry.url);
            }
            let family = &config.family;
            println!(
                "{:<24} discovered from {}",
                family.primary, family.landing_page
            );
            println!(
                "{:<24} derived from {} ({} -> {})",
                family.sibling, family.primary, family.token, family.sibling_token
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => {
            let datasets = config.store().list()?;
            if cli.json {
                JsonOutput::print_list(&datasets).into_diagnostic()?;
            } else {
                for dataset in &datasets {
                    let modified = dataset
                        .modified
                        .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<24} {:>10}  {modified}",
                        dataset.name,
                        human_bytes(dataset.bytes)
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run => {
            let updater = Arc::new(build_updater(&config)?);
            let print_json = cli.json;
            let handle = Scheduler::new(updater, config.schedule, Arc::new(LogProgress))
                .on_report(Arc::new(move |report: &UpdateReport| {
                    if print_json {
                        let _ = JsonOutput::print_report(report);
                    }
                }))
                .start()?;
            handle.join();
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_updater(config: &ResolvedConfig) -> miette::Result<Updater<ReqwestTransport>> {
    let transport = ReqwestTransport::new(config.connect_timeout, config.request_timeout)?;
    let downloader = Downloader::new(transport.clone(), config.registry.clone(), config.store())
        .with_policy(config.write_policy);
    let resolver = VersionResolver::new(transport);
    Ok(Updater::new(downloader, resolver, config.family.clone()))
}

fn print_update_summary(report: &UpdateReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}ipdb-updater summary ({:?}){reset}", report.status);
    println!(
        "{green}Refreshed datasets: {}{reset}",
        report.succeeded()
    );
    println!(
        "{yellow}Errors: {}{reset}",
        report.items.len() - report.succeeded()
    );

    for item in &report.items {
        match &item.outcome {
            ItemOutcome::Downloaded { bytes, compressed } => {
                let via = if *compressed { ", gunzipped" } else { "" };
                println!(
                    "{green}  ok   {} ({}{via}){reset}",
                    item.dataset,
                    human_bytes(*bytes)
                );
            }
            ItemOutcome::Failed { error } => {
                println!("{red}  fail {}: {error}{reset}", item.dataset);
            }
            ItemOutcome::Unresolved { error } => {
                println!("{yellow}  skip {}: {error}{reset}", item.dataset);
            }
        }
    }
}
