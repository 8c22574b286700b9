//! Replay-Harvester main entry point
//!
//! This is the command-line interface for the replay harvester.

use clap::{Args, Parser, Subcommand};
use replay_harvester::api::{parse_format_id, ReplaySource, ShowdownClient};
use replay_harvester::archive::LogArchive;
use replay_harvester::config::{load_config_or_default, Config};
use replay_harvester::output::{
    export_replays, format_job, format_log_entry, format_replay, load_statistics,
    print_statistics, write_replays_json, ExportOptions,
};
use replay_harvester::scraper::{
    format_number, generate_job_name, repair_log_sizes, JobRunner, LogBackfill, ProgressSink,
    RunOptions, RunOutcome,
};
use replay_harvester::storage::{
    lock_store, now_unix, open_storage, JobSpec, JobStatus, MissingLogFilter, ReplayQuery,
    SharedStore,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Replay-Harvester: an incremental battle-replay collector
///
/// Pages through the replay search service, stores replay metadata in SQLite
/// and archives compressed battle logs. Jobs can be paused and resumed.
#[derive(Parser, Debug)]
#[command(name = "replay-harvester")]
#[command(version)]
#[command(about = "An incremental battle-replay collector", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults are used if it does not exist)
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new scraping job
    Start(StartArgs),

    /// Resume a paused, interrupted, or completed job
    Resume {
        /// Name of the job to resume
        #[arg(short = 'j', long)]
        job_name: String,

        /// Maximum number of additional replays to store
        #[arg(short, long)]
        limit: Option<u64>,

        /// Fetch full battle logs
        #[arg(long)]
        fetch_logs: bool,
    },

    /// Pause a running job after its current batch
    Pause {
        #[arg(short = 'j', long)]
        job_name: String,
    },

    /// Remove a job (harvested replays and logs are kept)
    Stop {
        #[arg(short = 'j', long, required_unless_present = "all", conflicts_with = "all")]
        job_name: Option<String>,

        /// Remove all jobs
        #[arg(long)]
        all: bool,
    },

    /// Show job status and storage statistics
    Status {
        #[arg(short = 'j', long)]
        job_name: Option<String>,
    },

    /// Fetch battle logs for stored replays that lack them
    FetchLogs {
        /// Maximum number of logs to fetch; runs until interrupted if omitted
        #[arg(short, long)]
        limit: Option<u64>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Record sizes for archived logs, re-queueing rows whose file is gone
    UpdateLogSizes,

    /// Query stored replays
    Query {
        #[command(flatten)]
        filter: FilterArgs,

        /// Filter by player name
        #[arg(short, long)]
        player: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: u32,

        /// Number of results to skip
        #[arg(long, default_value_t = 0)]
        offset: u32,

        /// Write results to a JSON file instead of printing them
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export replays and their logs to a directory
    Export {
        /// Filter by format
        #[arg(short, long)]
        format: Option<String>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Only export replays that have logs
        #[arg(long)]
        with_logs_only: bool,
    },

    /// Show recent audit log entries
    Logs {
        #[arg(short = 'j', long)]
        job_name: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
struct StartArgs {
    /// Battle format to scrape (e.g. gen9ou); config default if omitted
    #[arg(short, long)]
    format: Option<String>,

    /// Filter by username
    #[arg(short, long)]
    user: Option<String>,

    /// Minimum ELO rating; config default if omitted
    #[arg(long)]
    min_elo: Option<i64>,

    /// Maximum ELO rating; config default if omitted
    #[arg(long)]
    max_elo: Option<i64>,

    /// Name for this job; derived from format and rating if omitted
    #[arg(short = 'j', long)]
    job_name: Option<String>,

    /// Maximum number of new replays to store
    #[arg(short, long)]
    limit: Option<u64>,

    /// Fetch full battle logs (config default if neither flag is given)
    #[arg(long, conflicts_with = "no_fetch_logs")]
    fetch_logs: bool,

    /// Do not fetch battle logs
    #[arg(long)]
    no_fetch_logs: bool,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Filter by format
    #[arg(short, long)]
    format: Option<String>,

    /// Minimum ELO rating
    #[arg(long)]
    min_elo: Option<i64>,

    /// Maximum ELO rating
    #[arg(long)]
    max_elo: Option<i64>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show the effective configuration
    Show,
}

/// Opened resources shared by all commands
struct App {
    config: Config,
    config_hash: Option<String>,
    store: SharedStore,
    archive: LogArchive,
}

impl App {
    fn open(cli: &Cli) -> Result<Self, Box<dyn std::error::Error>> {
        let (config, config_hash) = load_config_or_default(&cli.config)?;
        if let Some(hash) = &config_hash {
            tracing::debug!("Configuration loaded (hash: {})", hash);
        }

        let storage = open_storage(std::path::Path::new(&config.storage.database_path))?;
        let store: SharedStore = Arc::new(Mutex::new(storage));
        let archive = LogArchive::new(&config.storage.logs_path);

        Ok(Self {
            config,
            config_hash,
            store,
            archive,
        })
    }

    fn source(&self) -> Result<Arc<dyn ReplaySource>, Box<dyn std::error::Error>> {
        let client = ShowdownClient::new(&self.config.scraping, &self.config.user_agent)?;
        Ok(Arc::new(client))
    }

    fn runner(&self) -> Result<JobRunner, Box<dyn std::error::Error>> {
        Ok(JobRunner::new(self.source()?, Arc::clone(&self.store), self.archive.clone())
            .with_progress(ProgressSink::console())
            .with_retry_delay(self.config.scraping.retry_delay()))
    }
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    if let Command::Config(ConfigCommand::Show) = &cli.command {
        let (config, _) = load_config_or_default(&cli.config)?;
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let app = match App::open(&cli) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("Failed to initialize: {}", e);
            return Err(e);
        }
    };

    match cli.command {
        Command::Start(args) => handle_start(&app, args).await,
        Command::Resume {
            job_name,
            limit,
            fetch_logs,
        } => handle_resume(&app, &job_name, limit, fetch_logs).await,
        Command::Pause { job_name } => handle_pause(&app, &job_name),
        Command::Stop { job_name, all } => handle_stop(&app, job_name.as_deref(), all),
        Command::Status { job_name } => handle_status(&app, job_name.as_deref()),
        Command::FetchLogs { limit, filter } => handle_fetch_logs(&app, limit, filter).await,
        Command::UpdateLogSizes => handle_update_log_sizes(&app),
        Command::Query {
            filter,
            player,
            limit,
            offset,
            output,
        } => {
            let query = ReplayQuery {
                format_id: filter.format.as_deref().map(parse_format_id),
                min_elo: filter.min_elo,
                max_elo: filter.max_elo,
                player,
                with_logs_only: false,
                limit,
                offset,
            };
            handle_query(&app, &query, output)
        }
        Command::Export {
            format,
            output,
            with_logs_only,
        } => {
            let options = ExportOptions {
                format_id: format.as_deref().map(parse_format_id),
                with_logs_only,
            };
            handle_export(&app, &options, &output)
        }
        Command::Logs { job_name, limit } => handle_logs(&app, job_name.as_deref(), limit),
        Command::Config(_) => Ok(()),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("replay_harvester=info,warn"),
            1 => EnvFilter::new("replay_harvester=debug,info"),
            2 => EnvFilter::new("replay_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Token cancelled on the first Ctrl-C
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Received shutdown signal, stopping after current batch...");
            trigger.cancel();
        }
    });
    token
}

/// Prints a message and exits with status 1
fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}

async fn handle_start(app: &App, args: StartArgs) -> CliResult {
    let defaults = &app.config.defaults;
    let min_elo = args.min_elo.unwrap_or(defaults.min_elo);
    let max_elo = args.max_elo.or(defaults.max_elo);
    let fetch_logs = if args.fetch_logs {
        true
    } else if args.no_fetch_logs {
        false
    } else {
        app.config.scraping.fetch_full_log
    };
    let format_id = args
        .format
        .or_else(|| defaults.format.clone())
        .map(|f| parse_format_id(&f))
        .filter(|f| !f.is_empty());

    let job_name = args
        .job_name
        .unwrap_or_else(|| generate_job_name(format_id.as_deref(), min_elo));

    let existing = lock_store(&app.store)?.get_job(&job_name)?;
    if let Some(existing) = existing {
        match existing.status {
            JobStatus::Running => fail(format!(
                "Job '{}' is already running. Use 'pause' or 'stop' first.",
                job_name
            )),
            JobStatus::Paused | JobStatus::Idle => fail(format!(
                "Job '{}' exists. Use 'resume' to continue or 'stop' to remove it.",
                job_name
            )),
            JobStatus::Completed => fail(format!(
                "Job '{}' is completed. Use 'stop' to remove it first.",
                job_name
            )),
        }
    }

    let runner = app.runner()?;
    let spec = JobSpec {
        name: job_name.clone(),
        format_id,
        user_filter: args.user,
        min_elo,
        max_elo,
        config_hash: app.config_hash.clone(),
    };
    if let Err(e) = runner.create_job(&spec) {
        fail(format!("Error: {}", e));
    }
    println!("Created job: {}", job_name);

    let options = RunOptions {
        limit: args.limit,
        fetch_logs,
    };
    let outcome = runner.run_job(&job_name, options, &shutdown_token()).await?;
    report_outcome(outcome);
    Ok(())
}

async fn handle_resume(
    app: &App,
    job_name: &str,
    limit: Option<u64>,
    fetch_logs: bool,
) -> CliResult {
    let job = lock_store(&app.store)?.get_job(job_name)?;
    let job = match job {
        Some(job) => job,
        None => fail(format!("Job '{}' not found.", job_name)),
    };

    match job.status {
        JobStatus::Running => fail(format!("Job '{}' is already running.", job_name)),
        JobStatus::Completed => println!("Continuing completed job: {}", job_name),
        JobStatus::Paused | JobStatus::Idle => println!("Resuming job: {}", job_name),
    }
    println!(
        "  Previous progress: {} stored",
        format_number(job.total_stored)
    );

    let options = RunOptions { limit, fetch_logs };
    let outcome = app
        .runner()?
        .run_job(job_name, options, &shutdown_token())
        .await?;
    report_outcome(outcome);
    Ok(())
}

fn report_outcome(outcome: RunOutcome) {
    match outcome {
        RunOutcome::Completed | RunOutcome::Paused => {}
        RunOutcome::Deleted => println!("Job was removed while running."),
        RunOutcome::Failed => {
            println!("Job stopped on an error and was paused; see 'logs' for details.")
        }
    }
}

fn handle_pause(app: &App, job_name: &str) -> CliResult {
    let mut store = lock_store(&app.store)?;
    let job = match store.get_job(job_name)? {
        Some(job) => job,
        None => fail(format!("Job '{}' not found.", job_name)),
    };

    if job.status != JobStatus::Running {
        fail(format!(
            "Job '{}' is not running (status: {}).",
            job_name, job.status
        ));
    }

    store.set_job_status(job_name, JobStatus::Paused)?;
    println!("Pausing job: {}", job_name);
    println!("Note: The job will pause after completing the current batch.");
    Ok(())
}

fn handle_stop(app: &App, job_name: Option<&str>, all: bool) -> CliResult {
    let mut store = lock_store(&app.store)?;

    if all {
        let jobs = store.list_jobs()?;
        if jobs.is_empty() {
            println!("No jobs to remove.");
            return Ok(());
        }
        for job in &jobs {
            store.delete_job(&job.name)?;
            println!("Removed job: {}", job.name);
        }
        println!("Removed {} job(s).", jobs.len());
        println!("Note: Replays and logs already fetched remain stored.");
        return Ok(());
    }

    let job_name = match job_name {
        Some(name) => name,
        None => fail("Error: Must specify --job-name or --all."),
    };

    if !store.delete_job(job_name)? {
        fail(format!("Job '{}' not found.", job_name));
    }
    println!("Stopped and removed job: {}", job_name);
    println!("Note: Replays and logs already fetched remain stored.");
    Ok(())
}

fn handle_status(app: &App, job_name: Option<&str>) -> CliResult {
    let store = lock_store(&app.store)?;

    let jobs = match job_name {
        Some(name) => match store.get_job(name)? {
            Some(job) => vec![job],
            None => fail(format!("Job '{}' not found.", name)),
        },
        None => store.list_jobs()?,
    };

    if jobs.is_empty() {
        println!("No scraping jobs found.");
    } else {
        println!("Scraping Jobs:");
        println!("{}", "-".repeat(60));
        let now = now_unix();
        for job in &jobs {
            println!("{}", format_job(job, now));
        }
    }

    let stats = load_statistics(&*store, &app.archive)?;
    print_statistics(&stats);
    Ok(())
}

async fn handle_fetch_logs(app: &App, limit: Option<u64>, filter: FilterArgs) -> CliResult {
    let filter = MissingLogFilter {
        min_elo: filter.min_elo,
        max_elo: filter.max_elo,
        format_id: filter.format.as_deref().map(parse_format_id),
    };

    let backfill = LogBackfill::new(app.source()?, Arc::clone(&app.store), app.archive.clone())
        .with_progress(ProgressSink::console())
        .with_batch_size(app.config.backfill.batch_size)
        .with_idle_backoff(app.config.backfill.idle_backoff());

    let count = backfill.run(limit, &filter, &shutdown_token()).await?;
    println!("Fetched {} logs.", count);
    Ok(())
}

fn handle_update_log_sizes(app: &App) -> CliResult {
    let report = repair_log_sizes(&app.store, &app.archive)?;

    if report.checked == 0 {
        println!("No replays need log size updates.");
        return Ok(());
    }

    println!("Found {} replays with missing log sizes...", report.checked);
    println!("Updated {} replay log sizes.", report.updated);
    if report.missing > 0 {
        println!(
            "Marked {} replays as missing logs (files not found).",
            report.missing
        );
    }
    Ok(())
}

fn handle_query(app: &App, query: &ReplayQuery, output: Option<PathBuf>) -> CliResult {
    let replays = lock_store(&app.store)?.query_replays(query)?;

    if replays.is_empty() {
        println!("No replays found matching criteria.");
        return Ok(());
    }

    match output {
        Some(path) => {
            write_replays_json(&path, &replays)?;
            println!("Exported {} replays to {}", replays.len(), path.display());
        }
        None => {
            println!("Found {} replays:", replays.len());
            println!("{}", "-".repeat(60));
            for replay in &replays {
                println!("{}", format_replay(replay));
            }
        }
    }
    Ok(())
}

fn handle_export(app: &App, options: &ExportOptions, output: &std::path::Path) -> CliResult {
    let store = lock_store(&app.store)?;

    match export_replays(&*store, &app.archive, output, options)? {
        None => println!("No replays to export."),
        Some(report) => {
            println!("Exported {} replays to {}", report.replays, output.display());
            println!("  Metadata: {}", report.metadata_path.display());
            println!(
                "  Logs: {} files in {}",
                report.logs,
                report.logs_dir.display()
            );
        }
    }
    Ok(())
}

fn handle_logs(app: &App, job_name: Option<&str>, limit: u32) -> CliResult {
    let entries = lock_store(&app.store)?.recent_logs(job_name, limit)?;

    if entries.is_empty() {
        println!("No log entries found.");
        return Ok(());
    }
    for entry in entries.iter().rev() {
        println!("{}", format_log_entry(entry));
    }
    Ok(())
}
