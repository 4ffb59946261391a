use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use runsheet_core::domain::{CellValue, coerce};
use runsheet_core::impls::CsvFileTable;
use runsheet_core::{
    ClaimedRun, ErrorKind, RunId, RunSpec, RunWriter, RunsheetSettings,
    SessionBuilder, WorkerSession,
};

#[derive(Parser)]
#[command(name = "runsheet")]
#[command(about = "Claim and run experiments from a shared table", long_about = None)]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Table file (overrides settings)
    #[arg(long, global = true)]
    table: Option<PathBuf>,

    /// Cells use ',' as the decimal separator (overrides settings)
    #[arg(long, global = true)]
    comma_decimal: bool,

    /// Settle interval in milliseconds (overrides settings)
    #[arg(long, global = true)]
    settle_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new table file with the given keys and defaults
    Init {
        /// Config key with its default, e.g. lr=0.1 (repeatable)
        #[arg(short = 'd', long = "default", value_name = "KEY=VALUE")]
        defaults: Vec<String>,
    },

    /// Append a ready run
    Add {
        /// Run name (defaults to the run id)
        #[arg(short = 'n', long)]
        name: Option<String>,

        /// Config value for this run, e.g. lr=0.5 (repeatable)
        #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
        values: Vec<String>,

        /// Add several runs from a JSON array of objects instead
        #[arg(long, conflicts_with_all = ["name", "values"])]
        json: Option<String>,
    },

    /// Claim one ready run and print it as JSON (the run is left running)
    Claim,

    /// Claim runs one after another and execute a command for each
    Work {
        /// Stop when no run is ready instead of polling
        #[arg(long)]
        once: bool,

        /// Command to run; the config is passed in RUNSHEET_* environment variables
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Print run counts per status
    Status,

    /// Print the resolved config of a run
    Show {
        /// Run id (0 = first run row)
        run_id: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    match cli.command {
        Commands::Init { defaults } => init(&settings, &defaults).await,
        Commands::Add { name, values, json } => add(&settings, name, &values, json).await,
        Commands::Claim => claim(&settings).await,
        Commands::Work { once, command } => work(&settings, &command, once).await,
        Commands::Status => status(&settings).await,
        Commands::Show { run_id } => show(&settings, RunId::new(run_id)).await,
    }
}

fn load_settings(cli: &Cli) -> Result<RunsheetSettings> {
    let mut settings = match &cli.config {
        Some(path) => RunsheetSettings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => RunsheetSettings::default(),
    };
    if let Some(table) = &cli.table {
        settings.table.path = table.clone();
    }
    if cli.comma_decimal {
        settings.table.comma_decimal = true;
    }
    if let Some(ms) = cli.settle_ms {
        settings.claim.settle_interval_ms = ms;
    }
    Ok(settings)
}

fn backend(settings: &RunsheetSettings) -> Arc<CsvFileTable> {
    Arc::new(CsvFileTable::new(&settings.table.path))
}

async fn connect(settings: &RunsheetSettings) -> Result<WorkerSession> {
    SessionBuilder::new(backend(settings))
        .settings(settings)
        .build()
        .await
        .with_context(|| format!("failed to open table {}", settings.table.path.display()))
}

async fn init(settings: &RunsheetSettings, defaults: &[String]) -> Result<()> {
    let format = settings.decimal_format();
    let mut header = vec![
        "run_name".to_string(),
        "status".to_string(),
        "worker_name".to_string(),
    ];
    let mut default_row = vec![String::new(); header.len()];
    for assignment in defaults {
        let (key, value) = parse_assignment(assignment)?;
        header.push(key);
        default_row.push(format.render(&value));
    }

    CsvFileTable::create(&settings.table.path, header, default_row)
        .await
        .context("failed to create table")?;
    info!(path = %settings.table.path.display(), "table created");
    Ok(())
}

async fn add(
    settings: &RunsheetSettings,
    name: Option<String>,
    values: &[String],
    json: Option<String>,
) -> Result<()> {
    let specs = match json {
        Some(json) => serde_json::from_str::<Vec<RunSpec>>(&json).context("invalid --json")?,
        None => {
            let mut spec = RunSpec {
                name,
                ..RunSpec::default()
            };
            for assignment in values {
                let (key, value) = parse_assignment(assignment)?;
                spec = spec.set(key, value);
            }
            vec![spec]
        }
    };

    let writer = RunWriter::new(backend(settings), settings.decimal_format());
    let ids = writer.write_runs(specs).await.context("failed to add runs")?;
    for run_id in ids {
        println!("{run_id}");
    }
    Ok(())
}

async fn claim(settings: &RunsheetSettings) -> Result<()> {
    let mut session = connect(settings).await?;
    match session.find_claim_and_start().await? {
        Some(run) => println!("{}", serde_json::to_string_pretty(&run)?),
        None => bail!("no run could be claimed"),
    }
    Ok(())
}

async fn status(settings: &RunsheetSettings) -> Result<()> {
    let mut session = connect(settings).await?;
    let counts = session.status_counts().await?;
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(())
}

async fn show(settings: &RunsheetSettings, run_id: RunId) -> Result<()> {
    let session = connect(settings).await?;
    let config = session.resolve_config(run_id)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// worker：table と外部コマンドをつなぐループ
async fn work(settings: &RunsheetSettings, command: &[String], once: bool) -> Result<()> {
    let mut session = connect(settings).await?;
    let poll = settings.poll_interval();
    info!(worker = %session.worker_token(), "worker started");

    loop {
        // 1) ready な run を 1 件 claim
        match session.find_claim_and_start().await {
            // 2) コマンドを実行し、3) 結果で status を確定
            Ok(Some(run)) => run_claimed(&mut session, &run, command, poll).await?,
            Ok(None) if once => {
                info!("no ready run left");
                return Ok(());
            }
            Ok(None) => {
                if wait_or_shutdown(poll).await {
                    return Ok(());
                }
            }
            Err(e) if e.kind() == ErrorKind::Infrastructure => {
                warn!(error = %e, "table unavailable, backing off");
                if wait_or_shutdown(poll).await {
                    return Ok(());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Sleep for `duration`; returns true if Ctrl-C arrived first.
async fn wait_or_shutdown(duration: Duration) -> bool {
    tokio::select! {
        _ = sleep(duration) => false,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            true
        }
    }
}

async fn execute(
    session: &mut WorkerSession,
    run: &ClaimedRun,
    command: &[String],
    poll: Duration,
) -> Result<ExitStatus> {
    let Some((program, args)) = command.split_first() else {
        bail!("no command given");
    };

    let mut child = Command::new(program)
        .args(args)
        .env("RUNSHEET_RUN_ID", run.run_id.to_string())
        .env("RUNSHEET_RUN_NAME", &run.run_name)
        .env("RUNSHEET_CONFIG", serde_json::to_string(&run.config)?)
        .envs(
            run.config
                .iter()
                .map(|(key, value)| (env_key(key), value.to_cell_string())),
        )
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    info!(run_id = %run.run_id, run_name = %run.run_name, pid = ?child.id(), "command started");

    let mut ticker = tokio::time::interval(poll);
    ticker.tick().await;
    loop {
        tokio::select! {
            exit = child.wait() => {
                return exit.with_context(|| format!("failed to wait for {program}"));
            }
            _ = ticker.tick() => {
                match session.sync(None).await {
                    Ok(update) if update.has_changes() => {
                        info!(keys = ?update.changed_keys, "config edited during the run");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "config sync failed"),
                }
            }
        }
    }
}

/// Run the command for a claimed run and record how it ended.
///
/// The row never stays `running` because of a local failure: a command that
/// cannot be started is recorded as `failed (spawn error)` before the error
/// is returned.
async fn run_claimed(
    session: &mut WorkerSession,
    run: &ClaimedRun,
    command: &[String],
    poll: Duration,
) -> Result<()> {
    match execute(session, run, command, poll).await {
        Ok(exit) => finish(session, &exit_status_text(exit), poll).await,
        Err(e) => {
            error!(run_id = %run.run_id, error = %e, "command could not be run");
            finish(session, STATUS_SPAWN_ERROR, poll).await?;
            Err(e)
        }
    }
}

const STATUS_SPAWN_ERROR: &str = "failed (spawn error)";

fn exit_status_text(exit: ExitStatus) -> String {
    if exit.success() {
        return "done".to_string();
    }
    match exit.code() {
        Some(code) => format!("failed (exit {code})"),
        None => "failed (killed)".to_string(),
    }
}

/// Record the final status, waiting out table outages.
async fn finish(session: &mut WorkerSession, status: &str, poll: Duration) -> Result<()> {
    loop {
        match session.finish_run(status).await {
            Ok(finished) => {
                info!(run_id = %finished.run_id, status = %status, "run recorded");
                return Ok(());
            }
            Err(e) if e.kind() == ErrorKind::Infrastructure => {
                warn!(error = %e, status = %status, "table unavailable, final status not recorded yet");
                if wait_or_shutdown(poll).await {
                    return Err(e).context("shut down before the final status was recorded");
                }
            }
            Err(e) => {
                error!(error = %e, "could not record the final status");
                return Err(e.into());
            }
        }
    }
}

/// `KEY=VALUE` with VALUE coerced like a table cell.
fn parse_assignment(assignment: &str) -> Result<(String, CellValue)> {
    let Some((key, value)) = assignment.split_once('=') else {
        bail!("expected KEY=VALUE, got {assignment:?}");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("empty key in {assignment:?}");
    }
    Ok((key.to_string(), coerce(value.trim())))
}

/// `learning-rate` -> `RUNSHEET_LEARNING_RATE`
fn env_key(key: &str) -> String {
    let name: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("RUNSHEET_{name}")
}
