use std::process::ExitCode;

use camino::Utf8PathBuf;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use strainload::app::{App, RunRequest};
use strainload::bcp::{BulkLoader, CommandBulkLoader, ExternalLoad};
use strainload::config::{CliOverrides, ConfigLoader, EnvOverrides, ResolvedConfig};
use strainload::domain::{LoadMode, Pipeline};
use strainload::error::LoadError;
use strainload::output::{JsonOutput, OutputMode, TextOutput};
use strainload::store::{RegistryStore, SnapshotStore};

#[derive(Parser)]
#[command(name = "strainload")]
#[command(about = "Validate strain files against the registry and bulk load them")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create new strains (14-column file)")]
    Create(RunArgs),
    #[command(about = "Update existing strains and add allele links (6-column file)")]
    Update(RunArgs),
    #[command(about = "Apply a curator update file (6-column file, lenient flags)")]
    Curator(RunArgs),
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Input file; defaults to INPUT_FILE_DEFAULT.
    input: Option<String>,

    /// `preview` only validates, `load` also bulk loads.
    #[arg(value_enum, default_value_t = LoadMode::Preview)]
    mode: LoadMode,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    snapshot: Option<String>,

    #[arg(long)]
    output_dir: Option<String>,

    /// Date stamped on created rows (YYYY-MM-DD); defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<LoadError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &LoadError) -> u8 {
    match error {
        LoadError::MissingInput(_)
        | LoadError::NoInput
        | LoadError::ConfigRead(_)
        | LoadError::ConfigParse(_)
        | LoadError::MissingSnapshot
        | LoadError::SnapshotRead(_) => 2,
        LoadError::BulkLoad { .. }
        | LoadError::MissingTool(_)
        | LoadError::Store(_)
        | LoadError::CounterReservation(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (pipeline, args) = match cli.command {
        Commands::Create(args) => (Pipeline::Create, args),
        Commands::Update(args) => (Pipeline::Update, args),
        Commands::Curator(args) => (Pipeline::Curator, args),
    };

    let config = ConfigLoader::resolve(
        args.config.as_deref(),
        EnvOverrides::from_env(),
        CliOverrides {
            output_dir: args.output_dir.clone(),
            snapshot: args.snapshot.clone(),
        },
    )?;

    let input = args
        .input
        .clone()
        .map(Utf8PathBuf::from)
        .or_else(|| config.input_default.clone())
        .ok_or(LoadError::NoInput)?;
    let request = RunRequest {
        pipeline,
        mode: args.mode,
        input,
        date: args.date.unwrap_or_else(|| Local::now().date_naive()),
    };
    let output_mode = if args.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let snapshot = config.snapshot.clone().ok_or(LoadError::MissingSnapshot)?;
    let store = SnapshotStore::open(&snapshot, config.constants.clone())?;

    match config.bcp_command.clone() {
        Some(program) if !request.mode.is_sanity_check() => {
            info!(%program, "bulk loading through external command");
            let loader = CommandBulkLoader::new(program, &config.server, &config.database);
            execute(ExternalLoad::new(store, loader), config, &request, output_mode)
        }
        _ => execute(store, config, &request, output_mode),
    }
}

fn execute<S: RegistryStore + BulkLoader>(
    store: S,
    config: ResolvedConfig,
    request: &RunRequest,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let mut app = App::new(store, config);
    let report = match output_mode {
        OutputMode::Json => app.run(request, &JsonOutput)?,
        OutputMode::Text => app.run(request, &TextOutput)?,
    };
    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_report(&report).into_diagnostic()?,
    }
    Ok(())
}
