use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;

use acq_catalog::app::{App, AppOptions, ProgressSink};
use acq_catalog::config::{ConfigLoader, ResolvedConfig};
use acq_catalog::domain::{AcquisitionTime, DataKind, HkCategory};
use acq_catalog::error::CatalogError;
use acq_catalog::logging;
use acq_catalog::output::{ConsoleOutput, ConsoleProgress, JsonOutput};
use acq_catalog::store::{CatalogStats, SqliteCatalog};
use acq_catalog::sync::{SyncPolicy, SyncReport};

type CatalogApp = App<Arc<SqliteCatalog>>;

#[derive(Parser)]
#[command(name = "acqcat")]
#[command(about = "Catalog and bundle timestamped instrument acquisitions")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./acqcat.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Machine-readable output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Catalog every acquisition folder not yet in the catalog")]
    Sync(SyncArgs),
    #[command(about = "List acquisitions, newest first")]
    List,
    #[command(about = "Show one acquisition with its raw and science files")]
    Show(TimeArgs),
    #[command(about = "List raw files, or fetch the one of a unit")]
    Raw(DataArgs),
    #[command(about = "List science files, or fetch the one of a unit")]
    Sum(DataArgs),
    #[command(about = "Fetch one housekeeping or calibration file")]
    Hk(HkArgs),
    #[command(about = "Write every file of an acquisition into one .tar.gz bundle")]
    Bundle(BundleArgs),
}

#[derive(Args)]
struct SyncArgs {
    /// Repository root (overrides repository_path)
    #[arg(long)]
    repository: Option<Utf8PathBuf>,

    /// Skip folders that cannot be cataloged instead of stopping
    #[arg(long)]
    keep_going: bool,
}

#[derive(Args)]
struct TimeArgs {
    /// Acquisition time, e.g. 2018-04-06T14:20:35
    time: String,
}

#[derive(Args)]
struct DataArgs {
    time: String,

    #[arg(long)]
    unit: Option<u32>,

    /// Write the file here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct HkArgs {
    time: String,

    #[arg(value_enum)]
    category: HkCategory,

    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct BundleArgs {
    time: String,

    /// Defaults to <TIME>.tar.gz in the working directory
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct SyncResult<'a> {
    report: &'a SyncReport,
    catalog: CatalogStats,
}

#[derive(Serialize)]
struct WriteResult {
    path: String,
    bytes: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;
    if let Err(report) = run(cli) {
        let Some(error) = report.downcast_ref::<CatalogError>() else {
            eprintln!("{report:?}");
            return ExitCode::from(1);
        };
        if json {
            tracing::error!(status = error.status(), "{error}");
            let _ = JsonOutput::print_error(error);
        } else {
            eprintln!("{report:?}");
        }
        return ExitCode::from(map_exit_code(error));
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::NotFound(_) | CatalogError::InvalidTime(_) => 2,
        CatalogError::MalformedDirectoryName { .. }
        | CatalogError::AmbiguousFileMatch { .. }
        | CatalogError::MalformedUnitIndex { .. } => 3,
        CatalogError::DeadlineExceeded { .. } => 4,
        _ => 1,
    }
}

fn run(cli: Cli) -> miette::Result<()> {
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    logging::init(&config)?;

    let store = Arc::new(SqliteCatalog::open(&config.database_file)?);
    let app = App::new(store, AppOptions::from(&config));

    match cli.command {
        Commands::Sync(args) => run_sync(&app, &config, args, cli.json),
        Commands::List => {
            let acquisitions = app.list()?;
            if cli.json {
                JsonOutput::print_json(&acquisitions).into_diagnostic()
            } else {
                ConsoleOutput::print_list(&acquisitions);
                Ok(())
            }
        }
        Commands::Show(args) => {
            let detail = app.show(&parse_time(&args.time)?)?;
            if cli.json {
                JsonOutput::print_json(&detail).into_diagnostic()
            } else {
                ConsoleOutput::print_detail(&detail);
                Ok(())
            }
        }
        Commands::Raw(args) => run_data(&app, DataKind::Raw, args, cli.json),
        Commands::Sum(args) => run_data(&app, DataKind::Science, args, cli.json),
        Commands::Hk(args) => {
            let time = parse_time(&args.time)?;
            let bytes = write_output(args.output.as_deref(), |out| {
                app.fetch_hk_file(&time, args.category, out)
            })?;
            report_written(args.output.as_deref(), bytes, cli.json)
        }
        Commands::Bundle(args) => {
            let time = parse_time(&args.time)?;
            let path = args
                .output
                .unwrap_or_else(|| PathBuf::from(format!("{time}.tar.gz")));
            let summary = write_output(Some(&path), |out| app.bundle(&time, out))?;
            if cli.json {
                JsonOutput::print_json(&summary).into_diagnostic()
            } else {
                ConsoleOutput::print_archive(&summary, &path.display().to_string());
                Ok(())
            }
        }
    }
}

fn run_sync(
    app: &CatalogApp,
    config: &ResolvedConfig,
    args: SyncArgs,
    json: bool,
) -> miette::Result<()> {
    let repository = args
        .repository
        .unwrap_or_else(|| config.repository_path.clone());
    let policy = if args.keep_going {
        SyncPolicy::SkipFailedFolders
    } else {
        SyncPolicy::AbortOnError
    };
    let sink: &dyn ProgressSink = if json { &JsonOutput } else { &ConsoleProgress };

    let report = app.sync(&repository, policy, sink)?;
    let catalog = app.stats()?;
    if json {
        JsonOutput::print_json(&SyncResult {
            report: &report,
            catalog,
        })
        .into_diagnostic()
    } else {
        ConsoleOutput::print_report(&report);
        println!(
            "catalog: {} acquisitions, {} raw files, {} science files",
            catalog.acquisitions, catalog.raw_files, catalog.sum_files
        );
        Ok(())
    }
}

fn run_data(app: &CatalogApp, kind: DataKind, args: DataArgs, json: bool) -> miette::Result<()> {
    let time = parse_time(&args.time)?;
    let Some(unit) = args.unit else {
        let files = app.data_files(&time, kind)?;
        if json {
            return JsonOutput::print_json(&files).into_diagnostic();
        }
        ConsoleOutput::print_files(kind, &files);
        return Ok(());
    };

    let bytes = write_output(args.output.as_deref(), |out| {
        app.fetch_data_file(&time, kind, unit, out)
    })?;
    report_written(args.output.as_deref(), bytes, json)
}

fn parse_time(value: &str) -> Result<AcquisitionTime, CatalogError> {
    value.parse()
}

fn write_output<T>(
    path: Option<&Path>,
    write: impl FnOnce(&mut dyn Write) -> Result<T, CatalogError>,
) -> miette::Result<T> {
    let Some(path) = path else {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        return Ok(write(&mut out)?);
    };

    let file = File::create(path)
        .map_err(|err| CatalogError::Filesystem(format!("create {}: {err}", path.display())))?;
    let mut out = BufWriter::new(file);
    let result = write(&mut out).and_then(|value| {
        out.flush()
            .map_err(|err| CatalogError::Filesystem(format!("write {}: {err}", path.display())))?;
        Ok(value)
    });
    drop(out);
    if result.is_err() {
        let _ = fs::remove_file(path);
    }
    Ok(result?)
}

fn report_written(path: Option<&Path>, bytes: u64, json: bool) -> miette::Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    if json {
        JsonOutput::print_json(&WriteResult {
            path: path.display().to_string(),
            bytes,
        })
        .into_diagnostic()
    } else {
        println!("wrote {bytes} bytes to {}", path.display());
        Ok(())
    }
}
