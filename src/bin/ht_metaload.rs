use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use ht_metaload::app::{DelimitedSink, Loader};
use ht_metaload::config::{ConfigLoader, ResolvedConfig, SamplelessPolicy};
use ht_metaload::domain::{Archive, TranslationTable};
use ht_metaload::error::LoadError;
use ht_metaload::keys::BatchKeys;
use ht_metaload::reconcile::Baseline;
use ht_metaload::report::{ReportWriter, render_qc};
use ht_metaload::store::InputStore;

#[derive(Parser)]
#[command(name = "ht-metaload")]
#[command(about = "Load high-throughput expression experiment metadata from archive files")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Load a GEO eSummary batch plus its MINiML sample files")]
    Geo(GeoArgs),
    #[command(about = "Load ArrayExpress experiments from an ID list")]
    Ae(AeArgs),
}

#[derive(Args)]
struct GeoArgs {
    /// eSummary batch file, optionally gzipped.
    batch_file: String,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct AeArgs {
    /// ID list file, one `<exptID>\t<action>` per line.
    id_list: String,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct CommonArgs {
    #[arg(long)]
    config: Option<String>,

    /// Output directory for the bulk-load row files.
    #[arg(long, default_value = "output")]
    out_dir: String,

    #[arg(long)]
    max_samples: Option<usize>,

    /// Override the zero-accepted-samples policy from the config.
    #[arg(long, value_enum)]
    sampleless: Option<SamplelessCli>,

    /// Starting primary keys for the experiment, sample, and key/value
    /// tables.
    #[arg(long, default_value_t = 1)]
    experiment_key: u64,
    #[arg(long, default_value_t = 1)]
    sample_key: u64,
    #[arg(long, default_value_t = 1)]
    key_value_key: u64,

    /// Parse and classify only; write no row files or reports.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SamplelessCli {
    Load,
    Skip,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(load) = report.downcast_ref::<LoadError>() {
            return ExitCode::from(map_exit_code(load));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &LoadError) -> u8 {
    match error {
        LoadError::MissingConfig | LoadError::ConfigRead(_) | LoadError::ConfigParse(_) => 2,
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
    match cli.command {
        Commands::Geo(args) => {
            let input = Utf8PathBuf::from(args.batch_file.as_str());
            run_batch(Archive::Geo, input, args.common)
        }
        Commands::Ae(args) => {
            let input = Utf8PathBuf::from(args.id_list.as_str());
            run_batch(Archive::ArrayExpress, input, args.common)
        }
    }
}

fn run_batch(archive: Archive, input: Utf8PathBuf, args: CommonArgs) -> miette::Result<()> {
    let config = resolve_config(&args)?;

    let table_path = config.translation_table.clone().ok_or_else(|| {
        LoadError::Translation("no translation_table configured".to_string())
    })?;
    let table =
        TranslationTable::from_json(&InputStore::read_to_string(&table_path).into_diagnostic()?)
            .into_diagnostic()?;

    let baseline = match &config.baseline {
        Some(path) => Baseline::from_json(&InputStore::read_to_string(path).into_diagnostic()?)
            .into_diagnostic()?,
        None => Baseline::default(),
    };

    let keys = BatchKeys::starting_at(args.experiment_key, args.sample_key, args.key_value_key);
    let sink = DelimitedSink::new(Utf8PathBuf::from(args.out_dir.as_str()));
    let reports = ReportWriter::new(config.reports_dir.clone());
    let mut loader = Loader::new(config, table, baseline, keys, sink);

    match archive {
        Archive::Geo => loader.run_geo(&input).into_diagnostic()?,
        Archive::ArrayExpress => loader.run_ae(&input).into_diagnostic()?,
    }

    let today = chrono::Local::now().date_naive();
    if args.dry_run {
        println!(
            "{}",
            render_qc(archive, today, &loader.summary, &loader.ledger)
        );
        return Ok(());
    }

    loader.sink.flush().into_diagnostic()?;
    let qc = reports
        .write_qc(archive, today, &loader.summary, &loader.ledger)
        .into_diagnostic()?;
    let changes = reports
        .write_reconciliation(archive, today, &loader.engine)
        .into_diagnostic()?;
    println!(
        "loaded {} experiments, {} samples; QC report: {qc}; sample changes: {changes}",
        loader.summary.experiments_loaded, loader.summary.samples_loaded
    );
    Ok(())
}

fn resolve_config(args: &CommonArgs) -> miette::Result<ResolvedConfig> {
    let mut config = ConfigLoader::resolve(args.config.as_deref()).into_diagnostic()?;
    if let Some(max_samples) = args.max_samples {
        config.max_samples = max_samples;
    }
    if let Some(policy) = args.sampleless {
        config.sampleless = match policy {
            SamplelessCli::Load => SamplelessPolicy::Load,
            SamplelessCli::Skip => SamplelessPolicy::Skip,
        };
    }
    Ok(config)
}
