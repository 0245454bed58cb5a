//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use hashstack_artifacts::{latest_super_index, verify_archive};
use hashstack_core::{Pipeline, ProgressReporter, RunReport, Stage, TaskOutcome};
use hashstack_shared::{
    AppConfig, FetchMode, init_config, init_config_at, load_config, load_config_from,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// hashstack: nested content-addressed excerpt archives.
#[derive(Parser)]
#[command(
    name = "hashstack",
    version,
    about = "Fetch excerpts into hashed units, bundles and super-bundles, and publish the top layer.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.hashstack/hashstack.toml).
    #[arg(long, global = true, env = "HASHSTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Fetcher selection.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum ModeArg {
    Baseline,
    Accelerated,
}

impl From<ModeArg> for FetchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Baseline => FetchMode::Baseline,
            ModeArg::Accelerated => FetchMode::Accelerated,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build one super-bundle and publish it.
    Run(RunArgs),

    /// Recompute the hashes of a bundle or super-bundle archive.
    Verify {
        /// Archive to check.
        archive: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub(crate) struct RunArgs {
    /// Super-bundle index, starting at 1 (defaults to one past the latest archive).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub super_index: Option<u32>,

    /// Units per bundle.
    #[arg(long)]
    pub units_per_bundle: Option<usize>,

    /// Bundles per super-bundle.
    #[arg(long)]
    pub bundles_per_super: Option<usize>,

    /// Concurrent fetch workers.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Fetcher implementation.
    #[arg(long)]
    pub mode: Option<ModeArg>,

    /// Keep the super-bundle local.
    #[arg(long)]
    pub no_publish: bool,

    /// Seed for source sampling.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "hashstack=info",
        1 => "hashstack=debug",
        _ => "hashstack=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run(args) => cmd_run(config_path, args).await,
        Command::Verify { archive } => cmd_verify(&archive),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

async fn cmd_run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let mut config = resolve_config(config_path)?;

    if let Some(m) = args.units_per_bundle {
        config.batch.units_per_bundle = m;
    }
    if let Some(k) = args.bundles_per_super {
        config.batch.bundles_per_super = k;
    }
    if let Some(w) = args.workers {
        config.fetch.workers = w;
    }
    if let Some(mode) = args.mode {
        config.fetch.mode = mode.into();
    }
    if args.no_publish {
        config.publish.enabled = false;
    }

    let super_index = match args.super_index {
        Some(index) => index,
        None => match latest_super_index(&config.archive.super_dir())? {
            Some(latest) => latest
                .checked_add(1)
                .ok_or_else(|| eyre!("super index {latest} is the last one available"))?,
            None => 1,
        },
    };

    info!(
        super_index,
        mode = %config.fetch.mode,
        workers = config.fetch.workers,
        publish = config.publish.enabled,
        "starting hashstack run"
    );

    let pipeline = Pipeline::from_config(config)?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let batch = pipeline.config().batch;
    let reporter = CliProgress::new(
        batch.units_per_bundle * batch.bundles_per_super,
        batch.bundles_per_super,
    );
    let report = pipeline.run(super_index, &mut rng, &reporter).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    match &report.failed_stage {
        Some(stage) => Err(eyre!("no super-bundle produced: {stage} failed")),
        None => Ok(()),
    }
}

fn print_report(report: &RunReport) {
    println!();
    println!("  Super-bundle {:04}", report.super_index);

    for (label, hash) in report.completed(Stage::Unit) {
        println!("  unit    {label:<24} {hash}");
    }
    for (label, hash) in report.completed(Stage::Bundle) {
        println!("  bundle  {label:<24} {hash}");
    }
    for task in report.failures() {
        if let TaskOutcome::Failed { error } = &task.outcome {
            println!("  FAILED  {:<24} {error}", task.label);
        }
    }

    println!();
    match (report.super_hash(), report.super_color(), &report.failed_stage) {
        (Some(hash), Some(color), _) => {
            println!("  Super hash: {hash}");
            println!("  Colour:     {color}");
        }
        (_, _, Some(stage)) => println!("  Super hash: none (failed at {stage})"),
        _ => println!("  Super hash: none"),
    }
    println!("  Publish:    {}", report.publish);
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Unit and bundle progress bars.
struct CliProgress {
    _bars: MultiProgress,
    units: ProgressBar,
    bundles: ProgressBar,
}

impl CliProgress {
    fn new(total_units: usize, total_bundles: usize) -> Self {
        let bars = MultiProgress::new();
        let style =
            ProgressStyle::with_template("{prefix:>8} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");

        let units = bars.add(ProgressBar::new(total_units as u64));
        units.set_style(style.clone());
        units.set_prefix("units");

        let bundles = bars.add(ProgressBar::new(total_bundles as u64));
        bundles.set_style(style);
        bundles.set_prefix("bundles");

        Self {
            _bars: bars,
            units,
            bundles,
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bundles.set_message(name.to_string());
    }

    fn unit_done(&self, current: usize, _total: usize) {
        self.units.set_position(current as u64);
    }

    fn bundle_done(&self, bundle_index: u32, current: usize, _total: usize) {
        self.bundles.set_position(current as u64);
        self.bundles.set_message(format!("bundle_{bundle_index:04}"));
    }

    fn done(&self, _report: &RunReport) {
        self.units.finish_and_clear();
        self.bundles.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// verify / config
// ---------------------------------------------------------------------------

fn cmd_verify(archive: &Path) -> Result<()> {
    let report = verify_archive(archive)?;

    println!("  {} {:04}: {}", report.kind, report.index, report.hash);
    if report.is_valid() {
        println!("  all hashes match");
        return Ok(());
    }

    for m in &report.mismatches {
        println!("  MISMATCH {}: stored {} computed {}", m.item, m.stored, m.computed);
    }
    Err(eyre!("{} hash mismatch(es) in {}", report.mismatches.len(), archive.display()))
}

fn cmd_config_init(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => init_config_at(path)?,
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
