//! binscope CLI
//!
//! Watch sample directories, query the binned history, or produce samples.

use anyhow::{bail, Context, Result};
use binscope::{
    config::{Config, PlotConfig},
    core::{Aggregation, SampleStore, StoreError},
    export::FrameExporter,
    scanner::{DirectoryScanner, DirectoryWatcher, SampleGenerator, WatchEvent},
    stats::{create_shared_stats, IngestStats},
    VERSION,
};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "binscope")]
#[command(version = VERSION)]
#[command(about = "Time-binned multi-source sample store", long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the store parameters in the configuration file.
#[derive(Args, Debug, Default)]
struct StoreArgs {
    /// Width of a time bin in seconds
    #[arg(long)]
    bin_width: Option<f64>,

    /// Number of bins retained
    #[arg(long)]
    history: Option<usize>,

    /// Values per sample file
    #[arg(long)]
    sample_size: Option<usize>,
}

impl StoreArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(bin_width) = self.bin_width {
            config.store.bin_width = bin_width;
        }
        if let Some(history) = self.history {
            config.store.history_capacity = history;
        }
        if let Some(sample_size) = self.sample_size {
            config.store.sample_size = sample_size;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Watch source directories and report every configured plot on change
    Watch {
        /// Source directories (defaults to the configured sources)
        dirs: Vec<PathBuf>,

        #[command(flatten)]
        store: StoreArgs,

        /// Poll interval in milliseconds
        #[arg(long)]
        poll_ms: Option<u64>,

        /// Append non-empty frames to a JSON-lines file in the export directory
        #[arg(long)]
        export: bool,
    },

    /// Scan the directories once and print a query result as JSON
    Query {
        /// Source directories (defaults to the configured sources)
        dirs: Vec<PathBuf>,

        #[command(flatten)]
        store: StoreArgs,

        /// Aggregation mode (none, mean, sum or max)
        #[arg(long, default_value = "mean")]
        mode: String,

        /// Output rows
        #[arg(long, default_value = "1")]
        window: usize,

        /// Restrict to these sources (repeatable); all sources when omitted
        #[arg(long = "select")]
        selection: Vec<String>,
    },

    /// Write synthetic sample files into a directory until interrupted
    Generate {
        /// Output directory
        #[arg(default_value = "samples")]
        dir: PathBuf,

        /// Milliseconds between files
        #[arg(long, default_value = "100")]
        interval_ms: u64,

        /// Stop after this many files
        #[arg(long)]
        count: Option<u64>,

        /// Values per file
        #[arg(long, default_value = "720")]
        sample_size: usize,
    },

    /// Show configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Watch {
            dirs,
            store,
            poll_ms,
            export,
        } => cmd_watch(dirs, &store, poll_ms, export),
        Commands::Query {
            dirs,
            store,
            mode,
            window,
            selection,
        } => cmd_query(dirs, &store, &mode, window, selection),
        Commands::Generate {
            dir,
            interval_ms,
            count,
            sample_size,
        } => cmd_generate(&dir, interval_ms, count, sample_size),
        Commands::Config { init } => cmd_config(init),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "binscope=debug" } else { "binscope=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load the configuration file and apply command-line overrides.
fn load_config(dirs: Vec<PathBuf>, store: &StoreArgs) -> Result<Config> {
    let mut config = Config::load().context("Could not load configuration")?;
    store.apply(&mut config);
    if !dirs.is_empty() {
        config.sources = dirs;
    }
    if config.sources.is_empty() {
        bail!(
            "No source directories given; pass them as arguments or list them in {}",
            Config::config_path().display()
        );
    }
    config.validate()?;
    Ok(config)
}

/// Create a store with every configured source registered in order.
fn build_store(config: &Config) -> Result<SampleStore> {
    let mut store = SampleStore::new(config.store)?;
    for dir in &config.sources {
        store.add_source(&Config::source_name(dir));
    }
    Ok(store)
}

/// Scan one source directory and ingest whatever is new.
fn ingest_dir(store: &mut SampleStore, scanner: &DirectoryScanner, dir: &Path, stats: &IngestStats) {
    let name = Config::source_name(dir);
    let listing = match scanner.scan(dir, store.config().history_capacity) {
        Ok(listing) => listing,
        Err(e) => {
            warn!("Scan failed: {e}");
            return;
        }
    };
    stats.record_scan();

    match store.ingest(&name, listing.into_entries()) {
        Ok(report) => {
            stats.record_report(&report);
            debug!(
                source = %name,
                stored = report.stored,
                duplicates = report.duplicates,
                failures = report.load_failures,
                evicted = report.evicted,
                "Ingested"
            );
        }
        Err(StoreError::MonotonicityViolation {
            timestamp,
            oldest,
            report,
            ..
        }) => {
            stats.record_report(&report);
            warn!(
                source = %name,
                timestamp,
                oldest,
                rejected = report.rejected,
                "Entries older than the retained history were dropped"
            );
        }
        Err(e) => warn!(source = %name, "Ingest failed: {e}"),
    }
}

/// Run a plot's query against the current store contents.
fn run_plot(store: &SampleStore, plot: &PlotConfig, stats: &IngestStats) -> Result<binscope::Frame> {
    let registered: Vec<&str> = store.sources().collect();
    let selection = plot.resolve_selection(&registered);
    let frame = store.query(&selection, plot.mode, plot.window)?;
    stats.record_query(!frame.is_empty());
    Ok(frame)
}

fn cmd_watch(dirs: Vec<PathBuf>, store_args: &StoreArgs, poll_ms: Option<u64>, export: bool) -> Result<()> {
    let mut config = load_config(dirs, store_args)?;
    if let Some(ms) = poll_ms {
        config.poll_interval = Duration::from_millis(ms);
        config.validate()?;
    }

    println!("binscope v{VERSION}");
    println!();
    println!("Watching {} source(s):", config.sources.len());
    for dir in &config.sources {
        println!("  {}", dir.display());
    }
    println!(
        "  Bin width: {}s, history: {} bins, sample size: {}",
        config.store.bin_width, config.store.history_capacity, config.store.sample_size
    );
    println!("  Poll interval: {}ms", config.poll_interval.as_millis());

    let mut store = build_store(&config)?;
    let stats = create_shared_stats();
    let scanner = DirectoryScanner::new();

    let mut exporter = if export {
        config.ensure_directories()?;
        let exporter = FrameExporter::create(&config.export_path)
            .context("Could not create export file")?;
        println!("  Exporting to {}", exporter.path().display());
        println!("  Session ID: {}", exporter.session_id());
        Some(exporter)
    } else {
        None
    };

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let mut watcher = DirectoryWatcher::new(config.sources.clone(), config.poll_interval);
    watcher.start()?;
    let receiver = watcher.receiver().clone();

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(WatchEvent::Changed(dir)) => {
                ingest_dir(&mut store, &scanner, &dir, &stats);
                // Drain changes that piled up so the plots are computed once.
                while let Ok(event) = receiver.try_recv() {
                    match event {
                        WatchEvent::Changed(dir) => ingest_dir(&mut store, &scanner, &dir, &stats),
                        WatchEvent::Error { dir, message } => {
                            warn!(dir = %dir.display(), "Cannot read source directory: {message}")
                        }
                    }
                }

                for plot in &config.plots {
                    let frame = match run_plot(&store, plot, &stats) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(plot = %plot.name, "Query failed: {e}");
                            continue;
                        }
                    };
                    if frame.is_empty() {
                        debug!(plot = %plot.name, "No data");
                        continue;
                    }
                    info!(
                        plot = %plot.name,
                        rows = frame.rows(),
                        latest = frame.times.last().copied().unwrap_or(f64::NAN),
                        bins = store.len(),
                        "Frame ready"
                    );
                    if let Some(exporter) = exporter.as_mut() {
                        if let Err(e) = exporter.write(&plot.name, plot.mode, plot.window, &frame) {
                            error!("Could not write frame: {e}");
                        }
                    }
                }
            }
            Ok(WatchEvent::Error { dir, message }) => {
                warn!(dir = %dir.display(), "Cannot read source directory: {message}");
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                error!("Watcher disconnected unexpectedly");
                break;
            }
        }
    }

    println!();
    println!("Stopping...");
    watcher.stop();

    if let Some(mut exporter) = exporter {
        exporter.flush().context("Could not flush export file")?;
        println!(
            "Exported {} frame(s) to {}",
            exporter.written(),
            exporter.path().display()
        );
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

fn cmd_query(
    dirs: Vec<PathBuf>,
    store_args: &StoreArgs,
    mode: &str,
    window: usize,
    selection: Vec<String>,
) -> Result<()> {
    let config = load_config(dirs, store_args)?;
    let mode: Aggregation = mode.parse()?;

    let mut store = build_store(&config)?;
    let stats = IngestStats::new();
    let scanner = DirectoryScanner::new();
    for dir in &config.sources {
        ingest_dir(&mut store, &scanner, dir, &stats);
    }

    let plot = PlotConfig {
        name: "query".to_string(),
        mode,
        window,
        selection,
    };
    let frame = run_plot(&store, &plot, &stats)?;
    let record = binscope::FrameRecord::new(uuid::Uuid::new_v4(), &plot.name, mode, window, &frame);
    println!("{}", serde_json::to_string_pretty(&record)?);

    let snapshot = stats.snapshot();
    info!(
        stored = snapshot.stored,
        failures = snapshot.load_failures,
        rows = frame.rows(),
        "Query complete"
    );
    Ok(())
}

fn cmd_generate(dir: &Path, interval_ms: u64, count: Option<u64>, sample_size: usize) -> Result<()> {
    if sample_size == 0 {
        bail!("Sample size must be at least 1");
    }
    let generator = SampleGenerator::new(dir, sample_size)
        .with_context(|| format!("Could not create {}", dir.display()))?;

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    info!(dir = %generator.dir().display(), interval_ms, "Generating samples");
    let mut written = 0u64;
    while running.load(Ordering::SeqCst) && count.map_or(true, |n| written < n) {
        let path = generator.write_next()?;
        debug!(path = %path.display(), "Wrote sample");
        written += 1;
        thread::sleep(Duration::from_millis(interval_ms));
    }

    println!("Wrote {written} sample file(s) to {}", dir.display());
    Ok(())
}

fn cmd_config(init: bool) -> Result<()> {
    let path = Config::config_path();
    if init {
        if path.exists() {
            bail!("{} already exists", path.display());
        }
        Config::default().save()?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = Config::load()?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {}", path.display());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
