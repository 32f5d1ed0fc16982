//! Mobileye Aggregator CLI Application
//!
//! Command-line front end for the mobileye-aggregator library:
//! - Loads the camera DBC and the optional TOML configuration
//! - Replays a candump log, or reads candump lines from stdin
//! - Prints periodic snapshots (text table or JSON lines)
//! - Prints run statistics on exit

use anyhow::{Context, Result};
use clap::Parser;
use mobileye_aggregator::{
    Aggregator, CanFrame, CandumpSource, ChannelSource, Clock, FrameSource, RecordStore,
    SourceError,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

mod config;
mod report;

use config::{AppConfig, OutputFormat};
use report::Reporter;

/// Mobileye Aggregator - assemble camera objects and lanes from CAN frames
#[derive(Parser, Debug)]
#[command(name = "mobileye-cli")]
#[command(about = "Aggregate Mobileye camera objects and lanes from CAN logs", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the camera DBC file
    #[arg(long, value_name = "FILE")]
    dbc: Option<PathBuf>,

    /// candump log to replay (default: read candump lines from stdin)
    #[arg(short, long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Freshness threshold in milliseconds
    #[arg(long, value_name = "MS")]
    threshold_ms: Option<u64>,

    /// Stop after this many frames
    #[arg(long, value_name = "COUNT")]
    max_frames: Option<u64>,

    /// Snapshot output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

/// Ends a source after a fixed number of frames
struct Limited<S> {
    inner: S,
    remaining: u64,
}

impl<S: FrameSource> FrameSource for Limited<S> {
    fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>, SourceError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let frame = self.inner.receive(timeout)?;
        if frame.is_some() {
            self.remaining -= 1;
        }
        Ok(frame)
    }

    fn is_exhausted(&self) -> bool {
        self.remaining == 0 || self.inner.is_exhausted()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("Mobileye Aggregator CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using aggregator library v{}", mobileye_aggregator::VERSION);

    let config = resolve_config(&args)?;
    let dbc = config
        .input
        .dbc_file
        .clone()
        .context("No DBC file given (use --dbc or [input] dbc_file)")?;

    let aggregator = Aggregator::from_dbc(&dbc, config.aggregator.clone())
        .with_context(|| format!("Failed to initialize aggregator from {:?}", dbc))?;

    let (source, clock): (Box<dyn FrameSource + Send>, Clock) = match &config.input.log_file {
        Some(path) => {
            let source = CandumpSource::open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            (Box::new(source), Clock::FrameTimestamp)
        }
        None => {
            log::info!("Reading candump lines from stdin");
            (Box::new(stdin_source()), Clock::Wall)
        }
    };
    let mut source: Box<dyn FrameSource + Send> = match args.max_frames {
        Some(max) => Box::new(Limited {
            inner: source,
            remaining: max,
        }),
        None => source,
    };

    let reporter = Reporter::new(config.report.format, aggregator.freshness_policy());
    let interval = Duration::from_millis(config.report.interval_ms.max(1));
    let store = aggregator.store();
    let stop = Arc::new(AtomicBool::new(false));
    install_interrupt_handler(Arc::clone(&stop))?;
    let finished = AtomicBool::new(false);

    let stats = std::thread::scope(|scope| {
        scope.spawn(|| report_loop(&reporter, &store, clock, interval, &finished));

        let result = aggregator.run(&mut source, &stop, clock);
        finished.store(true, Ordering::Relaxed);
        result
    })
    .context("Frame source failed")?;
    drop(source);
    if stop.load(Ordering::Relaxed) {
        log::info!("Stopped on interrupt, frame source released");
    }

    let snapshot = store.snapshot();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    reporter.write_snapshot(&mut out, &snapshot, report::reference_time(&snapshot, clock))?;
    reporter.write_stats(&mut out, &stats)?;
    out.flush()?;

    Ok(())
}

/// Merge the optional config file with command-line overrides
fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    if let Some(dbc) = &args.dbc {
        config.input.dbc_file = Some(dbc.clone());
    }
    if let Some(log) = &args.log {
        config.input.log_file = Some(log.clone());
    }
    if let Some(threshold) = args.threshold_ms {
        config.aggregator.freshness_threshold_ms = threshold;
    }
    if let Some(format) = args.format {
        config.report.format = format;
    }

    log::debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// Raise `stop` on Ctrl-C so the loop ends between frames and the final
/// report still prints. A second Ctrl-C exits immediately.
fn install_interrupt_handler(stop: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        if request_stop(&stop) {
            std::process::exit(130);
        }
    })
    .context("Failed to install Ctrl-C handler")
}

/// Returns true when a stop was already pending
fn request_stop(stop: &AtomicBool) -> bool {
    let pending = stop.swap(true, Ordering::Relaxed);
    if !pending {
        log::info!("Interrupt received, stopping after the current frame");
    }
    pending
}

/// candump lines from stdin, parsed on a helper thread.
///
/// The helper owns the blocking read so the aggregator loop keeps honoring
/// its receive timeout.
fn stdin_source() -> ChannelSource {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut reader = CandumpSource::from_reader(io::stdin().lock());
        while !reader.is_exhausted() {
            match reader.receive(Duration::ZERO) {
                Ok(Some(frame)) => {
                    if tx.send(frame).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(SourceError::Parse { line, reason }) => {
                    log::warn!("Skipping malformed stdin line {}: {}", line, reason);
                }
                Err(e) => {
                    log::error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    ChannelSource::new(rx)
}

/// Print a snapshot every `interval` until `finished` is raised
fn report_loop(
    reporter: &Reporter,
    store: &RecordStore,
    clock: Clock,
    interval: Duration,
    finished: &AtomicBool,
) {
    let mut next = Instant::now() + interval;
    while !finished.load(Ordering::Relaxed) {
        if Instant::now() < next {
            std::thread::sleep(Duration::from_millis(10).min(interval));
            continue;
        }
        next += interval;

        let snapshot = store.snapshot();
        let now = report::reference_time(&snapshot, clock);
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(e) = reporter
            .write_snapshot(&mut out, &snapshot, now)
            .and_then(|_| out.flush())
        {
            log::error!("Failed to write snapshot: {}", e);
            return;
        }
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
