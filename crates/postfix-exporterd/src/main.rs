//! postfix-exporterd - Postfix metrics collector daemon.
//!
//! Runs a collection cycle on a fixed interval and writes the exposition to a
//! textfile for node_exporter's textfile collector. With `--once` a single
//! cycle is printed to stdout.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use postfix_exporter_core::{ExporterConfig, LogCollector, VERSION};

/// Postfix metrics collector daemon.
#[derive(Parser, Debug)]
#[command(name = "postfix-exporterd", about = "Postfix metrics collector daemon", version = VERSION)]
struct Args {
    /// Collection interval in seconds.
    #[arg(short, long, default_value = "15", env = "POSTFIX_EXPORTER_INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Textfile the exposition is written to after every cycle.
    #[arg(long, default_value = "./postfix.prom", env = "POSTFIX_EXPORTER_TEXTFILE")]
    textfile: PathBuf,

    /// Run one cycle, print the exposition to stdout and exit.
    #[arg(long)]
    once: bool,

    /// Postfix log file.
    #[arg(long, default_value = "/var/log/mail.log", env = "POSTFIX_EXPORTER_LOG_PATH")]
    log_path: PathBuf,

    /// Postfix queue directory.
    #[arg(long, default_value = "/var/spool/postfix", env = "POSTFIX_EXPORTER_QUEUE_ROOT")]
    queue_root: PathBuf,

    /// Lines read from the end of the log when no position is saved.
    #[arg(long, default_value = "1000", env = "POSTFIX_EXPORTER_BOOTSTRAP_LINES")]
    bootstrap_lines: usize,

    /// Counter state file.
    #[arg(
        long,
        default_value = "/var/lib/postfix-exporter/state.json",
        env = "POSTFIX_EXPORTER_STATE_PATH"
    )]
    state_path: PathBuf,

    /// Metric name prefix.
    #[arg(long, default_value = "postfix", env = "POSTFIX_EXPORTER_PREFIX")]
    prefix: String,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: PathBuf,

    /// postconf binary used to discover the Postfix version.
    #[arg(long, default_value = "postconf", env = "POSTFIX_EXPORTER_POSTCONF")]
    postconf_path: PathBuf,

    /// Postfix config directory passed to postconf as -c.
    #[arg(long, env = "POSTFIX_EXPORTER_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn exporter_config(&self) -> ExporterConfig {
        ExporterConfig {
            log_path: self.log_path.clone(),
            queue_root: self.queue_root.clone(),
            bootstrap_lines: self.bootstrap_lines,
            state_path: self.state_path.clone(),
            prefix: self.prefix.clone(),
            proc_path: self.proc_path.clone(),
            postconf_path: self.postconf_path.clone(),
            config_dir: self.config_dir.clone(),
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
///
/// Logs go to stderr so `--once` output on stdout stays clean.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["postfix_exporterd", "postfix_exporter_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Replaces `path` with `contents` so readers never see a partial file.
fn write_textfile(path: &Path, contents: &str) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = File::create(&tmp)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let collector = match LogCollector::new(args.exporter_config()) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    if args.once {
        return match collector.scrape() {
            Ok(text) => {
                print!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Collection cycle failed: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    info!("postfix-exporterd {} starting", VERSION);
    info!(
        "Config: interval={}s, log={}, state={}, textfile={}",
        args.interval,
        args.log_path.display(),
        args.state_path.display(),
        args.textfile.display()
    );

    let interval = Duration::from_secs(args.interval);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!("Starting collection loop");

    let mut cycle_count: u64 = 0;
    while running.load(Ordering::SeqCst) {
        // A failed cycle leaves the previous textfile in place.
        match collector.scrape() {
            Ok(text) => {
                cycle_count += 1;
                match write_textfile(&args.textfile, &text) {
                    Ok(()) => debug!("Cycle #{}: {} bytes written", cycle_count, text.len()),
                    Err(e) => error!(
                        "Failed to write textfile {}: {}",
                        args.textfile.display(),
                        e
                    ),
                }
            }
            Err(e) => {
                error!("Collection cycle failed: {}", e);
            }
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutdown complete after {} cycles", cycle_count);
    ExitCode::SUCCESS
}
