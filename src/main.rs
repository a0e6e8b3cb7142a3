//! cg-stat-collector
//!
//! Samples cgroups and the process table on an interval and pushes the
//! resulting documents to the configured targets. This is the main entry
//! point that resolves configuration, sets up logging and runs the loop.

use anyhow::Context;
use clap::Parser;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};

use cg_stat_collector::cli::{Args, LogLevel};
use cg_stat_collector::config::{
    build_collector, resolve_config, show_config, validate_effective_config, Config,
};
use cg_stat_collector::startup_checks;

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn request_stop(_: libc::c_int) {
    STOP.store(true, Ordering::Relaxed);
}

/// Initializes tracing logging subsystem with configured log level.
/// Logs go to stderr so the console target owns stdout.
fn setup_logging(level: LogLevel) {
    let filter = match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    debug!("Logging initialized with level: {:?}", level);
}

/// SIGINT and SIGTERM ask the loop to stop after the running cycle.
fn install_stop_handler() {
    let action = SigAction::new(
        SigHandler::Handler(request_stop),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only stores to an atomic, which is async-signal-safe
        if let Err(e) = unsafe { sigaction(signal, &action) } {
            warn!("Failed to install {} handler: {}", signal, e);
        }
    }
}

/// Exits with code 1 when the configuration does not validate.
fn exit_if_invalid(config: &Config) {
    if let Err(e) = validate_effective_config(config) {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = resolve_config(&args)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("Failed to load configuration")?;

    // Early exits for show/check modes
    if args.check_config {
        exit_if_invalid(&config);
        println!("✅ Configuration is valid");
        return Ok(());
    }
    if args.show_config {
        return show_config(&config, args.config_format).map_err(|e| anyhow::anyhow!("{}", e));
    }

    exit_if_invalid(&config);
    setup_logging(config.log_level()?);

    info!("Starting cg-stat-collector {}", env!("CARGO_PKG_VERSION"));
    startup_checks::validate_requirements(&config);

    let mut collector = build_collector(&config).context("Failed to set up sources and targets")?;
    info!(
        "{} sources, {} targets, interval {}s",
        collector.source_count(),
        collector.target_count(),
        config.interval()
    );

    install_stop_handler();
    let cycles = collector.run(Duration::from_secs_f64(config.interval()), &STOP);

    info!("cg-stat-collector stopped after {} cycles", cycles);
    Ok(())
}
