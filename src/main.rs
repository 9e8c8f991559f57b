mod listing;

use anyhow::{Context, anyhow};
use clap::Parser;
use cms_perf::{ConfigError, FieldError, FieldExprs, Registry, ReportConfig, ScheduleWeight, parse_duration};
use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Exit status for invalid expressions or directives.
const CONFIG_ERROR: u8 = 2;

/// Performance sensor for the XRootD cms.perf directive
#[derive(Parser)]
#[command(name = "cms-perf", version, long_about = None)]
#[command(after_help = "\
In regular intervals, outputs a single line with percentages of: system load, cpu utilization, \
memory utilization, paging load, and network utilization. The paging load exists for historical \
reasons; it cannot be reliably computed.")]
struct Cli {
    /// Interval between output; suffixed by s (default), m, or h
    #[arg(long, default_value = "60", value_parser = parse_duration)]
    interval: Duration,

    /// Duration over which reported load ramps down from 100 after start
    #[arg(long, default_value = "0", value_parser = parse_duration)]
    rampup: Duration,

    /// Expression to compute system load percentage
    #[arg(long, default_value = FieldExprs::DEFAULT_PRUNQ)]
    prunq: String,

    /// Expression to compute cpu utilization percentage
    #[arg(long, default_value = FieldExprs::DEFAULT_PCPU)]
    pcpu: String,

    /// Expression to compute memory utilization percentage
    #[arg(long, default_value = FieldExprs::DEFAULT_PMEM)]
    pmem: String,

    /// Expression to compute paging load percentage
    #[arg(long, default_value = FieldExprs::DEFAULT_PPAG)]
    ppag: String,

    /// Expression to compute network utilization percentage
    #[arg(long, default_value = FieldExprs::DEFAULT_PIO)]
    pio: String,

    /// cms.sched directive to report total load and maxload on stderr
    #[arg(long, value_parser = ScheduleWeight::from_directive)]
    sched: Option<ScheduleWeight>,

    /// Stop after this many reports
    #[arg(long)]
    ticks: Option<u64>,

    /// List all sensors, transforms and literals usable in expressions
    #[arg(long)]
    list_callables: bool,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, env = "CMS_PERF_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let registry = Registry::with_builtins().context("failed to register built-in sensors")?;
    if cli.list_callables {
        listing::print_callables(&registry, io::stdout().is_terminal());
        return Ok(ExitCode::SUCCESS);
    }

    let exprs = FieldExprs { prunq: cli.prunq, pcpu: cli.pcpu, pmem: cli.pmem, ppag: cli.ppag, pio: cli.pio };
    let config = ReportConfig { interval: cli.interval, rampup: cli.rampup, schedule: cli.sched, ticks: cli.ticks };
    let mut reporter = match cms_perf::reporter(&registry, &exprs, config, io::stdout(), io::stderr()) {
        Ok(reporter) => reporter,
        Err(err) => {
            print_field_error(&err);
            return Ok(ExitCode::from(CONFIG_ERROR));
        }
    };

    // The loop blocks in sensors and pauses, so it gets its own thread; this
    // one only waits for signals.
    let (handle, shutdown) = cms_perf::shutdown_channel();
    let worker = thread::Builder::new()
        .name("reporter".to_string())
        .spawn(move || reporter.run(&shutdown))
        .context("failed to start reporter thread")?;
    let mut finished = tokio::task::spawn_blocking(move || worker.join());

    let joined = tokio::select! {
        joined = &mut finished => joined,
        () = shutdown_signal() => {
            handle.trigger();
            finished.await
        }
    };
    let ticks = joined
        .context("reporter task failed")?
        .map_err(|_| anyhow!("reporter thread panicked"))?
        .context("reporting stopped")?;
    info!(ticks, "exiting");
    Ok(ExitCode::SUCCESS)
}

fn print_field_error(err: &FieldError) {
    match &err.source {
        ConfigError::Syntax(syntax) => eprintln!("error: {err}\n{}", syntax.render()),
        other => eprintln!("error: {err}: {other}"),
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(%err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received terminate signal, shutting down"),
    }
}
