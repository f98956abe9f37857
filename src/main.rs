use anyhow::{Context, Result};
use clap::Parser;
use perfcache::cli::{Cli, OutputFormat};
use perfcache::config::PerfConfig;
use perfcache::monitor::PerformanceMonitor;
use perfcache::workload::{run_workload, WorkloadOutcome, WorkloadPlan};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber (RUST_LOG wins over PERFORMANCE_LOG_LEVEL)
fn init_tracing(default_level: &str, debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_outcome(outcome: &WorkloadOutcome, monitor: &PerformanceMonitor<Arc<String>>) {
    let stats = monitor.cache().stats();
    eprintln!(
        "\nRequests: {} served, {} failed, {} fetches",
        outcome.served, outcome.failed, outcome.fetched
    );
    eprintln!(
        "Cache: {}/{} entries, ttl {}s, {} hits / {} requests (hit ratio {:.1}%)",
        stats.size,
        stats.maxsize,
        stats.ttl_seconds,
        stats.hits,
        stats.requests,
        stats.hit_ratio * 100.0
    );
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config = PerfConfig::from_env().context("invalid performance configuration")?;
    if args.no_profile {
        config.enable_profiling = false;
    }

    init_tracing(&config.log_level, args.debug);
    config.log_configuration();

    if args.keys == 0 {
        anyhow::bail!("--keys must be at least 1");
    }
    if args.workers == Some(0) {
        anyhow::bail!("--workers must be at least 1");
    }

    let batch = usize::try_from(args.iterations).ok();
    let plan = WorkloadPlan {
        iterations: args.iterations,
        keys: args.keys,
        workers: args
            .workers
            .unwrap_or_else(|| config.optimal_workers(batch)),
        work: Duration::from_millis(args.work_ms),
        fail_every: args.fail_every,
    };

    let monitor: PerformanceMonitor<Arc<String>> = PerformanceMonitor::new(config)?;
    monitor.sampler().maybe_sample();

    let outcome = run_workload(&monitor, &plan)?;
    let reporter = monitor.reporter();

    match args.format {
        OutputFormat::Text => {
            reporter.print_summary(args.sort_by);
            reporter.log_performance_summary();
        }
        OutputFormat::Json => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            reporter.write_snapshot(&mut out)?;
            writeln!(out)?;
        }
    }

    if args.cache_stats {
        print_outcome(&outcome, &monitor);
    }

    if let Some(path) = &args.export {
        // Logged by the reporter; a failed export does not fail the run
        if let Err(e) = reporter.export_snapshot(path) {
            eprintln!("warning: {}", e);
        }
    }

    Ok(())
}
