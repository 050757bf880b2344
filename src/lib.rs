use anyhow::{anyhow, Context};
use tracing::{error, info};

pub mod config;
pub mod encode;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod probe;
pub mod profile;
pub mod quality;
pub mod report;
pub mod scan;
pub mod tool;
pub mod util;

use config::{Command, Config, EncodeArgs, MetricsArgs};
use profile::Catalog;
use tool::Toolkit;

pub fn run(config: &Config) -> anyhow::Result<()> {
    let catalog = Catalog::new();
    let toolkit = config.toolkit();

    match &config.command {
        Command::Encode(args) => run_encode(&toolkit, &catalog, config.workers, args),
        Command::Metrics(args) => run_metrics(&toolkit, &catalog, config.workers, args),
    }
}

#[allow(clippy::print_stdout)]
fn run_encode(
    toolkit: &Toolkit,
    catalog: &Catalog,
    workers: usize,
    args: &EncodeArgs,
) -> anyhow::Result<()> {
    let profiles = catalog
        .select(&args.profiles)
        .context("Invalid profile selection")?;

    let assets = scan::scan_videos(&args.source_directory)
        .context("Unable to scan source directory")?;

    let options = encode::EncodeOptions {
        workers,
        skip_existing: args.skip_existing,
        keep_going: args.keep_going,
    };

    let summary = encode::run(
        toolkit,
        &assets,
        &profiles,
        &args.output_directory,
        &options,
    )?;

    println!(
        "Encoded {} jobs ({} skipped, {} failed)",
        summary.completed,
        summary.skipped,
        summary.failures.len()
    );

    if summary.failures.is_empty() {
        return Ok(());
    }

    for failure in &summary.failures {
        error!(
            "{} with profile {} failed: {:#}",
            failure.file_name, failure.profile, failure.error
        );
    }

    Err(anyhow!("{} encoding jobs failed", summary.failures.len()))
}

#[allow(clippy::print_stdout)]
fn run_metrics(
    toolkit: &Toolkit,
    catalog: &Catalog,
    workers: usize,
    args: &MetricsArgs,
) -> anyhow::Result<()> {
    let profiles = catalog
        .select(&args.profiles)
        .context("Invalid profile selection")?;

    let options = metrics::CollectOptions {
        workers,
        fail_fast: args.fail_fast,
    };

    let progress_bar =
        util::create_progress_bar(0, "Measuring").context("Unable to create progress bar")?;

    let mut tables = Vec::with_capacity(profiles.len());
    let mut failures = vec![];

    for profile in profiles {
        let outcome = metrics::collect_profile(
            toolkit,
            profile,
            &args.source_directory,
            &args.output_directory,
            &options,
            &progress_bar,
        )?;

        if outcome.directory.is_some() {
            let path = report::write_csv(&args.report_directory, &outcome.table)?;
            info!("Report for profile {} written to {path:?}", profile.name());
        }

        tables.push((outcome.table, outcome.failures.len()));
        failures.extend(outcome.failures);
    }

    progress_bar.finish_and_clear();

    let path = report::write_failures(&args.report_directory, &failures)?;

    if !failures.is_empty() {
        error!("{} measurements failed, see {path:?}", failures.len());
    }

    print!("{}", report::summarize(&tables));

    Ok(())
}
