use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use indicatif::ProgressBar;
use tracing::{error, info};

use crate::profile::{temporary_path, EncodeProfile};
use crate::scan::VideoAsset;
use crate::tool::{check_success, Toolkit};
use crate::util::{create_progress_bar, remove_if_exists, verify_directory};

#[derive(Clone, Debug)]
pub struct EncodeOptions {
    pub workers: usize,
    pub skip_existing: bool,
    pub keep_going: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            skip_existing: false,
            keep_going: false,
        }
    }
}

/// One source video transcoded with one profile.
#[derive(Clone, Debug)]
pub struct EncodeJob<'a> {
    asset: &'a VideoAsset,
    profile: &'a EncodeProfile,
    output_path: PathBuf,
}

impl<'a> EncodeJob<'a> {
    #[must_use]
    pub fn new(asset: &'a VideoAsset, profile: &'a EncodeProfile, output_root: &Path) -> Self {
        Self {
            asset,
            profile,
            output_path: profile
                .output_directory(output_root)
                .join(asset.file_name()),
        }
    }

    #[must_use]
    pub const fn asset(&self) -> &VideoAsset {
        self.asset
    }

    #[must_use]
    pub const fn profile(&self) -> &EncodeProfile {
        self.profile
    }

    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    #[must_use]
    pub fn description(&self) -> String {
        format!(
            "{} with profile {}",
            self.asset.file_name().to_string_lossy(),
            self.profile.name()
        )
    }
}

#[derive(Debug)]
pub struct EncodeFailure {
    pub file_name: String,
    pub profile: String,
    pub error: anyhow::Error,
}

#[derive(Debug, Default)]
pub struct EncodeSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failures: Vec<EncodeFailure>,
}

enum JobResult {
    Encoded,
    Skipped,
}

/// Every (asset, profile) pair, asset-major, with profiles in catalog order.
#[must_use]
pub fn plan<'a>(
    assets: &'a [VideoAsset],
    profiles: &[&'a EncodeProfile],
    output_root: &Path,
) -> Vec<EncodeJob<'a>> {
    assets
        .iter()
        .flat_map(|asset| {
            profiles
                .iter()
                .copied()
                .map(move |profile| EncodeJob::new(asset, profile, output_root))
        })
        .collect()
}

/// Runs the encoder for a single job, writing to a temporary path that is renamed onto the
/// final output only after the encoder exits successfully.
///
/// On failure the temporary file is left where the encoder put it.
pub fn encode(toolkit: &Toolkit, job: &EncodeJob) -> anyhow::Result<()> {
    let temporary_output_path = temporary_path(&job.output_path);

    remove_if_exists(&temporary_output_path)?;

    let output = toolkit
        .ffmpeg(&job.profile.arguments(job.asset.path(), &job.output_path))
        .with_context(|| format!("Unable to run encoder for {}", job.description()))?;

    check_success(&toolkit.ffmpeg, output)
        .with_context(|| format!("Encoder failed for {}", job.description()))?;

    if !temporary_output_path.exists() {
        return Err(anyhow!(
            "Encoder reported success but did not produce {temporary_output_path:?}"
        ));
    }

    std::fs::rename(&temporary_output_path, &job.output_path).with_context(|| {
        format!(
            "Unable to rename {temporary_output_path:?} to {:?}",
            job.output_path
        )
    })?;

    Ok(())
}

fn run_job(
    toolkit: &Toolkit,
    job: &EncodeJob,
    options: &EncodeOptions,
    progress_bar: &ProgressBar,
) -> anyhow::Result<JobResult> {
    if options.skip_existing && job.output_path.exists() {
        info!("Skipping {}: {:?} already exists", job.description(), job.output_path);
        progress_bar.inc(1);
        return Ok(JobResult::Skipped);
    }

    info!("Encoding {}", job.description());
    progress_bar.set_message(job.description());

    let result = encode(toolkit, job);

    progress_bar.inc(1);

    match result {
        Ok(()) => {
            info!("Finished {} -> {:?}", job.description(), job.output_path);
            Ok(JobResult::Encoded)
        }
        Err(err) => {
            error!("Failed to encode {}: {err:#}", job.description());
            Err(err)
        }
    }
}

/// Encodes every asset with every profile into `<output_root>/<profile>/<file>`.
///
/// Unless `keep_going` is set the first failed job stops the run and is returned as an
/// error. Otherwise failures are collected in the summary.
pub fn run(
    toolkit: &Toolkit,
    assets: &[VideoAsset],
    profiles: &[&EncodeProfile],
    output_root: &Path,
    options: &EncodeOptions,
) -> anyhow::Result<EncodeSummary> {
    for profile in profiles {
        let directory = profile.output_directory(output_root);
        verify_directory(&directory)
            .with_context(|| format!("Unable to verify profile output directory {directory:?}"))?;
    }

    let jobs = plan(assets, profiles, output_root);

    let progress_bar =
        create_progress_bar(jobs.len(), "Encoding").context("Unable to create progress bar")?;

    let outcomes = crate::pool::run(jobs, options.workers, !options.keep_going, |job| {
        run_job(toolkit, job, options, &progress_bar)
    })
    .context("Unable to run encoding jobs")?;

    progress_bar.finish_and_clear();

    let mut summary = EncodeSummary::default();

    for (job, result) in outcomes {
        match result {
            Ok(JobResult::Encoded) => summary.completed += 1,
            Ok(JobResult::Skipped) => summary.skipped += 1,
            Err(error) => {
                if !options.keep_going {
                    return Err(error.context(format!("Encoding stopped at {}", job.description())));
                }

                summary.failures.push(EncodeFailure {
                    file_name: job.asset.file_name().to_string_lossy().to_string(),
                    profile: job.profile.name().to_owned(),
                    error,
                });
            }
        }
    }

    info!(
        "Encoding finished: {} completed, {} skipped, {} failed",
        summary.completed,
        summary.skipped,
        summary.failures.len()
    );

    Ok(summary)
}
