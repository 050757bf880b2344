use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context};
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::probe::{self, AverageColor};
use crate::profile::{temporary_path, EncodeProfile, LEGACY_SUFFIX};
use crate::quality::{self, Metric};
use crate::scan::{scan_videos, VideoAsset};
use crate::tool::{check_success, Toolkit};
use crate::util::remove_if_exists;

/// Measurements for one transcoded file.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, PartialEq)]
pub struct QualityRecord {
    pub file_name: String,
    pub video_length_seconds: Option<f64>,
    pub file_size_bytes: u64,
    pub resolution: (u32, u32),
    pub avg_rgb: Option<AverageColor>,
    pub bit_depth: Option<u64>,
    pub bit_rate: Option<u64>,
    pub frame_rate: f64,
    pub psnr: f64,
    pub ssim: f64,
    pub encoding_time_seconds: f64,
}

impl QualityRecord {
    /// Column names, in the order they are reported.
    pub const FIELDS: [&'static str; 11] = [
        "file_name",
        "video_length_seconds",
        "file_size_bytes",
        "resolution",
        "avg_rgb",
        "bit_depth",
        "bit_rate",
        "frame_rate",
        "psnr",
        "ssim",
        "encoding_time_seconds",
    ];
}

/// Records for one profile, ordered by file name.
#[derive(Clone, Debug, Default)]
pub struct ResultTable {
    pub profile: String,
    pub records: Vec<QualityRecord>,
}

/// A file, or a whole profile when `file_name` is absent, that could not be measured.
#[derive(Clone, Debug, Serialize)]
pub struct FileFailure {
    pub profile: String,
    pub file_name: Option<String>,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct ProfileOutcome {
    /// Directory the outputs were read from. `None` if the profile has no outputs.
    pub directory: Option<PathBuf>,
    pub table: ResultTable,
    pub failures: Vec<FileFailure>,
}

#[derive(Clone, Debug)]
pub struct CollectOptions {
    pub workers: usize,
    pub fail_fast: bool,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            fail_fast: false,
        }
    }
}

/// Re-runs the profile's encode of `original` purely to time it. The artefact written to
/// the temporary path is deleted afterwards and `compressed` itself is never touched.
pub fn measure_encoding_time(
    toolkit: &Toolkit,
    profile: &EncodeProfile,
    original: &Path,
    compressed: &Path,
) -> anyhow::Result<f64> {
    let temporary_output_path = temporary_path(compressed);

    remove_if_exists(&temporary_output_path)?;

    let start = Instant::now();

    let result = toolkit
        .ffmpeg(&profile.arguments(original, compressed))
        .with_context(|| format!("Unable to run timing encode for {compressed:?}"))
        .and_then(|output| {
            let elapsed = start.elapsed().as_secs_f64();

            check_success(&toolkit.ffmpeg, output)
                .with_context(|| format!("Timing encode failed for {compressed:?}"))?;

            Ok(elapsed)
        });

    remove_if_exists(&temporary_output_path)?;

    result
}

/// Measures one transcoded file against its original, leaving `encoding_time_seconds`
/// at zero.
///
/// Metadata probes degrade to absent values; the PSNR/SSIM comparison does not.
pub fn measure_file(
    toolkit: &Toolkit,
    compressed: &VideoAsset,
    original: &Path,
) -> anyhow::Result<QualityRecord> {
    let path = compressed.path();

    if !original.is_file() {
        return Err(anyhow!("Original video {original:?} does not exist"));
    }

    let video_length_seconds = probe::duration(toolkit, path);

    let file_size_bytes = std::fs::metadata(path)
        .with_context(|| format!("Unable to read size of {path:?}"))?
        .len();

    let stream = probe::stream_info(toolkit, path);
    let avg_rgb = probe::first_frame_color(toolkit, path);
    let bit_depth = probe::bit_depth(toolkit, path);
    let bit_rate = probe::bit_rate(toolkit, path);

    let psnr = quality::measure(toolkit, Metric::Psnr, path, original)?;
    let ssim = quality::measure(toolkit, Metric::Ssim, path, original)?;

    Ok(QualityRecord {
        file_name: compressed.file_name().to_string_lossy().to_string(),
        video_length_seconds,
        file_size_bytes,
        resolution: (stream.width, stream.height),
        avg_rgb,
        bit_depth,
        bit_rate,
        frame_rate: stream.frame_rate,
        psnr,
        ssim,
        encoding_time_seconds: 0.0,
    })
}

/// Finds the profile's output directory under `output_root`, accepting the legacy
/// `<profile>_cmd` name when the current one does not exist.
#[must_use]
pub fn locate_outputs(profile: &EncodeProfile, output_root: &Path) -> Option<PathBuf> {
    let directory = profile.output_directory(output_root);

    if directory.is_dir() {
        return Some(directory);
    }

    let legacy = output_root.join(format!("{}{LEGACY_SUFFIX}", profile.name()));

    legacy.is_dir().then_some(legacy)
}

impl ProfileOutcome {
    fn new(profile: &EncodeProfile, directory: Option<PathBuf>) -> Self {
        Self {
            directory,
            table: ResultTable {
                profile: profile.name().to_owned(),
                records: vec![],
            },
            failures: vec![],
        }
    }

    /// Records a failure, or turns it into the returned error when `fail_fast` is set.
    fn fail(
        &mut self,
        file_name: Option<String>,
        err: anyhow::Error,
        fail_fast: bool,
    ) -> anyhow::Result<()> {
        let profile = &self.table.profile;
        let subject = file_name.as_deref().unwrap_or("outputs");

        if fail_fast {
            return Err(err.context(format!("Unable to measure {subject} for profile {profile}")));
        }

        error!("Unable to measure {subject} for profile {profile}: {err:#}");

        self.failures.push(FileFailure {
            profile: profile.clone(),
            file_name,
            error: format!("{err:#}"),
        });

        Ok(())
    }
}

/// Measures every file in the profile's output directory.
///
/// Files are compared in parallel, then their encodes are timed one at a time so the
/// timings are not skewed by concurrent work. A failed file, or a missing output
/// directory, is recorded and skipped unless `fail_fast` is set, in which case the first
/// failure is returned as an error.
pub fn collect_profile(
    toolkit: &Toolkit,
    profile: &EncodeProfile,
    source_directory: &Path,
    output_root: &Path,
    options: &CollectOptions,
    progress_bar: &ProgressBar,
) -> anyhow::Result<ProfileOutcome> {
    let Some(directory) = locate_outputs(profile, output_root) else {
        let mut outcome = ProfileOutcome::new(profile, None);

        outcome.fail(
            None,
            anyhow!(
                "No output directory {:?} for profile {}",
                profile.output_directory(output_root),
                profile.name()
            ),
            options.fail_fast,
        )?;

        return Ok(outcome);
    };

    let files = scan_videos(&directory)
        .with_context(|| format!("Unable to list outputs of profile {}", profile.name()))?;

    info!(
        "Measuring {} files for profile {}",
        files.len(),
        profile.name()
    );

    progress_bar.inc_length(files.len().try_into().unwrap_or(u64::MAX));

    let outcomes = crate::pool::run(files, options.workers, options.fail_fast, |file| {
        progress_bar.set_message(format!(
            "{}/{}",
            profile.name(),
            file.file_name().to_string_lossy()
        ));

        let original: PathBuf = source_directory.join(file.file_name());
        let result = measure_file(toolkit, file, &original);

        progress_bar.inc(1);
        result
    })
    .with_context(|| format!("Unable to measure profile {}", profile.name()))?;

    let mut outcome = ProfileOutcome::new(profile, Some(directory.clone()));
    let mut measured = vec![];

    for (file, result) in outcomes {
        match result {
            Ok(record) => measured.push(record),
            Err(err) => outcome.fail(
                Some(file.file_name().to_string_lossy().to_string()),
                err,
                options.fail_fast,
            )?,
        }
    }

    measured.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    for mut record in measured {
        progress_bar.set_message(format!("{}/{} (timing)", profile.name(), record.file_name));

        let timing = measure_encoding_time(
            toolkit,
            profile,
            &source_directory.join(&record.file_name),
            &directory.join(&record.file_name),
        )
        .context("Unable to measure encoding time");

        match timing {
            Ok(seconds) => {
                record.encoding_time_seconds = seconds;
                outcome.table.records.push(record);
            }
            Err(err) => outcome.fail(Some(record.file_name), err, options.fail_fast)?,
        }
    }

    outcome
        .failures
        .sort_by(|a, b| a.file_name.cmp(&b.file_name));

    if !outcome.failures.is_empty() {
        warn!(
            "{} of {} files failed for profile {}",
            outcome.failures.len(),
            outcome.failures.len() + outcome.table.records.len(),
            profile.name()
        );
    }

    Ok(outcome)
}
