use std::path::{Path, PathBuf};

use anyhow::Context;
use prettytable::{format, row, Table};
use serde::Serialize;
use statrs::statistics::{Data, Median, Statistics};
use tracing::info;

use crate::metrics::{FileFailure, QualityRecord, ResultTable};
use crate::util::{verify_directory, write_atomically, HumanBitrate};

/// Name of the failure list written alongside the per-profile reports.
pub const FAILURES_FILE_NAME: &str = "failures.json";

/// One CSV line. Absent values serialize as empty cells.
#[derive(Serialize)]
struct CsvRow<'a> {
    file_name: &'a str,
    video_length_seconds: Option<f64>,
    file_size_bytes: u64,
    resolution: String,
    avg_rgb: Option<String>,
    bit_depth: Option<u64>,
    bit_rate: Option<u64>,
    frame_rate: f64,
    psnr: String,
    ssim: f64,
    encoding_time_seconds: f64,
}

impl<'a> From<&'a QualityRecord> for CsvRow<'a> {
    fn from(record: &'a QualityRecord) -> Self {
        Self {
            file_name: &record.file_name,
            video_length_seconds: record.video_length_seconds,
            file_size_bytes: record.file_size_bytes,
            resolution: format!("({}, {})", record.resolution.0, record.resolution.1),
            avg_rgb: record.avg_rgb.map(|color| {
                format!(
                    "({:.2}, {:.2}, {:.2})",
                    color.red, color.green, color.blue
                )
            }),
            bit_depth: record.bit_depth,
            bit_rate: record.bit_rate,
            frame_rate: record.frame_rate,
            psnr: format_psnr(record.psnr),
            ssim: record.ssim,
            encoding_time_seconds: record.encoding_time_seconds,
        }
    }
}

fn format_psnr(psnr: f64) -> String {
    if psnr.is_infinite() && psnr.is_sign_positive() {
        "inf".to_owned()
    } else {
        psnr.to_string()
    }
}

#[must_use]
pub fn report_path(report_directory: &Path, profile: &str) -> PathBuf {
    report_directory.join(format!("{profile}.csv"))
}

/// Writes `<report_directory>/<profile>.csv`, replacing any previous report for the profile.
/// The header line is written even when the table has no rows.
pub fn write_csv(report_directory: &Path, table: &ResultTable) -> anyhow::Result<PathBuf> {
    verify_directory(report_directory)?;

    let path = report_path(report_directory, &table.profile);

    write_atomically(&path, |file| {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        writer
            .write_record(QualityRecord::FIELDS)
            .context("Unable to write CSV header")?;

        for record in &table.records {
            writer
                .serialize(CsvRow::from(record))
                .with_context(|| format!("Unable to write CSV row for {}", record.file_name))?;
        }

        writer.flush().context("Unable to flush CSV writer")?;

        Ok(())
    })
    .with_context(|| format!("Unable to write report for profile {}", table.profile))?;

    info!(
        "Wrote {} rows for profile {} to {path:?}",
        table.records.len(),
        table.profile
    );

    Ok(path)
}

/// Writes the list of files that could not be measured as pretty-printed JSON.
pub fn write_failures(report_directory: &Path, failures: &[FileFailure]) -> anyhow::Result<PathBuf> {
    verify_directory(report_directory)?;

    let path = report_directory.join(FAILURES_FILE_NAME);

    write_atomically(&path, |file| {
        serde_json::to_writer_pretty(&mut *file, failures)
            .context("Unable to serialize failures")?;
        Ok(())
    })?;

    Ok(path)
}

#[allow(clippy::as_conversions)]
#[allow(clippy::cast_precision_loss)]
fn summary_row(table: &ResultTable, failures: usize) -> prettytable::Row {
    let psnr: Vec<f64> = table
        .records
        .iter()
        .map(|record| record.psnr)
        .filter(|psnr| psnr.is_finite())
        .collect();
    let ssim: Vec<f64> = table.records.iter().map(|record| record.ssim).collect();
    let times: Vec<f64> = table
        .records
        .iter()
        .map(|record| record.encoding_time_seconds)
        .collect();
    let bit_rates: Vec<f64> = table
        .records
        .iter()
        .filter_map(|record| record.bit_rate)
        .map(|bit_rate| bit_rate as f64)
        .collect();

    let or_dash = |values: &[f64], render: &dyn Fn(f64) -> String| {
        if values.is_empty() {
            "-".to_owned()
        } else {
            render(values.iter().mean())
        }
    };

    let median_time = if times.is_empty() {
        "-".to_owned()
    } else {
        format!("{:.2}s", Data::new(times).median())
    };

    row![
        table.profile,
        r->table.records.len(),
        r->failures,
        r->or_dash(&psnr, &|value| format!("{value:.2}")),
        r->or_dash(&ssim, &|value| format!("{value:.4}")),
        r->median_time,
        r->or_dash(&bit_rates, &|value| HumanBitrate(value).to_string())
    ]
}

/// Renders a one-line-per-profile overview of a metrics run.
#[must_use]
pub fn summarize(tables: &[(ResultTable, usize)]) -> String {
    let mut summary = Table::new();

    summary.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    summary.set_titles(row![
        "Profile",
        "Files",
        "Failures",
        "PSNR",
        "SSIM",
        "Median time",
        "Mean bitrate"
    ]);

    for (table, failures) in tables {
        summary.add_row(summary_row(table, *failures));
    }

    summary.to_string()
}
