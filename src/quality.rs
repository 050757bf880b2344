use std::ffi::OsString;
use std::path::Path;

use anyhow::Context;

use crate::error::ProbeError;
use crate::tool::{check_success, Toolkit};

/// Full-reference comparison metrics computed by the encoder's filters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Metric {
    Psnr,
    Ssim,
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Psnr => write!(f, "PSNR"),
            Self::Ssim => write!(f, "SSIM"),
        }
    }
}

impl Metric {
    const fn filter(self) -> &'static str {
        match self {
            Self::Psnr => "psnr",
            Self::Ssim => "ssim",
        }
    }

    /// Tag identifying the metric's summary line in the diagnostic output.
    const fn tag(self) -> &'static str {
        match self {
            Self::Psnr => "PSNR",
            Self::Ssim => "SSIM",
        }
    }

    /// Name of the aggregate field on the summary line.
    ///
    /// ```text
    /// [Parsed_psnr_0 @ 0x5581] PSNR y:39.12 u:43.20 v:43.51 average:40.05 min:35.21 max:46.01
    /// [Parsed_ssim_0 @ 0x5581] SSIM Y:0.981 (17.21) U:0.990 (20.10) V:0.991 (20.32) All:0.985 (18.24)
    /// ```
    const fn field(self) -> &'static str {
        match self {
            Self::Psnr => "average",
            Self::Ssim => "All",
        }
    }

    #[must_use]
    pub fn arguments(self, distorted: &Path, reference: &Path) -> Vec<OsString> {
        vec![
            "-i".into(),
            distorted.into(),
            "-i".into(),
            reference.into(),
            "-filter_complex".into(),
            self.filter().into(),
            "-f".into(),
            "null".into(),
            "-".into(),
        ]
    }
}

/// Extracts the aggregate value of `metric` from the encoder's diagnostic output.
///
/// Only the last line carrying the metric's tag is considered, since per-frame lines
/// precede the summary. A lossless comparison reports `inf`, which parses to
/// `f64::INFINITY`.
pub fn parse(metric: Metric, diagnostics: &str) -> Result<f64, ProbeError> {
    let line = diagnostics
        .lines()
        .filter(|line| line.contains(metric.tag()))
        .last()
        .ok_or(ProbeError::NoMeasurement { metric })?;

    let value = line
        .split_whitespace()
        .filter_map(|token| token.split_once(':'))
        .find(|(key, _value)| *key == metric.field())
        .map(|(_key, value)| value)
        .ok_or(ProbeError::NoMeasurement { metric })?;

    value.parse::<f64>().map_err(|_err| ProbeError::Malformed {
        metric,
        value: value.to_owned(),
        line: line.to_owned(),
    })
}

/// Compares `distorted` against `reference` and returns the aggregate score.
///
/// Unlike the metadata probes this never degrades to an absent value: a comparison that
/// yields no summary line is an error.
pub fn measure(
    toolkit: &Toolkit,
    metric: Metric,
    distorted: &Path,
    reference: &Path,
) -> anyhow::Result<f64> {
    let output = toolkit
        .ffmpeg(&metric.arguments(distorted, reference))
        .with_context(|| format!("Unable to run {metric} comparison for {distorted:?}"))?;

    let output = check_success(&toolkit.ffmpeg, output)
        .with_context(|| format!("{metric} comparison failed for {distorted:?}"))?;

    let value = parse(metric, &String::from_utf8_lossy(&output.stderr))
        .with_context(|| format!("Unable to read {metric} score for {distorted:?}"))?;

    Ok(value)
}
