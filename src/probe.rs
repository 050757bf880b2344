use std::ffi::OsString;
use std::path::Path;

use anyhow::{anyhow, Context};
use serde::Deserialize;
use tracing::warn;

use crate::tool::{check_success, Toolkit};

/// Declared properties of the first video stream.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

/// Mean channel values of a decoded frame, in R, G, B order.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AverageColor {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

#[derive(Deserialize)]
struct FFProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

#[derive(Deserialize)]
struct FFProbeOutput {
    #[serde(default)]
    streams: Vec<FFProbeStream>,
}

fn scalar_arguments(path: &Path, stream: bool, entry: &str) -> Vec<OsString> {
    let mut arguments: Vec<OsString> = vec!["-v".into(), "error".into()];

    if stream {
        arguments.push("-select_streams".into());
        arguments.push("v:0".into());
    }

    arguments.push("-show_entries".into());
    arguments.push(entry.into());
    arguments.push("-of".into());
    arguments.push("default=noprint_wrappers=1:nokey=1".into());
    arguments.push(path.into());

    arguments
}

/// Queries a single scalar entry. Any failure is logged and reported as `None`.
fn query_scalar(toolkit: &Toolkit, path: &Path, stream: bool, entry: &str) -> Option<String> {
    match toolkit.ffprobe(&scalar_arguments(path, stream, entry)) {
        Ok(output) => Some(String::from_utf8_lossy(&output.stdout).trim().to_owned()),
        Err(err) => {
            warn!("Unable to query {entry} for {path:?}: {err:#}");
            None
        }
    }
}

/// Parses a value consisting solely of ASCII digits.
#[must_use]
pub fn parse_digits(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    value.parse().ok()
}

/// Parses a duration in seconds. Values such as `N/A` yield `None`.
#[must_use]
pub fn parse_seconds(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite())
}

/// Parses an ffprobe rational such as `30000/1001`. Zero denominators yield `None`.
#[must_use]
pub fn parse_rate(value: &str) -> Option<f64> {
    let rate: Option<f64> = match value.split_once('/') {
        Some((numerator, denominator)) => {
            let numerator: f64 = numerator.trim().parse().ok()?;
            let denominator: f64 = denominator.trim().parse().ok()?;

            (denominator != 0.0).then(|| numerator / denominator)
        }
        None => value.trim().parse().ok(),
    };

    rate.filter(|rate| rate.is_finite() && *rate > 0.0)
}

#[must_use]
pub fn duration(toolkit: &Toolkit, path: &Path) -> Option<f64> {
    query_scalar(toolkit, path, false, "format=duration").and_then(|value| parse_seconds(&value))
}

#[must_use]
pub fn bit_depth(toolkit: &Toolkit, path: &Path) -> Option<u64> {
    query_scalar(toolkit, path, true, "stream=bits_per_raw_sample")
        .and_then(|value| parse_digits(&value))
}

#[must_use]
pub fn bit_rate(toolkit: &Toolkit, path: &Path) -> Option<u64> {
    query_scalar(toolkit, path, true, "stream=bit_rate").and_then(|value| parse_digits(&value))
}

fn read_stream_info(toolkit: &Toolkit, path: &Path) -> anyhow::Result<StreamInfo> {
    let arguments: Vec<OsString> = vec![
        "-v".into(),
        "error".into(),
        "-select_streams".into(),
        "v:0".into(),
        "-show_entries".into(),
        "stream=width,height,avg_frame_rate,r_frame_rate".into(),
        "-of".into(),
        "json".into(),
        path.into(),
    ];

    let output = check_success(&toolkit.ffprobe, toolkit.ffprobe(&arguments)?)?;

    let probe: FFProbeOutput = serde_json::from_slice(&output.stdout)
        .with_context(|| format!("Unable to parse ffprobe JSON for {path:?}"))?;

    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Unable to find video stream in {path:?}"))?;

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(0.0);

    Ok(StreamInfo {
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        frame_rate,
    })
}

/// Declared resolution and frame rate of the first video stream. A file that cannot be
/// opened reports a zero resolution and frame rate.
#[must_use]
pub fn stream_info(toolkit: &Toolkit, path: &Path) -> StreamInfo {
    read_stream_info(toolkit, path).unwrap_or_else(|err| {
        warn!("Unable to read stream information for {path:?}: {err:#}");
        StreamInfo::default()
    })
}

#[allow(clippy::as_conversions)]
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn average_rgb(pixels: &[u8]) -> Option<AverageColor> {
    let count = pixels.len() / 3;

    if count == 0 {
        return None;
    }

    let mut sums = [0_u64; 3];

    for pixel in pixels.chunks_exact(3) {
        for (sum, value) in sums.iter_mut().zip(pixel) {
            *sum += u64::from(*value);
        }
    }

    let [red, green, blue] = sums.map(|sum| sum as f64 / count as f64);

    Some(AverageColor { red, green, blue })
}

/// Decodes the first frame as packed RGB and averages each channel. Returns `None` if no
/// frame decodes.
#[must_use]
pub fn first_frame_color(toolkit: &Toolkit, path: &Path) -> Option<AverageColor> {
    let arguments: Vec<OsString> = vec![
        "-v".into(),
        "error".into(),
        "-i".into(),
        path.into(),
        "-frames:v".into(),
        "1".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-".into(),
    ];

    let output = toolkit
        .ffmpeg(&arguments)
        .and_then(|output| check_success(&toolkit.ffmpeg, output));

    match output {
        Ok(output) => average_rgb(&output.stdout),
        Err(err) => {
            warn!("Unable to decode first frame of {path:?}: {err:#}");
            None
        }
    }
}
