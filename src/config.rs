use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::tool::Toolkit;

#[derive(Clone, Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Encoder, comparison and frame decoding tool
    #[arg(long, global = true, default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Metadata probing tool
    #[arg(long, global = true, default_value = "ffprobe")]
    pub ffprobe: PathBuf,

    /// Wall-clock limit in seconds for each tool invocation
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Number of workers. Encode timings in `metrics` are always measured one at a time
    #[arg(short, long, global = true, value_parser = clap::value_parser!(usize), default_value_t = 1)]
    pub workers: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Subcommand, Debug)]
pub enum Command {
    /// Encode every source video with every selected profile
    Encode(EncodeArgs),

    /// Measure encoded videos against their sources and write CSV reports
    Metrics(MetricsArgs),
}

#[derive(Clone, Args, Debug)]
pub struct EncodeArgs {
    /// Directory containing the source videos
    #[arg(long = "source-dir")]
    pub source_directory: PathBuf,

    /// Root directory receiving one subdirectory per profile
    #[arg(long = "output-dir")]
    pub output_directory: PathBuf,

    /// Profile to encode with (may be repeated; defaults to all)
    #[arg(long = "profile")]
    pub profiles: Vec<String>,

    /// Skip jobs whose output already exists
    #[arg(long)]
    pub skip_existing: bool,

    /// Record failed jobs and continue with the rest
    #[arg(long)]
    pub keep_going: bool,
}

#[derive(Clone, Args, Debug)]
pub struct MetricsArgs {
    /// Directory containing the source videos
    #[arg(long = "source-dir")]
    pub source_directory: PathBuf,

    /// Root directory holding the encoded profile subdirectories
    #[arg(long = "output-dir")]
    pub output_directory: PathBuf,

    /// Directory receiving the CSV reports
    #[arg(long = "report-dir", default_value = "csvfiles")]
    pub report_directory: PathBuf,

    /// Profile to measure (may be repeated; defaults to all)
    #[arg(long = "profile")]
    pub profiles: Vec<String>,

    /// Stop at the first file or profile that cannot be measured
    #[arg(long)]
    pub fail_fast: bool,
}

impl Config {
    #[must_use]
    pub fn toolkit(&self) -> Toolkit {
        Toolkit {
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_defaults() {
        let config = Config::try_parse_from([
            "encode-matrix",
            "encode",
            "--source-dir",
            "videos",
            "--output-dir",
            "compressed",
        ])
        .unwrap();

        assert_eq!(config.workers, 1);

        let toolkit = config.toolkit();
        assert_eq!(toolkit.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(toolkit.ffprobe, PathBuf::from("ffprobe"));
        assert_eq!(toolkit.timeout, None);

        match config.command {
            Command::Encode(args) => {
                assert_eq!(args.source_directory, PathBuf::from("videos"));
                assert!(args.profiles.is_empty());
                assert!(!args.skip_existing);
                assert!(!args.keep_going);
            }
            Command::Metrics(_) => panic!("expected encode"),
        }
    }

    #[test]
    fn metrics_options() {
        let config = Config::try_parse_from([
            "encode-matrix",
            "metrics",
            "--source-dir",
            "videos",
            "--output-dir",
            "compressed",
            "--profile",
            "slow_265",
            "--profile",
            "base_264",
            "--fail-fast",
            "--timeout",
            "30",
            "-w",
            "4",
        ])
        .unwrap();

        assert_eq!(config.workers, 4);
        assert_eq!(config.toolkit().timeout, Some(Duration::from_secs(30)));

        match config.command {
            Command::Metrics(args) => {
                assert_eq!(args.report_directory, PathBuf::from("csvfiles"));
                assert_eq!(args.profiles, vec!["slow_265", "base_264"]);
                assert!(args.fail_fast);
            }
            Command::Encode(_) => panic!("expected metrics"),
        }
    }

    #[test]
    fn subcommand_and_directories_are_required() {
        assert!(Config::try_parse_from(["encode-matrix"]).is_err());
        assert!(
            Config::try_parse_from(["encode-matrix", "encode", "--source-dir", "videos"]).is_err()
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(Config::try_parse_from([
            "encode-matrix",
            "encode",
            "--source-dir",
            "a",
            "--output-dir",
            "b",
            "--timeout",
            "0"
        ])
        .is_err());
    }
}
