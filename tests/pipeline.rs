#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use clap::Parser;

use encode_matrix::config::Config;

const FFMPEG: &str = r#"for last in "$@"; do :; done
case "$*" in
  *rawvideo*) printf '\012\024\036' ;;
  *filter_complex\ psnr*) echo '[Parsed_psnr_0 @ 0x1] PSNR y:48.1 u:50.2 v:50.3 average:48.901234 min:45.1 max:52.0' >&2 ;;
  *filter_complex\ ssim*) echo '[Parsed_ssim_0 @ 0x1] SSIM Y:0.990000 (20.0) U:0.995000 (23.0) V:0.995000 (23.0) All:0.992000 (20.9)' >&2 ;;
  *corrupt*) echo 'Invalid data found when processing input' >&2; exit 1 ;;
  *) cp "$2" "$last" ;;
esac"#;

const FFPROBE: &str = r#"case "$*" in
  *format=duration*) echo 4.004000 ;;
  *bits_per_raw_sample*) echo 8 ;;
  *stream=bit_rate*) echo 2500000 ;;
  *-of\ json*) echo '{"streams":[{"width":1280,"height":720,"avg_frame_rate":"30000/1001","r_frame_rate":"30000/1001"}]}' ;;
  *) exit 1 ;;
esac"#;

fn write_script(directory: &Path, name: &str, body: &str) -> PathBuf {
    let path = directory.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();

    let mut permissions = fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).unwrap();

    path
}

struct Workspace {
    _root: tempfile::TempDir,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    videos: PathBuf,
    compressed: PathBuf,
    reports: PathBuf,
}

impl Workspace {
    fn new(files: &[&str]) -> Self {
        let root = tempfile::tempdir().unwrap();
        let tools = root.path().join("tools");
        let videos = root.path().join("videos");
        fs::create_dir_all(&tools).unwrap();
        fs::create_dir_all(&videos).unwrap();

        for file in files {
            fs::write(videos.join(file), format!("frames of {file}")).unwrap();
        }

        Self {
            ffmpeg: write_script(&tools, "ffmpeg", FFMPEG),
            ffprobe: write_script(&tools, "ffprobe", FFPROBE),
            compressed: root.path().join("compressed"),
            reports: root.path().join("reports"),
            videos,
            _root: root,
        }
    }

    fn run(&self, stage: &str, extra: &[&str]) -> anyhow::Result<()> {
        let mut arguments: Vec<String> = vec![
            "encode-matrix".into(),
            "--ffmpeg".into(),
            self.ffmpeg.to_string_lossy().into(),
            "--ffprobe".into(),
            self.ffprobe.to_string_lossy().into(),
            stage.into(),
            "--source-dir".into(),
            self.videos.to_string_lossy().into(),
            "--output-dir".into(),
            self.compressed.to_string_lossy().into(),
        ];

        if stage == "metrics" {
            arguments.push("--report-dir".into());
            arguments.push(self.reports.to_string_lossy().into());
        }

        arguments.extend(extra.iter().map(|argument| (*argument).to_owned()));

        encode_matrix::run(&Config::try_parse_from(arguments).unwrap())
    }
}

#[test]
fn encode_then_measure_writes_one_report_per_profile() {
    let workspace = Workspace::new(&["b.mp4", "a.mp4"]);
    let profiles = ["--profile", "base_264", "--profile", "veryslow_265"];

    workspace.run("encode", &profiles).unwrap();

    for profile in ["base_264", "veryslow_265"] {
        for file in ["a.mp4", "b.mp4"] {
            let output = workspace.compressed.join(profile).join(file);
            assert_eq!(
                fs::read_to_string(&output).unwrap(),
                format!("frames of {file}")
            );
        }
    }

    workspace
        .run("metrics", &[&profiles[..], &["-w", "2"][..]].concat())
        .unwrap();

    for profile in ["base_264", "veryslow_265"] {
        let mut reader = csv::Reader::from_path(workspace.reports.join(format!("{profile}.csv")))
            .unwrap();

        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "file_name");
        assert_eq!(&headers[10], "encoding_time_seconds");

        let rows: Vec<_> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "a.mp4");
        assert_eq!(&rows[1][0], "b.mp4");
        assert_eq!(&rows[0][1], "4.004");
        assert_eq!(&rows[0][2], "15");
        assert_eq!(&rows[0][3], "(1280, 720)");
        assert_eq!(&rows[0][4], "(10.00, 20.00, 30.00)");
        assert_eq!(&rows[0][5], "8");
        assert_eq!(&rows[0][6], "2500000");
        assert!(rows[0][7].starts_with("29.97"));
        assert_eq!(&rows[0][8], "48.901234");
        assert_eq!(&rows[0][9], "0.992");
        assert!(rows[0][10].parse::<f64>().unwrap() >= 0.0);
    }

    let failures = fs::read_to_string(workspace.reports.join("failures.json")).unwrap();
    assert_eq!(failures.trim(), "[]");
    assert!(!workspace.reports.join("grain_264.csv").exists());
}

#[test]
fn failing_encode_stops_the_run() {
    let workspace = Workspace::new(&["corrupt.mp4", "fine.mp4"]);

    let error = workspace
        .run("encode", &["--profile", "base_264"])
        .unwrap_err();

    assert!(format!("{error:#}").contains("corrupt.mp4"));

    let directory = workspace.compressed.join("base_264");
    assert!(!directory.join("corrupt.mp4").exists());
    assert!(!directory.join("fine.mp4").exists());
}

#[test]
fn keep_going_encodes_the_rest_and_still_fails() {
    let workspace = Workspace::new(&["corrupt.mp4", "fine.mp4"]);

    let result = workspace.run("encode", &["--profile", "base_264", "--keep-going"]);

    assert!(result.is_err());

    let directory = workspace.compressed.join("base_264");
    assert!(directory.join("fine.mp4").exists());
    assert!(!directory.join("corrupt.mp4").exists());
}

#[test]
fn unknown_profile_is_rejected_before_any_work() {
    let workspace = Workspace::new(&["a.mp4"]);

    assert!(workspace.run("encode", &["--profile", "medium_264"]).is_err());
    assert!(!workspace.compressed.exists());
}

#[test]
fn unmeasurable_files_are_listed_as_failures() {
    let workspace = Workspace::new(&["a.mp4"]);

    workspace.run("encode", &["--profile", "grain_265"]).unwrap();

    fs::write(
        workspace.compressed.join("grain_265").join("orphan.mp4"),
        "no matching source",
    )
    .unwrap();

    workspace.run("metrics", &["--profile", "grain_265"]).unwrap();

    let report = fs::read_to_string(workspace.reports.join("grain_265.csv")).unwrap();
    assert_eq!(report.lines().count(), 2);

    let failures: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(workspace.reports.join("failures.json")).unwrap(),
    )
    .unwrap();

    assert_eq!(failures[0]["file_name"], "orphan.mp4");
    assert_eq!(failures[0]["profile"], "grain_265");
}

#[test]
fn profiles_without_outputs_are_reported_not_fatal() {
    let workspace = Workspace::new(&["a.mp4"]);

    workspace.run("encode", &["--profile", "base_264"]).unwrap();
    workspace.run("metrics", &[]).unwrap();

    let report = fs::read_to_string(workspace.reports.join("base_264.csv")).unwrap();
    assert_eq!(report.lines().count(), 2);
    assert!(!workspace.reports.join("base_265.csv").exists());

    let failures: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(workspace.reports.join("failures.json")).unwrap(),
    )
    .unwrap();
    let failures = failures.as_array().unwrap();

    assert_eq!(failures.len(), 15);
    assert!(failures
        .iter()
        .all(|failure| failure["file_name"].is_null() && failure["profile"] != "base_264"));

    assert!(workspace.run("metrics", &["--fail-fast"]).is_err());
}
