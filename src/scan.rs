use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use crate::profile::is_temporary;

/// Extensions recognized as video files.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "m4v", "avi", "webm"];

/// A source video found in a scanned directory.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct VideoAsset {
    path: PathBuf,
    file_name: OsString,
}

impl VideoAsset {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn file_name(&self) -> &OsString {
        &self.file_name
    }
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_lowercase)
        .is_some_and(|extension| VIDEO_EXTENSIONS.contains(&extension.as_str()))
}

/// Lists the video files directly inside `directory`, sorted by file name.
pub fn scan_videos(directory: &Path) -> anyhow::Result<Vec<VideoAsset>> {
    let mut assets = vec![];

    for entry in std::fs::read_dir(directory)
        .with_context(|| format!("Unable to read video directory {directory:?}"))?
    {
        let entry = entry.with_context(|| format!("Unable to read entry in {directory:?}"))?;
        let path = entry.path();

        if !path.is_file() || !is_video(&path) || is_temporary(&entry.file_name()) {
            debug!("Ignoring {path:?}");
            continue;
        }

        assets.push(VideoAsset {
            file_name: entry.file_name(),
            path,
        });
    }

    assets.sort();

    info!("Found {} video files in {directory:?}", assets.len());

    Ok(assets)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn finds_only_video_files_in_name_order() {
        let directory = tempfile::tempdir().unwrap();

        for name in ["b.mp4", "a.MKV", "notes.txt", "c.mp4.tmp.mp4", "noextension"] {
            fs::write(directory.path().join(name), b"").unwrap();
        }

        fs::create_dir(directory.path().join("nested.mp4")).unwrap();

        let assets = scan_videos(directory.path()).unwrap();
        let names: Vec<_> = assets
            .iter()
            .map(|asset| asset.file_name().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["a.MKV", "b.mp4"]);
        assert_eq!(assets[1].path(), directory.path().join("b.mp4"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(scan_videos(Path::new("/nonexistent/videos")).is_err());
    }
}
