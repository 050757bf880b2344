use std::fmt::Write;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context};
use indicatif::{HumanDuration, ProgressBar, ProgressState, ProgressStyle};
use number_prefix::NumberPrefix;
use tracing::{error, level_filters::LevelFilter};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HumanBitrate(pub f64);

impl std::fmt::Display for HumanBitrate {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match NumberPrefix::decimal(self.0) {
            NumberPrefix::Standalone(number) => write!(f, "{number:.0} bps"),
            NumberPrefix::Prefixed(prefix, number) => write!(f, "{number:.2} {prefix}bps"),
        }
    }
}

#[allow(clippy::as_conversions)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_sign_loss)]
pub fn create_progress_style(template: &str) -> anyhow::Result<ProgressStyle> {
    let progress_style = ProgressStyle::with_template(template)
        .with_context(|| format!("Unable to create progress bar style with template '{template}'"))?
        .with_key("smooth_eta", |s: &ProgressState, w: &mut dyn Write| {
            match (s.pos(), s.len()) {
                (pos, Some(len)) if pos > 0 => write!(
                    w,
                    "{:#}",
                    HumanDuration(Duration::from_millis(
                        (s.elapsed().as_millis() as f64 * (len as f64 - pos as f64) / pos as f64)
                            .round() as u64
                    ))
                ),
                _ => write!(w, "-"),
            }
            .unwrap_or_else(|err| {
                error!("Unexpected error while formatting smooth_eta in progress bar: {err}");
            });
        });

    Ok(progress_style)
}

/// Progress bar counting `len` units of work, labelled with `label`.
pub fn create_progress_bar(len: usize, label: &str) -> anyhow::Result<ProgressBar> {
    let progress_bar = ProgressBar::new(len.try_into().unwrap_or(u64::MAX));

    progress_bar.set_style(
        create_progress_style(&format!(
            "{{spinner:.green}} [{{elapsed_precise}}] {label:<22} [{{wide_bar:.cyan/blue}}] {{pos:>4}}/{{len:>4}} (ETA: {{smooth_eta:>3}}) {{msg}}"
        ))
        .with_context(|| format!("Unable to create progress bar style for '{label}'"))?,
    );

    Ok(progress_bar)
}

pub fn install_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .context("Unable to initialize global default subscriber")?;

    Ok(())
}

pub fn verify_directory(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(anyhow!("{path:?} exists but is not a directory"));
        }
    } else {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Unable to create directory {path:?}"))?;
    }

    Ok(())
}

pub fn remove_if_exists(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Unable to remove temporary file {path:?}"))?;
    }

    Ok(())
}

/// Writes `path` through a temporary sibling that is renamed into place once `write`
/// succeeds, so readers never observe a partial file.
pub fn write_atomically<F>(path: &Path, write: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> anyhow::Result<()>,
{
    let temporary_path = path.with_extension("tmp");

    let mut writer = BufWriter::new(
        File::create(&temporary_path)
            .with_context(|| format!("Unable to create {temporary_path:?}"))?,
    );

    write(&mut writer).with_context(|| format!("Unable to write {temporary_path:?}"))?;

    writer
        .into_inner()
        .map_err(|err| anyhow!("Unable to flush {temporary_path:?}: {}", err.error()))?
        .sync_all()
        .with_context(|| format!("Unable to sync {temporary_path:?}"))?;

    std::fs::rename(&temporary_path, path)
        .with_context(|| format!("Unable to rename {temporary_path:?} to {path:?}"))?;

    Ok(())
}
