use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{anyhow, Context};
use tracing::debug;

use crate::error::ToolError;

/// Number of trailing diagnostic lines kept when an invocation fails.
const OUTPUT_TAIL_LINES: usize = 32;

thread_local! {
    /// Drives subprocesses launched from this thread. Built on first use and reused by
    /// every later call on the same thread.
    static SUBPROCESS_RUNTIME: RefCell<Option<tokio::runtime::Runtime>> =
        const { RefCell::new(None) };
}

#[cfg(test)]
thread_local! {
    static RUNTIMES_BUILT: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Locations of the external multimedia tools and the limits applied when running them.
#[derive(Clone, Debug)]
pub struct Toolkit {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub timeout: Option<Duration>,
}

impl Default for Toolkit {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            timeout: None,
        }
    }
}

impl Toolkit {
    pub fn ffmpeg(&self, arguments: &[OsString]) -> anyhow::Result<Output> {
        run(&self.ffmpeg, arguments, self.timeout)
    }

    pub fn ffprobe(&self, arguments: &[OsString]) -> anyhow::Result<Output> {
        run(&self.ffprobe, arguments, self.timeout)
    }
}

/// Runs `program` to completion, capturing its output. Blocks the calling thread.
///
/// When a timeout is given the child is killed once it elapses and `ToolError::TimedOut`
/// is returned.
pub fn run(
    program: &Path,
    arguments: &[OsString],
    timeout: Option<Duration>,
) -> anyhow::Result<Output> {
    debug!(
        "Running {} {}",
        program.to_string_lossy(),
        arguments
            .iter()
            .map(|argument| argument.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    SUBPROCESS_RUNTIME.with(|slot| {
        let mut slot = slot.borrow_mut();

        if slot.is_none() {
            #[cfg(test)]
            RUNTIMES_BUILT.with(|count| count.set(count.get() + 1));

            *slot = Some(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("Unable to create subprocess runtime")?,
            );
        }

        let runtime = slot
            .as_ref()
            .ok_or_else(|| anyhow!("Subprocess runtime is unavailable"))?;

        runtime.block_on(execute(program, arguments, timeout))
    })
}

async fn execute(
    program: &Path,
    arguments: &[OsString],
    timeout: Option<Duration>,
) -> anyhow::Result<Output> {
    let mut command = tokio::process::Command::new(program);

    command
        .args(arguments)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.output();

    let output = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, child)
            .await
            .map_err(|_elapsed| ToolError::TimedOut {
                tool: program.to_string_lossy().to_string(),
                timeout,
            })?,
        None => child.await,
    };

    output.with_context(|| format!("Unable to execute {program:?}"))
}

/// Converts a non-zero exit into `ToolError::Failed` carrying the tail of the tool's
/// diagnostic output.
pub fn check_success(program: &Path, output: Output) -> anyhow::Result<Output> {
    if output.status.success() {
        return Ok(output);
    }

    Err(ToolError::Failed {
        tool: program.to_string_lossy().to_string(),
        status: output.status,
        output: output_tail(&output.stderr),
    }
    .into())
}

fn output_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let mut tail = VecDeque::with_capacity(OUTPUT_TAIL_LINES);

    for line in text.lines() {
        if tail.len() == OUTPUT_TAIL_LINES {
            tail.pop_front();
        }

        tail.push_back(line);
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}
