use std::process::ExitStatus;
use std::time::Duration;

use crate::quality::Metric;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{tool} exited with status {status} and the following output:\n{output}")]
    Failed {
        tool: String,
        status: ExitStatus,
        output: String,
    },

    #[error("{tool} did not finish within {timeout:?}")]
    TimedOut { tool: String, timeout: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{metric} quality probe produced no measurable output")]
    NoMeasurement { metric: Metric },

    #[error("{metric} quality probe reported a malformed value {value:?} in line {line:?}")]
    Malformed {
        metric: Metric,
        value: String,
        line: String,
    },
}
