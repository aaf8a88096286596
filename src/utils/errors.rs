use std::path::PathBuf;
use thiserror::Error;

use crate::utils::arg_builder::ArgumentVector;
use crate::utils::run_config::RunField;

/// The failures a run can end with. None of them is retried; each one is
/// terminal for the current run and is reported to the user as plain text.
#[derive(Debug, Error)]
pub enum PilotError {
    #[error("could not find any forward-read FASTQ files (*1.fq.gz) under {}", .0.display())]
    NoSamplesFound(PathBuf),

    #[error("`{argv}` exited with {}", exit_code_string(.code))]
    ExternalToolFailed {
        code: Option<i32>,
        argv: ArgumentVector,
    },

    #[error("the {0} process is already running; wait for it to finish or kill it first")]
    AlreadyRunning(String),

    #[error("the {0} process is not running")]
    NotRunning(String),

    #[error("`{0}` must be set before a run can be started")]
    MissingRequiredPath(RunField),

    #[error("`{field}` points to {}, which does not exist", .path.display())]
    PathNotFound { field: RunField, path: PathBuf },

    #[error("`cores` must be a positive integer, but was `{0}`")]
    InvalidCoreCount(String),

    #[error("could not launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_code_string(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit status {}", c),
        None => String::from("no exit status (terminated by a signal)"),
    }
}
