//! Runner error types

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("a process is already running")]
    JobAlreadyRunning,

    #[error("process {}", describe_exit(.exit_code))]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("process was cancelled")]
    Cancelled,

    #[error("process timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exited with code {}", code),
        None => "was terminated by a signal".to_string(),
    }
}
