//! Error facilities

use std::path::PathBuf;

/// Monolithic error type for the task subsystem.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The user dismissed an interactive prompt; expansion and launch are
    /// aborted without further diagnostics.
    #[error("task cancelled")]
    TaskCancelled,

    /// An `${input:ID}` reference named an input the task does not declare.
    #[error("input not declared: {0}")]
    MissingInput(String),

    /// Resolving an input's description or default re-entered the same input.
    #[error("input cycle detected on: {0}")]
    InputCycle(String),

    /// A task document declared a version this implementation cannot parse.
    #[error("unsupported task version: {0}")]
    UnsupportedVersion(String),

    /// A task document was not syntactically valid JSON.
    #[error("failed to parse task file {0}: {1}")]
    ParseFailure(PathBuf, #[source] serde_json::Error),

    /// The OS rejected creation of the child process.
    #[error("failed to spawn child process: {0}")]
    SpawnFailure(#[source] std::io::Error),

    /// An I/O error occurred.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The filesystem watcher reported an error.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// A regular expression error occurred.
    #[error("regex error: {0}")]
    Regex(#[from] fancy_regex::Error),
}
