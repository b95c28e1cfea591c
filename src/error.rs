use thiserror::Error;

use crate::job::JobState;

/// Missing or invalid settings, or a template that can't be filled
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("unknown setting {0:?}")]
    UnknownKey(String),

    #[error("settings fail validation: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("unresolved template placeholders: {}", .0.join(", "))]
    Unresolved(Vec<String>),

    #[error("malformed template at byte {offset}: {reason}")]
    MalformedTemplate { offset: usize, reason: String },

    #[error("template rendering failed: {0}")]
    Template(#[from] tinytemplate::error::Error),

    #[error("settings storage failed: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("settings schema can't be loaded: {0}")]
    Schema(String),

    #[error("can't read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Submission to the scheduler failed
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("can't run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Rejected {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("can't parse a job id from sbatch output {0:?}")]
    UnparseableId(String),
}

#[derive(Debug, Error)]
pub enum PollError {
    /// Retried on the next interval
    #[error("job query failed: {0}")]
    Transient(String),

    #[error("scheduler doesn't know job {0}")]
    UnknownJob(String),
}

impl PollError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollError::UnknownJob(_))
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("no connection line in {path} after {attempts} polls")]
    Unreachable { path: String, attempts: u32 },

    #[error("malformed connection line {0:?}")]
    Malformed(String),

    #[error("can't read job output {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything that can stop a launched job from becoming a usable connection
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("job ended as {0} before the server could be reached")]
    Ended(JobState),

    #[error("polling cancelled")]
    Cancelled,

    #[error("no job has been launched")]
    NoJob,
}

/// Discovering or starting trame apps failed
#[derive(Debug, Error)]
pub enum TrameError {
    #[error("trame app at {0} has no app.yml")]
    MissingConfig(String),

    #[error("can't parse {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no trame app named {0}")]
    UnknownApp(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl TrameError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> TrameError {
        TrameError::Io { path: path.display().to_string(), source }
    }
}
