use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Exit code attached to a failed static content deploy stage.
pub const STATIC_DEPLOY_EXIT_CODE: u8 = 5;

/// Exit code used when the user interrupts a dispatch (SIGINT).
pub const CANCELLED_EXIT_CODE: u8 = 130;

/// Build preparation error types
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("`{command}` failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to run `{command}`")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` did not finish within {timeout:?}")]
    CommandTimedOut { command: String, timeout: Duration },

    #[error("Failed to read config file: {path}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file: {path}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Invalid config path '{path}'")]
    InvalidPath { path: String },

    #[error("Database query failed: {message}")]
    Query { message: String },

    #[error("Invalid platform variable {name}: {message}")]
    InvalidPlatformVariable { name: String, message: String },

    #[error("{failed} of {total} static content command(s) failed: {details}")]
    DispatchFailed {
        failed: usize,
        total: usize,
        details: String,
    },

    #[error("Failed to start worker pool: {message}")]
    WorkerPool { message: String },

    #[error("Static content deploy failed (exit code {code})")]
    StaticDeploy {
        code: u8,
        #[source]
        source: Box<DeployError>,
    },

    #[error("Logging setup failed: {message}")]
    Logging { message: String },

    #[error("Deployment cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// Tag a dispatch error as a failure of the static deploy stage
    pub fn static_deploy(source: DeployError) -> Self {
        DeployError::StaticDeploy {
            code: STATIC_DEPLOY_EXIT_CODE,
            source: Box::new(source),
        }
    }

    /// Process exit code the calling pipeline should see for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            DeployError::StaticDeploy { code, .. } => *code,
            DeployError::Cancelled => CANCELLED_EXIT_CODE,
            _ => 1,
        }
    }
}

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, DeployError>;
